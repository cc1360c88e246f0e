//! Program templates and where they are loaded from.
//!
//! On disk a template is a directory named after its id:
//!
//! ```text
//! <templates>/<id>/program/lib.rs
//! <templates>/<id>/program-map.json
//! <templates>/<id>/precomputed-state.json   (optional)
//! ```

use {
    playground_runner_error::error::RunnerError,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// An account an instruction takes, as declared by the template author.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSpec {
    pub name: String,
    #[serde(default)]
    pub is_mut: bool,
    #[serde(default)]
    pub is_signer: bool,
    #[serde(default)]
    pub is_pda: bool,
    /// Seed expressions for a PDA, such as `b"vault"` or `user.key()`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeds: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionSpec {
    pub name: String,
    #[serde(default)]
    pub accounts: Vec<AccountSpec>,
}

/// The instructions a template's program exposes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramMap {
    #[serde(default)]
    pub instructions: Vec<InstructionSpec>,
}

impl ProgramMap {
    pub fn instruction(&self, name: &str) -> Option<&InstructionSpec> {
        self.instructions.iter().find(|ix| ix.name == name)
    }
}

/// A named, pre-recorded run of one instruction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    #[serde(default)]
    pub accounts_before: Vec<Value>,
    #[serde(default)]
    pub accounts_after: Vec<Value>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub compute_units: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecomputedState {
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

/// A program template: its source plus the metadata needed to run it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    /// Rust source of the program.
    pub code: String,
    pub program_map: ProgramMap,
    #[serde(default)]
    pub precomputed_state: PrecomputedState,
}

impl Template {
    /// Find a scenario by name, falling back to the first scenario that runs
    /// an instruction of that name.
    pub fn find_scenario(&self, name: &str) -> Option<&Scenario> {
        let scenarios = &self.precomputed_state.scenarios;
        scenarios
            .iter()
            .find(|scenario| scenario.name == name)
            .or_else(|| scenarios.iter().find(|scenario| scenario.instruction == name))
    }
}

/// Source of templates.
pub trait TemplateLoader: Send + Sync {
    fn load(&self, id: &str) -> Result<Template, RunnerError>;
}

/// Loads templates from a directory tree.
#[derive(Clone, Debug)]
pub struct FsTemplateLoader {
    root: PathBuf,
}

impl FsTemplateLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, RunnerError> {
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|err| {
        RunnerError::UnknownExecutionError(format!("Invalid {}: {err}", path.display()))
    })
}

impl TemplateLoader for FsTemplateLoader {
    fn load(&self, id: &str) -> Result<Template, RunnerError> {
        if id.is_empty() || id.contains("..") || id.contains('/') || id.contains('\\') {
            return Err(RunnerError::TemplateNotFound(id.to_string()));
        }
        let dir = self.root.join(id);
        let code = fs::read_to_string(dir.join("program").join("lib.rs"))
            .map_err(|_| RunnerError::TemplateNotFound(id.to_string()))?;
        let program_map = read_json(&dir.join("program-map.json"))?;

        let state_path = dir.join("precomputed-state.json");
        let precomputed_state = if state_path.exists() {
            read_json(&state_path)?
        } else {
            PrecomputedState::default()
        };

        Ok(Template {
            id: id.to_string(),
            code,
            program_map,
            precomputed_state,
        })
    }
}
