//! Building template programs with the Anchor CLI.
//!
//! A build runs in a scratch workspace laid out as a one-program Anchor
//! project. The program keypair is generated up front and the source's
//! `declare_id!` is pointed at it, so the built program and its deployed
//! address agree.
//!
//! Successful builds are cached under
//! `<cache root>/<template id>/<sha256 of the source>/`. A cache hit restores
//! the artifacts, keypair included, and skips the build.

use {
    crate::{
        process::{Deadline, ProcessCommand, ProcessRunner},
        workspace::{read_keypair, write_keypair},
    },
    playground_runner_error::error::RunnerError,
    sha2::{Digest, Sha256},
    std::{
        fs, io,
        path::{Path, PathBuf},
        sync::Arc,
    },
    trezoa_keypair::Keypair,
    trezoa_pubkey::Pubkey,
    trezoa_signer::Signer,
};

/// Why a build produced nothing usable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileFailure {
    /// The build did not run, or exited unsuccessfully.
    Build(String),
    /// The build succeeded but left an artifact out.
    MissingArtifact {
        artifact: &'static str,
        path: PathBuf,
    },
    /// The build was killed when the request's budget, in milliseconds, ran
    /// out.
    TimedOut(u64),
}

impl From<CompileFailure> for RunnerError {
    fn from(failure: CompileFailure) -> Self {
        match failure {
            CompileFailure::Build(message) => RunnerError::CompilationFailed(message),
            CompileFailure::MissingArtifact { artifact, path } => {
                RunnerError::MissingBuildArtifact {
                    artifact,
                    path: path.display().to_string(),
                }
            }
            CompileFailure::TimedOut(budget_ms) => RunnerError::ExecutionTimeout(budget_ms),
        }
    }
}

/// The outcome of one build. Never an error: failures are described by
/// `failure`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileResult {
    pub success: bool,
    pub program_id: Option<Pubkey>,
    /// Path to the built shared object.
    pub program_path: PathBuf,
    pub program_keypair_path: Option<PathBuf>,
    pub idl_path: Option<PathBuf>,
    pub failure: Option<CompileFailure>,
}

impl CompileResult {
    fn failed(failure: CompileFailure) -> Self {
        Self {
            success: false,
            failure: Some(failure),
            ..Default::default()
        }
    }

    /// Human-readable failure text.
    pub fn error(&self) -> Option<String> {
        self.failure.as_ref().map(|failure| match failure {
            CompileFailure::Build(message) => message.clone(),
            CompileFailure::MissingArtifact { artifact, path } => {
                format!("{artifact} not found at {}", path.display())
            }
            CompileFailure::TimedOut(budget_ms) => {
                RunnerError::ExecutionTimeout(*budget_ms).to_string()
            }
        })
    }

    /// The artifact paths, or the reason the build is unusable.
    pub fn into_artifacts(self) -> Result<BuildArtifacts, RunnerError> {
        if let Some(failure) = self.failure {
            return Err(failure.into());
        }
        match (self.program_id, self.program_keypair_path, self.idl_path) {
            (Some(program_id), Some(program_keypair_path), Some(idl_path)) => Ok(BuildArtifacts {
                program_id,
                program_path: self.program_path,
                program_keypair_path,
                idl_path,
            }),
            _ => Err(RunnerError::CompilationFailed(
                "build reported success without its artifacts".to_string(),
            )),
        }
    }
}

/// Everything a successful build produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildArtifacts {
    pub program_id: Pubkey,
    pub program_path: PathBuf,
    pub program_keypair_path: PathBuf,
    pub idl_path: PathBuf,
}

/// Crate and artifact name for a template: its id with `-` turned into `_`.
pub fn program_name(template_id: &str) -> String {
    template_id.replace('-', "_")
}

/// Point the first `declare_id!(...)` in `source` at `program_id`. Source
/// without one is returned unchanged.
pub fn rewrite_declare_id(source: &str, program_id: &Pubkey) -> String {
    const MACRO: &str = "declare_id!(";
    let Some(start) = source.find(MACRO) else {
        return source.to_string();
    };
    let args_start = start + MACRO.len();
    let Some(len) = source[args_start..].find(')') else {
        return source.to_string();
    };
    format!(
        "{}\"{program_id}\"{}",
        &source[..args_start],
        &source[args_start + len..]
    )
}

struct Layout {
    name: String,
    program_path: PathBuf,
    keypair_path: PathBuf,
    idl_path: PathBuf,
}

impl Layout {
    fn new(workspace: &Path, template_id: &str) -> Self {
        let name = program_name(template_id);
        let deploy = workspace.join("target").join("deploy");
        Self {
            program_path: deploy.join(format!("{name}.so")),
            keypair_path: deploy.join(format!("{name}-keypair.json")),
            idl_path: workspace.join("target").join("idl").join(format!("{name}.json")),
            name,
        }
    }

    fn artifacts(&self) -> [(&'static str, &Path); 3] {
        [
            ("Program binary", &self.program_path),
            ("Program keypair", &self.keypair_path),
            ("IDL", &self.idl_path),
        ]
    }
}

fn copy_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to).map(|_| ())
}

/// Builds template programs, through the Anchor CLI, with a build cache.
pub struct ProgramCompiler {
    runner: Arc<dyn ProcessRunner>,
    anchor_program: String,
    anchor_version: String,
    cache_root: PathBuf,
}

impl ProgramCompiler {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        anchor_program: impl Into<String>,
        anchor_version: impl Into<String>,
        cache_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            anchor_program: anchor_program.into(),
            anchor_version: anchor_version.into(),
            cache_root: cache_root.into(),
        }
    }

    fn cache_dir(&self, template_id: &str, code: &str) -> PathBuf {
        let digest = Sha256::digest(code.as_bytes());
        self.cache_root.join(template_id).join(hex::encode(digest))
    }

    /// Build `code` as the program of `template_id` inside `workspace`,
    /// giving up when `deadline` passes.
    pub fn compile(
        &self,
        template_id: &str,
        code: &str,
        workspace: &Path,
        deadline: Deadline,
    ) -> CompileResult {
        let layout = Layout::new(workspace, template_id);
        let cache_dir = self.cache_dir(template_id, code);

        match self.restore_cached(&layout, &cache_dir) {
            Ok(true) => {
                log::debug!("Build cache hit for {template_id}");
                return self.collect(&layout);
            }
            Ok(false) => {}
            Err(err) => log::warn!("Ignoring unreadable build cache for {template_id}: {err}"),
        }

        let result = self
            .build(&layout, code, workspace, deadline)
            .map(|()| self.collect(&layout))
            .unwrap_or_else(CompileResult::failed);
        if result.success {
            if let Err(err) = self.store_cached(&layout, &cache_dir) {
                log::warn!("Failed to cache build of {template_id}: {err}");
            }
        }
        result
    }

    /// Remove every cached build of `template_id`. Best-effort.
    pub fn cleanup(&self, template_id: &str) {
        let dir = self.cache_root.join(template_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => log::debug!("Removed build cache {}", dir.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("Failed to remove build cache {}: {err}", dir.display()),
        }
    }

    fn build(
        &self,
        layout: &Layout,
        code: &str,
        workspace: &Path,
        deadline: Deadline,
    ) -> Result<(), CompileFailure> {
        let keypair = Keypair::new();
        let program_id = keypair.pubkey();
        write_keypair(&keypair, &layout.keypair_path)
            .map_err(|err| CompileFailure::Build(err.to_string()))?;
        self.scaffold(layout, &rewrite_declare_id(code, &program_id), &program_id, workspace)
            .map_err(|err| CompileFailure::Build(format!("failed to prepare workspace: {err}")))?;

        let command = ProcessCommand::new(&self.anchor_program)
            .arg("build")
            .current_dir(workspace);
        log::info!("Building {} ({program_id})", layout.name);
        let output = self.runner.run(&command, deadline).map_err(|err| match err.kind() {
            io::ErrorKind::TimedOut => CompileFailure::TimedOut(deadline.budget().as_millis() as u64),
            _ => CompileFailure::Build(format!("failed to run `{}`: {err}", command.display())),
        })?;
        if !output.success() {
            return Err(CompileFailure::Build(output.error_text()));
        }
        Ok(())
    }

    fn scaffold(
        &self,
        layout: &Layout,
        code: &str,
        program_id: &Pubkey,
        workspace: &Path,
    ) -> io::Result<()> {
        let name = &layout.name;
        let anchor_version = &self.anchor_version;
        fs::write(
            workspace.join("Anchor.toml"),
            format!(
                "[toolchain]\nanchor_version = \"{anchor_version}\"\n\n[features]\nresolution = \
                 true\nskip-lint = false\n\n[programs.localnet]\n{name} = \
                 \"{program_id}\"\n\n[provider]\ncluster = \"Localnet\"\nwallet = \
                 \"keys/payer.json\"\n"
            ),
        )?;
        fs::write(
            workspace.join("Cargo.toml"),
            "[workspace]\nmembers = [\"programs/*\"]\nresolver = \"2\"\n\n[profile.release]\n\
             overflow-checks = true\nlto = \"fat\"\ncodegen-units = 1\n",
        )?;

        let program_dir = workspace.join("programs").join(name);
        fs::create_dir_all(program_dir.join("src"))?;
        fs::write(
            program_dir.join("Cargo.toml"),
            format!(
                "[package]\nname = \"{}\"\nversion = \"0.1.0\"\nedition = \"2021\"\n\n[lib]\n\
                 crate-type = [\"cdylib\", \"lib\"]\nname = \"{name}\"\n\n[features]\ndefault = \
                 []\ncpi = [\"no-entrypoint\"]\nno-entrypoint = []\nno-idl = []\n\
                 no-log-ix-name = []\nidl-build = [\"anchor-lang/idl-build\"]\n\n\
                 [dependencies]\nanchor-lang = \"{anchor_version}\"\n",
                name.replace('_', "-")
            ),
        )?;
        fs::write(program_dir.join("src").join("lib.rs"), code)
    }

    /// Describe the artifacts in `layout`, failing on the first missing one.
    fn collect(&self, layout: &Layout) -> CompileResult {
        for (artifact, path) in layout.artifacts() {
            if !path.exists() {
                return CompileResult::failed(CompileFailure::MissingArtifact {
                    artifact,
                    path: path.to_path_buf(),
                });
            }
        }
        let program_id = match read_keypair(&layout.keypair_path) {
            Ok(keypair) => keypair.pubkey(),
            Err(err) => return CompileResult::failed(CompileFailure::Build(err.to_string())),
        };
        CompileResult {
            success: true,
            program_id: Some(program_id),
            program_path: layout.program_path.clone(),
            program_keypair_path: Some(layout.keypair_path.clone()),
            idl_path: Some(layout.idl_path.clone()),
            failure: None,
        }
    }

    fn restore_cached(&self, layout: &Layout, cache_dir: &Path) -> io::Result<bool> {
        let cached = layout.artifacts().map(|(_, path)| {
            let file_name = path.file_name().unwrap_or_default();
            (cache_dir.join(file_name), path)
        });
        if !cached.iter().all(|(from, _)| from.exists()) {
            return Ok(false);
        }
        for (from, to) in &cached {
            copy_file(from, to)?;
        }
        Ok(true)
    }

    fn store_cached(&self, layout: &Layout, cache_dir: &Path) -> io::Result<()> {
        fs::create_dir_all(cache_dir)?;
        for (_, path) in layout.artifacts() {
            let file_name = path.file_name().unwrap_or_default();
            fs::copy(path, cache_dir.join(file_name))?;
        }
        Ok(())
    }
}
