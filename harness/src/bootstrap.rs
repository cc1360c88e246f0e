//! Prerequisite instructions some scenarios need before they can run.
//!
//! Withdrawing from a vault needs a vault, so asking for `pda-vault`'s
//! `withdraw` first runs `initialize`. Prerequisites run after the
//! before-snapshot is taken, so their effects show up in the diff.

use {playground_runner_error::error::RunnerError, serde_json::Value};

/// One instruction to run first, with its arguments as a JSON array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prerequisite {
    pub instruction: &'static str,
    pub args: &'static str,
}

impl Prerequisite {
    pub fn args(&self) -> Result<Vec<Value>, RunnerError> {
        serde_json::from_str(self.args).map_err(|err| {
            RunnerError::InvalidArguments(format!(
                "bootstrap arguments of \"{}\": {err}",
                self.instruction
            ))
        })
    }
}

/// Prerequisites of one `(template, instruction)` pair.
#[derive(Clone, Copy, Debug)]
pub struct BootstrapRule {
    pub template_id: &'static str,
    pub instruction: &'static str,
    pub prerequisites: &'static [Prerequisite],
}

const INITIALIZE: Prerequisite = Prerequisite {
    instruction: "initialize",
    args: "[]",
};

pub const BOOTSTRAP_RULES: &[BootstrapRule] = &[
    BootstrapRule {
        template_id: "pda-vault",
        instruction: "deposit",
        prerequisites: &[INITIALIZE],
    },
    BootstrapRule {
        template_id: "pda-vault",
        instruction: "withdraw",
        prerequisites: &[INITIALIZE],
    },
    BootstrapRule {
        template_id: "account-init",
        instruction: "update",
        prerequisites: &[Prerequisite {
            instruction: "initialize",
            args: "[42]",
        }],
    },
];

/// The prerequisites to run, in order, before `instruction` of
/// `template_id`. Empty when there are none.
pub fn prerequisites(template_id: &str, instruction: &str) -> &'static [Prerequisite] {
    BOOTSTRAP_RULES
        .iter()
        .find(|rule| rule.template_id == template_id && rule.instruction == instruction)
        .map(|rule| rule.prerequisites)
        .unwrap_or_default()
}
