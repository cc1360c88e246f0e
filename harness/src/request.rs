//! Execution requests, as received over the wire.

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// Scenario name reported for ad-hoc transactions.
pub const CUSTOM_TRANSACTION: &str = "custom-transaction";

/// One account of a caller-built instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionAccount {
    /// The account's role in the instruction, as named by the program.
    pub name: String,
    /// A label naming the address: a role such as `user`, `system_program`,
    /// a label shared with other accounts of the request, or a literal
    /// base58 address.
    pub pubkey: String,
    #[serde(default)]
    pub is_signer: bool,
    #[serde(default)]
    pub is_writable: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInstruction {
    /// Ignored: instructions always target the freshly deployed program.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    pub instruction_name: String,
    #[serde(default)]
    pub accounts: Vec<TransactionAccount>,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub instructions: Vec<TransactionInstruction>,
}

/// Run a recorded scenario, or a bare instruction, of a template.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScenarioRequest {
    pub template_id: String,
    pub scenario: Option<String>,
    pub instruction: Option<String>,
    /// Overrides the scenario's recorded arguments.
    pub args: Option<Vec<Value>>,
}

impl ScenarioRequest {
    /// The name the request is looked up by: the scenario, else the
    /// instruction.
    pub fn name(&self) -> &str {
        self.scenario
            .as_deref()
            .or(self.instruction.as_deref())
            .unwrap_or_default()
    }
}

/// A validated execution request.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawExecutionRequest")]
pub enum ExecutionRequest {
    Scenario(ScenarioRequest),
    Transaction {
        template_id: String,
        transaction: TransactionRequest,
    },
}

impl ExecutionRequest {
    pub fn template_id(&self) -> &str {
        match self {
            ExecutionRequest::Scenario(request) => &request.template_id,
            ExecutionRequest::Transaction { template_id, .. } => template_id,
        }
    }

    /// The scenario name a result for this request is reported under.
    pub fn scenario_label(&self) -> &str {
        match self {
            ExecutionRequest::Scenario(request) => request.name(),
            ExecutionRequest::Transaction { .. } => CUSTOM_TRANSACTION,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RequestKind {
    #[default]
    Scenario,
    Transaction,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExecutionRequest {
    template_id: String,
    #[serde(default, rename = "type")]
    kind: RequestKind,
    #[serde(default)]
    scenario: Option<String>,
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    args: Option<Vec<Value>>,
    #[serde(default)]
    transaction: Option<TransactionRequest>,
}

impl TryFrom<RawExecutionRequest> for ExecutionRequest {
    type Error = String;

    fn try_from(raw: RawExecutionRequest) -> Result<Self, Self::Error> {
        if raw.template_id.is_empty() {
            return Err("templateId is required".to_string());
        }
        match raw.kind {
            RequestKind::Scenario => {
                if raw.scenario.is_none() && raw.instruction.is_none() {
                    return Err("a scenario or an instruction is required".to_string());
                }
                Ok(ExecutionRequest::Scenario(ScenarioRequest {
                    template_id: raw.template_id,
                    scenario: raw.scenario,
                    instruction: raw.instruction,
                    args: raw.args,
                }))
            }
            RequestKind::Transaction => {
                let transaction = raw
                    .transaction
                    .filter(|transaction| !transaction.instructions.is_empty())
                    .ok_or("a transaction with at least one instruction is required")?;
                Ok(ExecutionRequest::Transaction {
                    template_id: raw.template_id,
                    transaction,
                })
            }
        }
    }
}
