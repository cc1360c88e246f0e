//! Runner errors. Every failure the engine can hit while servicing a request
//! is one of these. The `Display` text of each variant is shown to the end
//! user verbatim, so it must read as a complete sentence fragment on its own.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    /// The template loader has no template with this id.
    #[error("Template \"{0}\" not found")]
    TemplateNotFound(String),
    /// The template exists but is not on the live-execution allow-list.
    #[error("Live execution is not yet supported for \"{0}\".")]
    UnsupportedTemplate(String),
    /// Neither a scenario nor an instruction of that name is known.
    #[error("Scenario \"{scenario}\" not found for template \"{template_id}\"")]
    ScenarioNotFound {
        scenario: String,
        template_id: String,
    },
    /// The request body was well-formed JSON but not a valid request.
    #[error("Invalid execution request: {0}")]
    InvalidRequest(String),
    /// The program build exited unsuccessfully.
    #[error("Compilation failed: {0}")]
    CompilationFailed(String),
    /// The build reported success but an expected artifact is absent.
    #[error("{artifact} not found after build (expected at {path})")]
    MissingBuildArtifact { artifact: &'static str, path: String },
    /// The validator subprocess could not be spawned.
    #[error("Failed to start validator: {0}")]
    ValidatorSpawnFailed(String),
    /// The validator subprocess exited before signalling readiness.
    #[error("Validator exited unexpectedly (exit code {0:?})")]
    ValidatorExited(Option<i32>),
    /// No readiness signal was observed within the startup window.
    #[error("Validator startup timeout after {0}ms")]
    ValidatorStartupTimeout(u64),
    /// The validator is not reachable for RPC.
    #[error("Validator is not available: {0}")]
    ValidatorUnavailable(String),
    /// Deploying the built program to the validator failed.
    #[error("Program deployment failed: {0}")]
    DeploymentFailed(String),
    /// An account could not be mapped to an address or signer.
    #[error("Account resolution failed: {0}")]
    AccountResolutionFailed(String),
    /// The requested instruction is absent from the built interface.
    #[error("Instruction \"{0}\" not found in IDL")]
    InstructionNotFound(String),
    /// Instruction arguments do not match the declared argument list.
    #[error("Invalid instruction arguments: {0}")]
    InvalidArguments(String),
    /// The transaction was rejected in preflight or failed on chain.
    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String, logs: Vec<String> },
    /// A JSON-RPC call to the validator failed.
    #[error("RPC request failed: {0}")]
    Rpc(String),
    /// The request exceeded the wall-clock budget.
    #[error("Execution timed out after {0}ms")]
    ExecutionTimeout(u64),
    /// Catch-all for subprocess and filesystem failures.
    #[error("{0}")]
    UnknownExecutionError(String),
}

impl RunnerError {
    /// Program log lines attached to the failure, if any were produced.
    pub fn logs(&self) -> &[String] {
        match self {
            RunnerError::TransactionFailed { logs, .. } => logs,
            _ => &[],
        }
    }
}

impl From<std::io::Error> for RunnerError {
    fn from(err: std::io::Error) -> Self {
        RunnerError::UnknownExecutionError(err.to_string())
    }
}
