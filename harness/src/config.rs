//! Engine configuration.

use std::{path::PathBuf, time::Duration};

/// Templates that may be executed live unless the deployment overrides the
/// list.
pub const DEFAULT_SUPPORTED_TEMPLATES: &[&str] = &["hello-solana", "pda-vault", "account-init"];

/// Lamports airdropped to the session fee payer when it is first funded.
pub const DEFAULT_AIRDROP_LAMPORTS: u64 = 2_000_000_000;

/// Anchor release every generated workspace is pinned to.
pub const DEFAULT_ANCHOR_VERSION: &str = "0.30.1";

/// Everything the execution engine needs to know about its environment.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// RPC port the local validator listens on.
    pub validator_port: u16,
    /// Directory under which per-request build workspaces are created.
    pub workspace_root: PathBuf,
    /// Directory holding cached build artifacts, keyed by template and source
    /// hash.
    pub program_cache_root: PathBuf,
    /// Ledger directory handed to the validator.
    pub ledger_dir: PathBuf,
    /// Template ids allowed to run live.
    pub supported_templates: Vec<String>,
    /// Validator binary.
    pub validator_program: String,
    /// Solana CLI binary, used for deployment.
    pub solana_program: String,
    /// Anchor CLI binary, used for builds.
    pub anchor_program: String,
    pub anchor_version: String,
    /// How long to wait for the validator's readiness line.
    pub startup_timeout: Duration,
    /// How long a terminated validator gets before it is killed.
    pub stop_grace_period: Duration,
    /// Extra wait after readiness before the RPC endpoint is used.
    pub settle_delay: Duration,
    /// How long to wait for a transaction or airdrop confirmation.
    pub confirm_timeout: Duration,
    /// Wall-clock budget of one request. Builds and deployments still
    /// running when it is spent are killed.
    pub execution_timeout: Duration,
    pub airdrop_lamports: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let workspace_root = std::env::temp_dir().join("playground-runner");
        Self {
            validator_port: 8899,
            program_cache_root: workspace_root.join("program-cache"),
            ledger_dir: workspace_root.join("test-ledger"),
            workspace_root: workspace_root.join("workspaces"),
            supported_templates: DEFAULT_SUPPORTED_TEMPLATES
                .iter()
                .map(|id| id.to_string())
                .collect(),
            validator_program: "solana-test-validator".to_string(),
            solana_program: "solana".to_string(),
            anchor_program: "anchor".to_string(),
            anchor_version: DEFAULT_ANCHOR_VERSION.to_string(),
            startup_timeout: Duration::from_secs(10),
            stop_grace_period: Duration::from_secs(1),
            settle_delay: Duration::from_millis(1500),
            confirm_timeout: Duration::from_secs(30),
            execution_timeout: Duration::from_secs(30),
            airdrop_lamports: DEFAULT_AIRDROP_LAMPORTS,
        }
    }
}

impl EngineConfig {
    /// The validator's JSON-RPC endpoint.
    pub fn rpc_url(&self) -> String {
        format!("http://localhost:{}", self.validator_port)
    }

    /// Whether a template is on the live-execution allow-list.
    pub fn is_supported(&self, template_id: &str) -> bool {
        self.supported_templates.iter().any(|id| id == template_id)
    }
}
