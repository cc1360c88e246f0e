//! Command-line and environment configuration.

use {
    clap::Parser,
    playground_runner::config::{EngineConfig, DEFAULT_SUPPORTED_TEMPLATES},
    std::{path::PathBuf, time::Duration},
};

#[derive(Debug, Parser)]
#[command(name = "playground-runner", version, about)]
pub struct Cli {
    /// Port the HTTP server listens on.
    #[arg(long, env = "PORT", default_value_t = 3002)]
    pub port: u16,
    /// RPC port of the local validator.
    #[arg(long, env = "VALIDATOR_PORT", default_value_t = 8899)]
    pub validator_port: u16,
    /// Wall-clock budget for a single execution, in milliseconds.
    #[arg(long, env = "MAX_EXECUTION_TIME_MS", default_value_t = 30_000)]
    pub max_execution_time_ms: u64,
    /// Directory holding one sub-directory per template.
    #[arg(long, env = "TEMPLATES_DIR", default_value = "templates")]
    pub templates_dir: PathBuf,
    /// Directory under which per-request build workspaces are created.
    /// Defaults to `solana-playground-workspaces` in the system temp dir.
    #[arg(long, env = "WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,
    /// Directory for cached build artifacts. Defaults to `solana-programs`
    /// in the system temp dir.
    #[arg(long, env = "PROGRAM_CACHE_DIR")]
    pub program_cache_dir: Option<PathBuf>,
    /// Templates allowed to run live, comma separated.
    #[arg(
        long,
        env = "SUPPORTED_TEMPLATES",
        value_delimiter = ',',
        default_values_t = DEFAULT_SUPPORTED_TEMPLATES
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
    )]
    pub supported_templates: Vec<String>,
}

impl Cli {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.max_execution_time_ms)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let temp_dir = std::env::temp_dir();
        let workspace_root = self
            .workspace_root
            .clone()
            .unwrap_or_else(|| temp_dir.join("solana-playground-workspaces"));
        let program_cache_root = self
            .program_cache_dir
            .clone()
            .unwrap_or_else(|| temp_dir.join("solana-programs"));
        EngineConfig {
            validator_port: self.validator_port,
            ledger_dir: workspace_root.join("test-ledger"),
            workspace_root,
            program_cache_root,
            supported_templates: self
                .supported_templates
                .iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
            execution_timeout: self.execution_timeout(),
            ..EngineConfig::default()
        }
    }
}
