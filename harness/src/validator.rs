//! Lifecycle of the local validator subprocess.

use {
    crate::process::{ManagedProcess, ProcessCommand, ProcessRunner, Readiness},
    playground_runner_error::error::RunnerError,
    std::{path::PathBuf, sync::Arc, time::Duration},
};

/// A stdout line containing either marker means the validator is serving.
fn is_ready_line(line: &str) -> bool {
    line.contains("validator ready") || line.contains("RPC")
}

/// Owns at most one validator process and restarts it on demand.
pub struct ValidatorSupervisor {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    rpc_port: u16,
    ledger_dir: PathBuf,
    startup_timeout: Duration,
    stop_grace_period: Duration,
    process: Option<Box<dyn ManagedProcess>>,
}

impl ValidatorSupervisor {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        program: impl Into<String>,
        rpc_port: u16,
        ledger_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            rpc_port,
            ledger_dir: ledger_dir.into(),
            startup_timeout: Duration::from_secs(10),
            stop_grace_period: Duration::from_secs(1),
            process: None,
        }
    }

    pub fn with_timeouts(mut self, startup_timeout: Duration, stop_grace_period: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self.stop_grace_period = stop_grace_period;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("http://localhost:{}", self.rpc_port)
    }

    fn command(&self) -> ProcessCommand {
        ProcessCommand::new(&self.program)
            .arg("--reset")
            .arg("--quiet")
            .arg(format!("--rpc-port={}", self.rpc_port))
            .arg("--ledger")
            .arg(self.ledger_dir.display().to_string())
    }

    /// Whether a validator process is alive.
    pub fn is_running(&mut self) -> bool {
        self.process.as_mut().is_some_and(|process| process.is_alive())
    }

    /// Start the validator unless it is already running. Returns `true` when
    /// a new process was started, which means a fresh, empty ledger.
    pub fn ensure_running(&mut self) -> Result<bool, RunnerError> {
        if self.is_running() {
            return Ok(false);
        }
        self.start()?;
        Ok(true)
    }

    /// Spawn the validator and wait for its readiness line.
    pub fn start(&mut self) -> Result<(), RunnerError> {
        // A process that died on its own is forgotten.
        self.process = None;

        let command = self.command();
        log::info!("Starting validator: {}", command.display());
        let mut process = self
            .runner
            .spawn(&command)
            .map_err(|err| RunnerError::ValidatorSpawnFailed(err.to_string()))?;

        match process.wait_for_output(&is_ready_line, self.startup_timeout) {
            Readiness::Ready => {
                log::info!("Validator ready (pid {}) at {}", process.id(), self.endpoint());
                self.process = Some(process);
                Ok(())
            }
            Readiness::Exited(code) => Err(RunnerError::ValidatorExited(code)),
            Readiness::TimedOut => {
                if let Err(err) = process.terminate(self.stop_grace_period) {
                    log::warn!("Failed to stop unresponsive validator: {err}");
                }
                Err(RunnerError::ValidatorStartupTimeout(
                    self.startup_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Stop the validator, if one is running.
    pub fn stop(&mut self) {
        if let Some(mut process) = self.process.take() {
            log::info!("Stopping validator (pid {})", process.id());
            if let Err(err) = process.terminate(self.stop_grace_period) {
                log::warn!("Failed to stop validator: {err}");
            }
        }
    }

    /// Stop, then start again on a fresh ledger.
    pub fn reset(&mut self) -> Result<(), RunnerError> {
        self.stop();
        self.start()
    }
}

impl Drop for ValidatorSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
