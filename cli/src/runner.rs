//! Runs requests against the shared engine under a wall-clock deadline.

use {
    playground_runner::{request::ExecutionRequest, result::ExecutionResult, Execute, RunnerError},
    std::{
        sync::{Arc, Mutex, PoisonError},
        time::Duration,
    },
    tokio::task::JoinError,
};

/// Shared handle to one engine. Requests queue on the engine's mutex, so the
/// validator is only ever started by one request at a time.
pub struct Runner<E> {
    engine: Arc<Mutex<E>>,
    timeout: Duration,
}

impl<E> Clone for Runner<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            timeout: self.timeout,
        }
    }
}

impl<E: Execute + 'static> Runner<E> {
    pub fn new(engine: E, timeout: Duration) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            timeout,
        }
    }

    /// Execute `request` on the blocking pool.
    ///
    /// When the deadline passes first, a timeout failure is returned and the
    /// blocking task is left to run to completion in the background. An error
    /// is returned only when the task itself panicked.
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, JoinError> {
        let scenario = request.scenario_label().to_string();
        let engine = Arc::clone(&self.engine);
        let task = tokio::task::spawn_blocking(move || {
            let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
            engine.execute(request)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined,
            Err(_) => {
                let timeout = RunnerError::ExecutionTimeout(self.timeout.as_millis() as u64);
                log::warn!("{scenario}: {timeout}");
                Ok(ExecutionResult::failure(scenario, timeout.to_string()))
            }
        }
    }

    /// Run `f` against the engine on the blocking pool once any in-flight
    /// request is done, and release this handle there as well.
    pub async fn close<F>(self, f: F) -> Result<(), JoinError>
    where
        F: FnOnce(&mut E) + Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut engine);
        })
        .await
    }
}
