//! Subprocess management.
//!
//! Every external tool the engine drives (the validator, the Anchor CLI and
//! the Solana CLI) is reached through the `ProcessRunner` trait, so the
//! engine can be exercised without any of them installed.

use {
    crossbeam_channel::{Receiver, RecvTimeoutError, Sender},
    nix::{
        sys::signal::{self, Signal},
        unistd::Pid,
    },
    playground_runner_error::error::RunnerError,
    std::{
        io::{self, BufRead, BufReader, Read},
        os::unix::process::CommandExt,
        path::{Path, PathBuf},
        process::{Child, Command, Stdio},
        sync::{Arc, Mutex, PoisonError},
        thread::{self, JoinHandle},
        time::{Duration, Instant},
    },
};

/// How often a running command is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The wall-clock budget of one request, shared by every step it runs.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    budget: Duration,
    /// `None` when the budget is too large to represent as an instant.
    expires_at: Option<Instant>,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            budget,
            expires_at: Instant::now().checked_add(budget),
        }
    }

    /// The full budget this deadline was created with.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        match self.expires_at {
            Some(expires_at) => expires_at.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The error a request reports once its budget is spent.
    pub fn exceeded(&self) -> RunnerError {
        RunnerError::ExecutionTimeout(self.budget.as_millis() as u64)
    }

    /// Fail with `exceeded` when no budget is left.
    pub fn check(&self) -> Result<(), RunnerError> {
        if self.is_expired() {
            return Err(self.exceeded());
        }
        Ok(())
    }
}

/// A command line to run, with an optional working directory and extra
/// environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// The command line as it would be typed in a shell.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a command that ran to completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The most useful text to show for a failed command: stderr, falling back
    /// to stdout, falling back to the exit code.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.exit_code {
            Some(code) => format!("process exited with code {code}"),
            None => "process terminated by signal".to_string(),
        }
    }
}

/// Outcome of waiting for a long-running process to announce itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// A stdout line satisfied the readiness predicate.
    Ready,
    /// The process exited first.
    Exited(Option<i32>),
    /// Neither happened within the timeout.
    TimedOut,
}

/// A long-running child process.
pub trait ManagedProcess: Send {
    fn id(&self) -> u32;

    /// Block until a stdout line satisfies `ready`, the process exits, or
    /// `timeout` elapses. Lines printed between two waits are not seen by
    /// the second.
    fn wait_for_output(&mut self, ready: &dyn Fn(&str) -> bool, timeout: Duration) -> Readiness;

    /// Whether the process is still running. Has no side effects on the
    /// process itself.
    fn is_alive(&mut self) -> bool;

    /// Ask the process to stop, then force it after `grace` if it has not.
    fn terminate(&mut self, grace: Duration) -> io::Result<()>;
}

/// Runs external commands.
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion, capturing its output.
    ///
    /// A command still running when `deadline` passes is killed, along with
    /// everything it started, and an `io::ErrorKind::TimedOut` error is
    /// returned.
    fn run(&self, command: &ProcessCommand, deadline: Deadline) -> io::Result<ProcessOutput>;

    /// Start a long-running command.
    fn spawn(&self, command: &ProcessCommand) -> io::Result<Box<dyn ManagedProcess>>;
}

/// `ProcessRunner` backed by real operating system processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    fn command(command: &ProcessCommand) -> io::Result<Command> {
        let program = which::which(&command.program).map_err(|err| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("`{}` not found on PATH: {err}", command.program),
            )
        })?;
        let mut cmd = Command::new(program);
        cmd.args(&command.args)
            .envs(command.envs.iter().cloned());
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

fn read_in_background(mut pipe: impl Read + Send + 'static) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default()
}

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, command: &ProcessCommand, deadline: Deadline) -> io::Result<ProcessOutput> {
        log::debug!("Running `{}`", command.display());
        // Its own process group, so a timeout also reaches whatever it spawned.
        let mut child = Self::command(command)?
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()?;
        let stdout = child.stdout.take().map(read_in_background);
        let stderr = child.stderr.take().map(read_in_background);

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if deadline.is_expired() {
                log::warn!(
                    "`{}` still running after {}ms, killing it",
                    command.display(),
                    deadline.budget().as_millis()
                );
                let _ = signal::killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
                child.wait()?;
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "`{}` did not finish within {}ms",
                        command.display(),
                        deadline.budget().as_millis()
                    ),
                ));
            }
            thread::sleep(POLL_INTERVAL.min(deadline.remaining()));
        };

        Ok(ProcessOutput {
            exit_code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }

    fn spawn(&self, command: &ProcessCommand) -> io::Result<Box<dyn ManagedProcess>> {
        log::debug!("Spawning `{}`", command.display());
        let mut child = Self::command(command)?
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (sender, lines) = crossbeam_channel::unbounded();
        let listening = Arc::new(Mutex::new(true));
        if let Some(stdout) = child.stdout.take() {
            let pid = child.id();
            let listening = Arc::clone(&listening);
            thread::spawn(move || forward_stdout(pid, stdout, &sender, &listening));
        }
        if let Some(stderr) = child.stderr.take() {
            let program = command.program.clone();
            thread::spawn(move || forward_stderr(&program, stderr));
        }

        Ok(Box::new(SystemProcess {
            child,
            lines,
            listening,
        }))
    }
}

/// Pass stdout lines on while someone is listening for them. Every other
/// line is only traced, so a chatty process cannot grow the queue.
fn forward_stdout(pid: u32, stdout: impl Read, sender: &Sender<String>, listening: &Mutex<bool>) {
    for line in BufReader::new(stdout).lines().map_while(Result::ok) {
        let gate = listening.lock().unwrap_or_else(PoisonError::into_inner);
        if !*gate {
            log::trace!("[{pid}] {line}");
            continue;
        }
        if sender.send(line).is_err() {
            break;
        }
    }
}

fn forward_stderr(program: &str, stderr: impl Read) {
    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
        if !line.contains("warning") && !line.contains("WARN") {
            log::error!("{program}: {line}");
        }
    }
}

struct SystemProcess {
    child: Child,
    lines: Receiver<String>,
    /// Whether stdout lines are queued on `lines`. Held by the reader while
    /// it forwards a line.
    listening: Arc<Mutex<bool>>,
}

impl SystemProcess {
    fn exit_code(&mut self) -> Option<i32> {
        self.child.wait().ok().and_then(|status| status.code())
    }

    /// Stop queueing stdout and discard whatever is still queued.
    fn stop_listening(&self) {
        let mut listening = self.listening.lock().unwrap_or_else(PoisonError::into_inner);
        *listening = false;
        for line in self.lines.try_iter() {
            log::trace!("[{}] {line}", self.child.id());
        }
    }

    fn wait_for_line(&mut self, ready: &dyn Fn(&str) -> bool, timeout: Duration) -> Readiness {
        let deadline = Instant::now() + timeout;
        loop {
            match self.lines.recv_deadline(deadline) {
                Ok(line) => {
                    log::trace!("[{}] {line}", self.child.id());
                    if ready(&line) {
                        return Readiness::Ready;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Readiness::TimedOut,
                // Stdout closed, so the process is gone or going.
                Err(RecvTimeoutError::Disconnected) => return Readiness::Exited(self.exit_code()),
            }
        }
    }
}

impl ManagedProcess for SystemProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn wait_for_output(&mut self, ready: &dyn Fn(&str) -> bool, timeout: Duration) -> Readiness {
        *self.listening.lock().unwrap_or_else(PoisonError::into_inner) = true;
        let readiness = self.wait_for_line(ready, timeout);
        self.stop_listening();
        readiness
    }

    fn is_alive(&mut self) -> bool {
        if !matches!(self.child.try_wait(), Ok(None)) {
            return false;
        }
        signal::kill(Pid::from_raw(self.child.id() as i32), None).is_ok()
    }

    fn terminate(&mut self, grace: Duration) -> io::Result<()> {
        if !self.is_alive() {
            return Ok(());
        }
        let pid = Pid::from_raw(self.child.id() as i32);
        signal::kill(pid, Signal::SIGTERM).map_err(io::Error::from)?;

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.child.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(50));
        }

        log::warn!("Process {} ignored SIGTERM, killing it", self.child.id());
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for SystemProcess {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
