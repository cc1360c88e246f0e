#![cfg(unix)]

use {
    playground_runner::process::{
        Deadline, ProcessCommand, ProcessRunner, Readiness, SystemProcessRunner,
    },
    serial_test::serial,
    std::{
        io,
        time::{Duration, Instant},
    },
};

fn generous() -> Deadline {
    Deadline::after(Duration::from_secs(10))
}

#[test]
#[serial]
fn test_run_captures_output() {
    let output = SystemProcessRunner
        .run(&ProcessCommand::new("sh").arg("-c").arg("echo out; echo err >&2; exit 3"), generous())
        .unwrap();

    assert_eq!(output.exit_code, Some(3));
    assert!(!output.success());
    assert_eq!(output.stdout, "out\n");
    assert_eq!(output.stderr, "err\n");
    assert_eq!(output.error_text(), "err");
}

#[test]
#[serial]
fn test_run_in_directory_with_env() {
    let dir = tempfile::tempdir().unwrap();
    let output = SystemProcessRunner
        .run(
            &ProcessCommand::new("sh")
                .arg("-c")
                .arg("pwd; echo $RUNNER_TEST")
                .current_dir(dir.path())
                .env("RUNNER_TEST", "yes"),
            generous(),
        )
        .unwrap();

    assert!(output.success());
    let canonical = dir.path().canonicalize().unwrap();
    assert_eq!(
        output.stdout,
        format!("{}\nyes\n", canonical.display())
    );
}

#[test]
#[serial]
fn test_missing_program() {
    let err = SystemProcessRunner
        .run(&ProcessCommand::new("definitely-not-a-real-binary"), generous())
        .unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
}

#[test]
#[serial]
fn test_run_is_killed_at_the_deadline() {
    let started = Instant::now();
    let err = SystemProcessRunner
        .run(
            &ProcessCommand::new("sh").arg("-c").arg("sleep 5"),
            Deadline::after(Duration::from_millis(200)),
        )
        .unwrap_err();

    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert!(err.to_string().contains("200ms"));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_deadline() {
    let deadline = Deadline::after(Duration::from_millis(1500));
    assert_eq!(deadline.budget(), Duration::from_millis(1500));
    assert!(!deadline.is_expired());
    assert!(deadline.check().is_ok());
    assert_eq!(
        deadline.exceeded().to_string(),
        "Execution timed out after 1500ms"
    );

    let spent = Deadline::after(Duration::ZERO);
    assert!(spent.is_expired());
    assert_eq!(spent.remaining(), Duration::ZERO);
    assert!(spent.check().is_err());

    assert!(!Deadline::after(Duration::MAX).is_expired());
}

#[test]
#[serial]
fn test_spawn_ready_then_terminate() {
    let mut process = SystemProcessRunner
        .spawn(&ProcessCommand::new("sh").arg("-c").arg("echo booting; echo JSON RPC URL: x; sleep 30"))
        .unwrap();

    let readiness = process.wait_for_output(&|line| line.contains("RPC"), Duration::from_secs(5));
    assert_eq!(readiness, Readiness::Ready);
    assert!(process.is_alive());

    let started = Instant::now();
    process.terminate(Duration::from_secs(1)).unwrap();
    assert!(!process.is_alive());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
#[serial]
fn test_spawn_exits_early() {
    let mut process = SystemProcessRunner
        .spawn(&ProcessCommand::new("sh").arg("-c").arg("echo nope; exit 7"))
        .unwrap();

    let readiness = process.wait_for_output(&|line| line.contains("RPC"), Duration::from_secs(5));
    assert_eq!(readiness, Readiness::Exited(Some(7)));
    assert!(!process.is_alive());
    // Terminating a finished process is a no-op.
    process.terminate(Duration::from_millis(10)).unwrap();
}

#[test]
#[serial]
fn test_spawn_times_out() {
    let mut process = SystemProcessRunner
        .spawn(&ProcessCommand::new("sh").arg("-c").arg("sleep 30"))
        .unwrap();

    let readiness = process.wait_for_output(&|_| true, Duration::from_millis(200));
    assert_eq!(readiness, Readiness::TimedOut);
    process.terminate(Duration::from_millis(500)).unwrap();
    assert!(!process.is_alive());
}

#[test]
#[serial]
fn test_output_between_waits_is_not_queued() {
    let script = "echo ready; i=0; while [ $i -lt 2000 ]; do echo noise $i; i=$((i+1)); done; \
                  sleep 2; echo later; sleep 30";
    let mut process = SystemProcessRunner
        .spawn(&ProcessCommand::new("sh").arg("-c").arg(script))
        .unwrap();

    let readiness = process.wait_for_output(&|line| line == "ready", Duration::from_secs(5));
    assert_eq!(readiness, Readiness::Ready);

    // The noise printed after readiness was discarded, not kept for later.
    std::thread::sleep(Duration::from_millis(500));
    let noise = process.wait_for_output(&|line| line.starts_with("noise"), Duration::from_millis(200));
    assert_eq!(noise, Readiness::TimedOut);

    // Lines printed while waiting still arrive.
    let later = process.wait_for_output(&|line| line == "later", Duration::from_secs(5));
    assert_eq!(later, Readiness::Ready);

    process.terminate(Duration::from_millis(500)).unwrap();
}
