#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sweep_campaign::{
    CancelToken, FailureKind, ParameterCombination, ParameterValue, RunFunction,
};
use sweep_cli::CommandRunner;

fn script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("sim.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod");
    path
}

fn combination(nodes: i64) -> ParameterCombination {
    vec![
        ("totalNodes".to_string(), ParameterValue::Int(nodes)),
        ("travellerVelocity".to_string(), ParameterValue::Float(2.0)),
    ]
    .into_iter()
    .collect()
}

#[test]
fn successful_run_captures_output_in_its_attempt_directory() {
    let tmp = tempfile::tempdir().expect("tmp dir");
    let program = script(tmp.path(), r#"echo "$@"; touch produced.dat"#);
    let runner = CommandRunner::new(&program, tmp.path().join("data"), CancelToken::new());

    let output = runner.execute(&combination(250), 3).expect("run");
    let handle = PathBuf::from(output.handle.expect("handle"));
    assert!(handle.ends_with(format!(
        "{}-3-0",
        combination(250).fingerprint().expect("fingerprint")
    )));
    let stdout = fs::read_to_string(handle.join("stdout")).expect("stdout");
    assert_eq!(
        stdout.trim(),
        "--totalNodes=250 --travellerVelocity=2.0 --RngRun=3"
    );
    assert!(handle.join("produced.dat").exists());
    assert_eq!(output.metadata["exit_code"], 0);
    assert_eq!(output.metadata["attempt"], 0);
}

#[test]
fn repeated_attempts_get_fresh_directories() {
    let tmp = tempfile::tempdir().expect("tmp dir");
    let program = script(tmp.path(), "exit 0");
    let runner = CommandRunner::new(&program, tmp.path().join("data"), CancelToken::new());
    let first = runner.execute(&combination(500), 0).expect("first");
    let second = runner.execute(&combination(500), 0).expect("second");
    assert_ne!(first.handle, second.handle);
    assert_eq!(second.metadata["attempt"], 1);
}

#[test]
fn non_zero_exit_is_a_failure_with_stderr_tail() {
    let tmp = tempfile::tempdir().expect("tmp dir");
    let program = script(tmp.path(), "echo 'warming up' >&2\necho 'assert failed: nodes' >&2\nexit 3");
    let runner = CommandRunner::new(&program, tmp.path().join("data"), CancelToken::new());
    let failure = runner.execute(&combination(750), 0).expect_err("fails");
    assert_eq!(failure.kind, FailureKind::Failed);
    assert!(failure.message.ends_with("assert failed: nodes"), "{}", failure.message);
}

#[test]
fn slow_run_is_killed_at_the_timeout() {
    let tmp = tempfile::tempdir().expect("tmp dir");
    let program = script(tmp.path(), "sleep 10");
    let runner = CommandRunner::new(&program, tmp.path().join("data"), CancelToken::new())
        .with_timeout(Duration::from_millis(100));
    let failure = runner.execute(&combination(250), 0).expect_err("times out");
    assert_eq!(failure.kind, FailureKind::TimedOut);
}

#[test]
fn cancellation_kills_the_running_simulator() {
    let tmp = tempfile::tempdir().expect("tmp dir");
    let program = script(tmp.path(), "sleep 10");
    let cancel = CancelToken::new();
    cancel.cancel();
    let runner = CommandRunner::new(&program, tmp.path().join("data"), cancel);
    let failure = runner.execute(&combination(250), 0).expect_err("cancelled");
    assert_eq!(failure.kind, FailureKind::Cancelled);
}

#[test]
fn missing_program_fails_to_spawn() {
    let tmp = tempfile::tempdir().expect("tmp dir");
    let runner = CommandRunner::new(
        tmp.path().join("absent"),
        tmp.path().join("data"),
        CancelToken::new(),
    );
    let failure = runner.execute(&combination(250), 0).expect_err("spawn");
    assert_eq!(failure.kind, FailureKind::Failed);
    assert!(failure.message.starts_with("spawn"));
}
