//! Wall-clock behavior of the command runner against a real local shell.

#![cfg(unix)]

use std::time::{Duration, Instant};

use pentragent::io::command_runner::{CommandRunner, TIMEOUT_EXIT_CODE};
use pentragent::io::sandbox::ProcessSandbox;

fn local_runner() -> CommandRunner<ProcessSandbox> {
    CommandRunner::new(ProcessSandbox::new(
        vec!["sh".to_string(), "-c".to_string()],
        16_000,
    ))
}

#[test]
fn slow_command_returns_sentinel_within_deadline() {
    let runner = local_runner();
    let started = Instant::now();

    let result = runner
        .execute("sleep 5", Duration::from_secs(1))
        .expect("execute");

    assert!(started.elapsed() <= Duration::from_millis(1_200));
    assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
    assert!(result.timed_out);
    assert!(result.stdout.contains("timed out after 1.0s"));
}

#[test]
fn background_grandchild_does_not_hold_the_runner() {
    let runner = local_runner();
    let started = Instant::now();

    let result = runner
        .execute("sleep 30 & echo started; wait", Duration::from_secs(1))
        .expect("execute");

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
    assert!(result.stdout.contains("started"));
}

#[test]
fn fast_command_returns_real_exit_code() {
    let runner = local_runner();
    let started = Instant::now();

    let result = runner
        .execute("true", Duration::from_secs(10))
        .expect("execute");

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.exit_code, 0);
    assert!(!result.timed_out);
}

#[test]
fn failing_command_output_is_captured() {
    let result = local_runner()
        .execute("echo out; echo err >&2; exit 3", Duration::from_secs(10))
        .expect("execute");

    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stdout, "out\nerr");
}
