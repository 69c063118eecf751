//! Sandboxed shell adapter.
//!
//! The [`Sandbox`] trait decouples the command runner from the actual
//! execution target (by default a `docker exec` into a long-lived container).
//! Tests use scripted sandboxes that return canned outputs without spawning
//! processes.

use std::process::Command;
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use crate::error::SandboxError;
use crate::io::process::run_command_with_timeout;

/// Raw result of one sandbox execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxOutput {
    /// Combined stdout then stderr, lossily decoded.
    pub stdout: String,
    pub exit_code: i32,
    /// The execution was cut short at the deadline and cancelled.
    pub timed_out: bool,
}

/// Abstraction over the sandboxed shell.
pub trait Sandbox {
    /// Execute one command line, cancelling it if it outlives `timeout`.
    fn exec(&self, command: &str, timeout: Duration) -> Result<SandboxOutput, SandboxError>;
}

impl<S: Sandbox + ?Sized> Sandbox for &S {
    fn exec(&self, command: &str, timeout: Duration) -> Result<SandboxOutput, SandboxError> {
        (**self).exec(command, timeout)
    }
}

/// Placeholder in the argv prefix replaced with the command timeout in seconds.
pub const TIMEOUT_PLACEHOLDER: &str = "{timeout}";

/// Sandbox that appends the command line to a fixed argv prefix and spawns it,
/// e.g. `docker exec kali timeout -s KILL {timeout} sh -c <command>`.
///
/// Killing the local client on timeout does not reach a process that lives in
/// another session or container. A prefix carrying [`TIMEOUT_PLACEHOLDER`]
/// lets the far side enforce the same deadline.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    argv: Vec<String>,
    output_limit_bytes: usize,
}

impl ProcessSandbox {
    pub fn new(argv: Vec<String>, output_limit_bytes: usize) -> Self {
        Self {
            argv,
            output_limit_bytes,
        }
    }

    fn enforces_remote_deadline(&self) -> bool {
        self.argv.iter().any(|arg| arg.contains(TIMEOUT_PLACEHOLDER))
    }
}

impl Sandbox for ProcessSandbox {
    #[instrument(skip_all, fields(program = self.argv.first().map(String::as_str)))]
    fn exec(&self, command: &str, timeout: Duration) -> Result<SandboxOutput, SandboxError> {
        let (program, prefix_args) = self
            .argv
            .split_first()
            .ok_or_else(|| SandboxError("empty sandbox command".to_string()))?;
        let secs = timeout.as_secs_f64().to_string();
        let mut cmd = Command::new(program);
        cmd.args(prefix_args.iter().map(|arg| arg.replace(TIMEOUT_PLACEHOLDER, &secs)))
            .arg(command);

        let started = Instant::now();
        let output = run_command_with_timeout(cmd, None, timeout, self.output_limit_bytes)
            .map_err(|err| SandboxError(format!("{program}: {err:#}")))?;
        // The remote limit can fire a hair before the local one.
        let timed_out = output.timed_out
            || (self.enforces_remote_deadline() && started.elapsed() >= timeout);

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&output.stdout_truncated_notice("sandbox"));
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        text.push_str(&output.stderr_truncated_notice("sandbox"));

        debug!(
            exit_code = output.exit_code(),
            timed_out,
            bytes = text.len(),
            "sandbox exec finished"
        );
        Ok(SandboxOutput {
            stdout: text.trim_end().to_string(),
            exit_code: output.exit_code(),
            timed_out,
        })
    }
}
