//! Timeout-bounded command execution against the sandbox.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::error::SandboxError;
use crate::io::sandbox::Sandbox;

/// Exit code reported for commands abandoned at their deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Structured result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl CommandResult {
    fn timed_out(command: &str, timeout: Duration, partial: &str) -> Self {
        let mut stdout = format!(
            "Command `{command}` timed out after {:.1}s and was terminated.",
            timeout.as_secs_f64()
        );
        if !partial.trim().is_empty() {
            stdout.push_str("\nPartial output:\n");
            stdout.push_str(partial.trim());
        }
        Self {
            stdout,
            exit_code: TIMEOUT_EXIT_CODE,
            timed_out: true,
        }
    }
}

/// Runs commands in the sandbox, never blocking past the per-command timeout.
///
/// Owns the sandbox for the engine's lifetime; calls are serialized by the
/// engine's sequential loop.
#[derive(Debug)]
pub struct CommandRunner<S> {
    sandbox: S,
}

impl<S: Sandbox> CommandRunner<S> {
    pub fn new(sandbox: S) -> Self {
        Self { sandbox }
    }

    /// Execute `command`, returning the timeout sentinel (exit code 124) when
    /// it does not finish within `timeout`.
    ///
    /// No retries: only an unreachable sandbox is an error.
    #[instrument(skip(self), fields(timeout_ms = timeout.as_millis() as u64))]
    pub fn execute(&self, command: &str, timeout: Duration) -> Result<CommandResult, SandboxError> {
        let output = self.sandbox.exec(command, timeout)?;
        if output.timed_out {
            warn!("command timed out");
            return Ok(CommandResult::timed_out(command, timeout, &output.stdout));
        }
        info!(exit_code = output.exit_code, "command finished");
        Ok(CommandResult {
            stdout: output.stdout,
            exit_code: output.exit_code,
            timed_out: false,
        })
    }
}
