//! Test-only doubles for the oracle and the sandbox, plus decision builders.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use serde_json::json;

use crate::core::lead::Lead;
use crate::error::{OracleError, SandboxError};
use crate::io::oracle::{Oracle, OracleRequest};
use crate::io::sandbox::{Sandbox, SandboxOutput};

/// One canned oracle reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Raw response text, decoded like any backend output.
    Raw(String),
    /// Fail the call as unreachable.
    Transport(String),
}

/// Oracle that replays replies in order and records every request.
///
/// Once the script runs out, calls fail with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<ScriptedReply>>,
    requests: RefCell<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_replies(
            responses
                .into_iter()
                .map(|raw| ScriptedReply::Raw(raw.into())),
        )
    }

    pub fn with_replies(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.borrow().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.prompt.clone())
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.requests.borrow_mut().push(request.clone());
        match self.replies.borrow_mut().pop_front() {
            Some(ScriptedReply::Raw(raw)) => Ok(raw),
            Some(ScriptedReply::Transport(message)) => Err(OracleError::transport(message)),
            None => Err(OracleError::transport("scripted oracle has no replies left")),
        }
    }
}

#[derive(Debug, Clone)]
enum SandboxMode {
    Echo,
    Unreachable,
}

/// Sandbox that records commands and answers without spawning processes.
///
/// Queued outputs are returned first; afterwards every command echoes back
/// `ran: <command>` with exit code 0.
#[derive(Debug)]
pub struct ScriptedSandbox {
    mode: SandboxMode,
    outputs: RefCell<VecDeque<SandboxOutput>>,
    commands: RefCell<Vec<String>>,
}

impl ScriptedSandbox {
    pub fn echoing() -> Self {
        Self::with_outputs(Vec::new())
    }

    pub fn with_outputs(outputs: impl IntoIterator<Item = SandboxOutput>) -> Self {
        Self {
            mode: SandboxMode::Echo,
            outputs: RefCell::new(outputs.into_iter().collect()),
            commands: RefCell::new(Vec::new()),
        }
    }

    /// Every call fails as if the container were down.
    pub fn unreachable() -> Self {
        Self {
            mode: SandboxMode::Unreachable,
            ..Self::echoing()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl Sandbox for ScriptedSandbox {
    fn exec(&self, command: &str, _timeout: Duration) -> Result<SandboxOutput, SandboxError> {
        if let SandboxMode::Unreachable = self.mode {
            return Err(SandboxError("container not running".to_string()));
        }
        self.commands.borrow_mut().push(command.to_string());
        Ok(self
            .outputs
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| SandboxOutput {
                stdout: format!("ran: {command}"),
                exit_code: 0,
                timed_out: false,
            }))
    }
}

/// Build a lead, panicking on blank text.
pub fn lead(text: &str) -> Lead {
    Lead::new(text).expect("lead text should not be blank")
}

/// Raw next-step decision.
pub fn next_step(command: &str, terminal: bool) -> String {
    json!({
        "command": command,
        "topic": format!("run {command}"),
        "log": "scripted step",
        "terminal": terminal,
    })
    .to_string()
}

/// Raw frontier seed decision.
pub fn seed(leads: &[&str]) -> String {
    json!({ "leads": leads }).to_string()
}

/// Raw frontier update decision.
pub fn update(add: &[&str], remove: &[&str]) -> String {
    json!({ "add": add, "remove": remove }).to_string()
}

/// Raw digest decision.
pub fn digest(summary: &str, dead_end: bool) -> String {
    json!({ "summary": summary, "dead_end": dead_end }).to_string()
}
