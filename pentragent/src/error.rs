//! Typed failures at the collaborator boundaries.
//!
//! Orchestration code wraps these in `anyhow` errors; `main` downcasts them to
//! pick an exit code.

use thiserror::Error;

use crate::core::decision::DecisionKind;

/// Failure of a decision oracle call.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The oracle answered, but not in the shape the call site expects.
    #[error("malformed {kind} decision: {message}")]
    Decode { kind: DecisionKind, message: String },

    /// The oracle could not be reached or refused the request.
    #[error("oracle transport failed: {0}")]
    Transport(String),
}

impl OracleError {
    pub fn decode(kind: DecisionKind, message: impl Into<String>) -> Self {
        Self::Decode {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// The sandboxed shell could not be reached.
#[derive(Debug, Error)]
#[error("sandbox transport failed: {0}")]
pub struct SandboxError(pub String);
