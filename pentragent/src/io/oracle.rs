//! Decision oracle abstraction.
//!
//! The [`Oracle`] trait decouples the engine from the backend that produces
//! decisions (an OpenAI-compatible chat endpoint or an external agent CLI).
//! Backends only move text; [`decide`] decodes that text into the typed
//! decision the call site expects.

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::decision::{Decision, DecisionKind, decode_as};
use crate::error::OracleError;

/// Parameters for one oracle call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleRequest {
    /// Which decision shape the caller expects.
    pub kind: DecisionKind,
    /// Fully rendered prompt.
    pub prompt: String,
}

impl OracleRequest {
    /// JSON Schema text constraining the response.
    pub fn schema(&self) -> &'static str {
        self.kind.schema()
    }
}

/// Abstraction over decision backends.
pub trait Oracle {
    /// Return the raw response text for `request`.
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        (**self).complete(request)
    }
}

impl<O: Oracle + ?Sized> Oracle for Box<O> {
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        (**self).complete(request)
    }
}

/// Ask the oracle for a decision of type `D`.
///
/// Malformed responses are returned as [`OracleError::Decode`] and never
/// retried here.
#[instrument(skip_all, fields(kind = %D::KIND, prompt_bytes = prompt.len()))]
pub fn decide<O: Oracle + ?Sized, D: Decision>(oracle: &O, prompt: String) -> Result<D, OracleError> {
    let request = OracleRequest {
        kind: D::KIND,
        prompt,
    };
    let raw = oracle.complete(&request)?;
    debug!(response_bytes = raw.len(), "oracle responded");
    decode_as::<D>(&raw).inspect_err(|err| warn!(err = %err, "oracle response rejected"))
}
