//! Structured oracle decisions and their decoding.
//!
//! Every oracle call site expects exactly one decision shape. Raw oracle text
//! is decoded here, once: fences stripped, JSON parsed, checked against the
//! per-kind JSON Schema, then deserialized into the typed variant. Nothing
//! past this module sees untyped payloads.

use std::fmt;
use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::frontier::FrontierUpdate;
use crate::core::lead::leads_from_texts;
use crate::error::OracleError;

const NEXT_STEP_SCHEMA: &str = include_str!("../../schemas/next_step.schema.json");
const FRONTIER_SEED_SCHEMA: &str = include_str!("../../schemas/frontier_seed.schema.json");
const FRONTIER_UPDATE_SCHEMA: &str = include_str!("../../schemas/frontier_update.schema.json");
const DIGEST_SCHEMA: &str = include_str!("../../schemas/digest.schema.json");

/// The four oracle call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    NextStep,
    FrontierSeed,
    FrontierUpdate,
    Digest,
}

impl DecisionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NextStep => "next_step",
            Self::FrontierSeed => "frontier_seed",
            Self::FrontierUpdate => "frontier_update",
            Self::Digest => "digest",
        }
    }

    /// JSON Schema text constraining this decision.
    pub fn schema(self) -> &'static str {
        match self {
            Self::NextStep => NEXT_STEP_SCHEMA,
            Self::FrontierSeed => FRONTIER_SEED_SCHEMA,
            Self::FrontierUpdate => FRONTIER_UPDATE_SCHEMA,
            Self::Digest => DIGEST_SCHEMA,
        }
    }

    fn validator(self) -> &'static Validator {
        static NEXT_STEP: LazyLock<Validator> =
            LazyLock::new(|| compile_schema(DecisionKind::NextStep));
        static FRONTIER_SEED: LazyLock<Validator> =
            LazyLock::new(|| compile_schema(DecisionKind::FrontierSeed));
        static FRONTIER_UPDATE: LazyLock<Validator> =
            LazyLock::new(|| compile_schema(DecisionKind::FrontierUpdate));
        static DIGEST: LazyLock<Validator> = LazyLock::new(|| compile_schema(DecisionKind::Digest));

        match self {
            Self::NextStep => &NEXT_STEP,
            Self::FrontierSeed => &FRONTIER_SEED,
            Self::FrontierUpdate => &FRONTIER_UPDATE,
            Self::Digest => &DIGEST,
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn compile_schema(kind: DecisionKind) -> Validator {
    let schema: Value =
        serde_json::from_str(kind.schema()).expect("embedded decision schema should be json");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("embedded decision schema should compile")
}

/// Next command to run for the current lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextStepDecision {
    pub command: String,
    pub topic: String,
    pub log: String,
    pub terminal: bool,
}

/// Initial leads for a fresh run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierSeedDecision {
    pub leads: Vec<String>,
}

/// Lead additions and removals after a lead finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierUpdateDecision {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl FrontierUpdateDecision {
    pub fn into_update(self) -> FrontierUpdate {
        FrontierUpdate {
            to_add: leads_from_texts(self.add),
            to_remove: leads_from_texts(self.remove),
        }
    }
}

/// Compacted summary of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestDecision {
    pub summary: String,
    pub dead_end: bool,
}

/// One decoded oracle decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredDecision {
    NextStep(NextStepDecision),
    FrontierSeed(FrontierSeedDecision),
    FrontierUpdate(FrontierUpdateDecision),
    Digest(DigestDecision),
}

impl StructuredDecision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Self::NextStep(_) => DecisionKind::NextStep,
            Self::FrontierSeed(_) => DecisionKind::FrontierSeed,
            Self::FrontierUpdate(_) => DecisionKind::FrontierUpdate,
            Self::Digest(_) => DecisionKind::Digest,
        }
    }
}

/// A decision type bound to one call site.
pub trait Decision: Sized {
    const KIND: DecisionKind;

    fn from_structured(decision: StructuredDecision) -> Option<Self>;
}

impl Decision for NextStepDecision {
    const KIND: DecisionKind = DecisionKind::NextStep;

    fn from_structured(decision: StructuredDecision) -> Option<Self> {
        match decision {
            StructuredDecision::NextStep(inner) => Some(inner),
            _ => None,
        }
    }
}

impl Decision for FrontierSeedDecision {
    const KIND: DecisionKind = DecisionKind::FrontierSeed;

    fn from_structured(decision: StructuredDecision) -> Option<Self> {
        match decision {
            StructuredDecision::FrontierSeed(inner) => Some(inner),
            _ => None,
        }
    }
}

impl Decision for FrontierUpdateDecision {
    const KIND: DecisionKind = DecisionKind::FrontierUpdate;

    fn from_structured(decision: StructuredDecision) -> Option<Self> {
        match decision {
            StructuredDecision::FrontierUpdate(inner) => Some(inner),
            _ => None,
        }
    }
}

impl Decision for DigestDecision {
    const KIND: DecisionKind = DecisionKind::Digest;

    fn from_structured(decision: StructuredDecision) -> Option<Self> {
        match decision {
            StructuredDecision::Digest(inner) => Some(inner),
            _ => None,
        }
    }
}

/// Decode raw oracle text as a decision of `kind`.
pub fn decode(kind: DecisionKind, raw: &str) -> Result<StructuredDecision, OracleError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(OracleError::decode(kind, "empty response"));
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|err| OracleError::decode(kind, format!("invalid json: {err}")))?;

    let messages: Vec<String> = kind
        .validator()
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(OracleError::decode(
            kind,
            format!("schema violations: {}", messages.join("; ")),
        ));
    }

    let decision = match kind {
        DecisionKind::NextStep => {
            let next: NextStepDecision = typed(kind, value)?;
            if !next.terminal && next.command.trim().is_empty() {
                return Err(OracleError::decode(
                    kind,
                    "non-terminal decision without a command",
                ));
            }
            StructuredDecision::NextStep(next)
        }
        DecisionKind::FrontierSeed => StructuredDecision::FrontierSeed(typed(kind, value)?),
        DecisionKind::FrontierUpdate => StructuredDecision::FrontierUpdate(typed(kind, value)?),
        DecisionKind::Digest => StructuredDecision::Digest(typed(kind, value)?),
    };
    Ok(decision)
}

/// Decode raw oracle text into the decision type `D`.
pub fn decode_as<D: Decision>(raw: &str) -> Result<D, OracleError> {
    let decision = decode(D::KIND, raw)?;
    let actual = decision.kind();
    D::from_structured(decision).ok_or_else(|| {
        OracleError::decode(D::KIND, format!("expected {}, got {actual}", D::KIND))
    })
}

fn typed<T: DeserializeOwned>(kind: DecisionKind, value: Value) -> Result<T, OracleError> {
    serde_json::from_value(value).map_err(|err| OracleError::decode(kind, err.to_string()))
}

/// Strip a surrounding Markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n(.*?)\n?\s*```\s*$").expect("fence regex")
    });
    match FENCE_RE.captures(raw).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => raw.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lead::Lead;

    #[test]
    fn embedded_schemas_compile() {
        for kind in [
            DecisionKind::NextStep,
            DecisionKind::FrontierSeed,
            DecisionKind::FrontierUpdate,
            DecisionKind::Digest,
        ] {
            let _ = kind.validator();
        }
    }

    #[test]
    fn decodes_next_step() {
        let raw = r#"{"command":"nmap -sV 10.0.0.5","topic":"scan","log":"find services","terminal":false}"#;
        let next: NextStepDecision = decode_as(raw).expect("decode");
        assert_eq!(next.command, "nmap -sV 10.0.0.5");
        assert!(!next.terminal);
    }

    #[test]
    fn decodes_fenced_json() {
        let raw = "```json\n{\"leads\":[\"scan ports\",\"check web app\"]}\n```";
        let seed: FrontierSeedDecision = decode_as(raw).expect("decode");
        assert_eq!(seed.leads, vec!["scan ports", "check web app"]);
    }

    #[test]
    fn rejects_missing_fields() {
        let err = decode(DecisionKind::NextStep, r#"{"command":"id"}"#).unwrap_err();
        assert!(err.is_decode());
        assert!(err.to_string().contains("next_step"));
    }

    #[test]
    fn rejects_non_json() {
        let err = decode(DecisionKind::Digest, "I think the host is secure.").unwrap_err();
        assert!(err.is_decode());
        assert!(err.to_string().contains("invalid json"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let raw = r#"{"summary":"ok","dead_end":false,"extra":1}"#;
        assert!(decode(DecisionKind::Digest, raw).is_err());
    }

    #[test]
    fn rejects_blank_command_unless_terminal() {
        let raw = r#"{"command":"  ","topic":"t","log":"l","terminal":false}"#;
        assert!(decode(DecisionKind::NextStep, raw).is_err());

        let raw = r#"{"command":"","topic":"t","log":"done","terminal":true}"#;
        assert!(decode(DecisionKind::NextStep, raw).is_ok());
    }

    #[test]
    fn update_decision_normalizes_leads() {
        let raw = r#"{"add":[" check smb ","check smb",""],"remove":["old lead"]}"#;
        let update = decode_as::<FrontierUpdateDecision>(raw)
            .expect("decode")
            .into_update();
        assert_eq!(update.to_add, vec![Lead::new("check smb").expect("lead")]);
        assert_eq!(update.to_remove, vec![Lead::new("old lead").expect("lead")]);
    }
}
