//! Progress events streamed to the operator while a run is in flight.

use crate::core::digest::Digest;
use crate::core::frontier::AppliedUpdate;
use crate::core::lead::Lead;
use crate::core::transcript::{Step, Transcript};

/// One observable moment of a run, borrowed from engine state.
#[derive(Debug, Clone, Copy)]
pub enum EngineEvent<'a> {
    /// The initial frontier was decided.
    Seeded { leads: &'a [Lead] },
    /// A lead was popped from the frontier.
    LeadStarted {
        index: u32,
        lead: &'a Lead,
        remaining: usize,
    },
    /// The oracle chose a command; it is about to run.
    CommandStarted {
        step: u32,
        topic: &'a str,
        log: &'a str,
        command: &'a str,
    },
    /// A repeated command was refused and the oracle re-prompted.
    CommandRejected { command: &'a str, attempt: u32 },
    /// A command finished (or hit its deadline) and was appended.
    CommandFinished { step: u32, result: &'a Step },
    /// The lead's sub-loop ended.
    LeadFinished { transcript: &'a Transcript },
    /// The finished lead was summarized.
    Digested { lead: &'a Lead, digest: &'a Digest },
    /// The frontier changed (or was confirmed unchanged) after a lead.
    FrontierUpdated {
        applied: &'a AppliedUpdate,
        open_leads: usize,
    },
}
