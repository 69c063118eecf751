//! Compacts a finished transcript into a bounded digest.

use anyhow::Result;
use tracing::{instrument, warn};

use crate::core::decision::DigestDecision;
use crate::core::digest::Digest;
use crate::core::transcript::{Transcript, render_steps};
use crate::io::oracle::{Oracle, decide};
use crate::io::prompt::{DigestInputs, PromptBuilder};

pub struct Summarizer<'a, O: ?Sized> {
    oracle: &'a O,
    max_chars: usize,
    prompt_budget_bytes: usize,
}

impl<'a, O: Oracle + ?Sized> Summarizer<'a, O> {
    pub fn new(oracle: &'a O, max_chars: usize, prompt_budget_bytes: usize) -> Self {
        Self {
            oracle,
            max_chars,
            prompt_budget_bytes,
        }
    }

    /// Summarize `transcript` with one oracle call.
    ///
    /// Never fails: any error degrades to [`Digest::unavailable`].
    #[instrument(skip_all, fields(lead = %transcript.lead, steps = transcript.len()))]
    pub fn summarize(&self, shared_context: &str, transcript: &Transcript) -> Digest {
        match self.try_summarize(shared_context, transcript) {
            Ok(digest) => digest,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "summary unavailable");
                Digest::unavailable(&transcript.outcome)
            }
        }
    }

    fn try_summarize(&self, shared_context: &str, transcript: &Transcript) -> Result<Digest> {
        let outcome = transcript.outcome.to_string();
        let steps = render_steps(&transcript.steps);
        let prompt = PromptBuilder::new(self.prompt_budget_bytes)
            .digest(&DigestInputs {
                target: shared_context,
                lead: transcript.lead.as_str(),
                outcome: &outcome,
                transcript: &steps,
                max_chars: self.max_chars,
            })?
            .render();
        let decision: DigestDecision = decide(self.oracle, prompt)?;
        Ok(Digest::new(
            &decision.summary,
            decision.dead_end,
            self.max_chars,
        ))
    }
}
