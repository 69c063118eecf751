//! Owner of the frontier and the history.
//!
//! The manager is the only code that mutates either collection: once when the
//! run is seeded and once after every finished lead. Any oracle failure here
//! aborts the run.

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::core::decision::{FrontierSeedDecision, FrontierUpdateDecision};
use crate::core::digest::Digest;
use crate::core::frontier::{AppliedUpdate, Frontier, History, apply_update, render_leads};
use crate::core::invariants::validate_frontier;
use crate::core::lead::{Lead, leads_from_texts};
use crate::core::transcript::Transcript;
use crate::io::documents::ContextProvider;
use crate::io::oracle::{Oracle, decide};
use crate::io::prompt::{PromptBuilder, SeedInputs, UpdateInputs};

pub struct FrontierManager<'a, O: ?Sized, C: ?Sized> {
    oracle: &'a O,
    references: &'a C,
    max_seed_leads: usize,
    prompt_budget_bytes: usize,
    frontier: Frontier,
    history: History,
}

impl<'a, O, C> FrontierManager<'a, O, C>
where
    O: Oracle + ?Sized,
    C: ContextProvider + ?Sized,
{
    pub fn new(
        oracle: &'a O,
        references: &'a C,
        max_seed_leads: usize,
        prompt_budget_bytes: usize,
    ) -> Self {
        Self {
            oracle,
            references,
            max_seed_leads,
            prompt_budget_bytes,
            frontier: Frontier::new(),
            history: History::new(),
        }
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// True once no open leads remain.
    pub fn is_exhausted(&self) -> bool {
        self.frontier.is_empty()
    }

    /// Ask the oracle for the initial leads and admit at most
    /// `max_seed_leads` of them.
    #[instrument(skip_all)]
    pub fn seed(&mut self, shared_context: &str) -> Result<Vec<Lead>> {
        let references = self.references.context_for(shared_context);
        let prompt = PromptBuilder::new(self.prompt_budget_bytes)
            .frontier_seed(&SeedInputs {
                target: shared_context,
                references: &references,
                max_leads: self.max_seed_leads,
            })
            .context("render seed prompt")?
            .render();
        let decision: FrontierSeedDecision =
            decide(self.oracle, prompt).context("frontier seed decision")?;

        let mut seeded = leads_from_texts(decision.leads);
        if seeded.len() > self.max_seed_leads {
            debug!(
                offered = seeded.len(),
                kept = self.max_seed_leads,
                "dropping extra seed leads"
            );
            seeded.truncate(self.max_seed_leads);
        }
        for lead in &seeded {
            if self.frontier.push_back(lead.clone()) {
                self.history.admit(lead.clone());
            }
        }
        self.check_invariants()?;
        info!(leads = seeded.len(), "frontier seeded");
        Ok(seeded)
    }

    /// Pop the next lead to pursue. It stays in the history.
    pub fn next_lead(&mut self) -> Option<Lead> {
        self.frontier.pop_front()
    }

    /// Ask the oracle how the frontier should change after `transcript`, and
    /// apply the answer.
    #[instrument(skip_all, fields(lead = %transcript.lead))]
    pub fn update(
        &mut self,
        shared_context: &str,
        transcript: &Transcript,
        digest: &Digest,
    ) -> Result<AppliedUpdate> {
        let outcome = transcript.outcome.to_string();
        let frontier = render_leads(self.frontier.iter());
        let history = self.history.render();
        let prompt = PromptBuilder::new(self.prompt_budget_bytes)
            .frontier_update(&UpdateInputs {
                target: shared_context,
                lead: transcript.lead.as_str(),
                outcome: &outcome,
                digest: &digest.text,
                dead_end: digest.dead_end,
                frontier: &frontier,
                history: &history,
            })
            .context("render update prompt")?
            .render();
        let decision: FrontierUpdateDecision =
            decide(self.oracle, prompt).context("frontier update decision")?;

        let applied = apply_update(
            &mut self.frontier,
            &mut self.history,
            &decision.into_update(),
        );
        self.check_invariants()?;
        info!(
            added = applied.added.len(),
            removed = applied.removed.len(),
            open = self.frontier.len(),
            "frontier updated"
        );
        Ok(applied)
    }

    fn check_invariants(&self) -> Result<()> {
        let errors = validate_frontier(&self.frontier, &self.history);
        if !errors.is_empty() {
            bail!("frontier invariant violations:\n- {}", errors.join("\n- "));
        }
        Ok(())
    }
}
