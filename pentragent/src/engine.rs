//! Outer loop for `pentragent run`.
//!
//! Seed the frontier, then pop one lead at a time: run it, summarize it, and
//! let the frontier manager react, until no open leads remain.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::agents::frontier_manager::FrontierManager;
use crate::agents::lead_executor::{LeadExecutor, LeadExecutorConfig};
use crate::agents::summarizer::Summarizer;
use crate::core::lead::Lead;
use crate::core::transcript::TranscriptOutcome;
use crate::events::EngineEvent;
use crate::io::command_runner::CommandRunner;
use crate::io::config::EngineConfig;
use crate::io::documents::ContextProvider;
use crate::io::oracle::Oracle;
use crate::io::recorder::{LeadRecord, Recorder, RunRecord};
use crate::io::sandbox::Sandbox;

/// What the operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mission {
    pub target: String,
    pub hints: Vec<String>,
}

impl Mission {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            hints: Vec::new(),
        }
    }

    /// Context shared by every oracle call of the run.
    pub fn shared_context(&self) -> String {
        let mut context = self.target.trim().to_string();
        let hints: Vec<&str> = self
            .hints
            .iter()
            .map(|hint| hint.trim())
            .filter(|hint| !hint.is_empty())
            .collect();
        if !hints.is_empty() {
            context.push_str("\n\nOperator hints:");
            for hint in hints {
                context.push_str("\n- ");
                context.push_str(hint);
            }
        }
        context
    }
}

/// A lead that was aborted because the oracle answered with a malformed
/// decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadFailure {
    pub lead: Lead,
    pub error: String,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutcome {
    pub leads_run: u32,
    pub lead_failures: Vec<LeadFailure>,
    /// Leads cut off by the step budget or the repeat guard.
    pub policy_violations: u32,
    pub history: Vec<Lead>,
}

/// Collaborators a run talks to.
pub struct Collaborators<'a, O: ?Sized, S, C: ?Sized> {
    pub oracle: &'a O,
    pub runner: &'a CommandRunner<S>,
    pub references: &'a C,
    pub recorder: Option<&'a Recorder>,
}

/// Run the engine until the frontier is empty.
///
/// Malformed next-step decisions abort only their lead and are reported in
/// [`EngineOutcome::lead_failures`]. Every other oracle or sandbox failure
/// stops the run with an error.
#[instrument(skip_all, fields(target = %mission.target))]
pub fn run_engine<O, S, C, F>(
    config: &EngineConfig,
    collaborators: &Collaborators<'_, O, S, C>,
    mission: &Mission,
    mut on_event: F,
) -> Result<EngineOutcome>
where
    O: Oracle + ?Sized,
    S: Sandbox,
    C: ContextProvider + ?Sized,
    F: FnMut(&EngineEvent<'_>),
{
    let shared_context = mission.shared_context();
    let oracle = collaborators.oracle;
    let executor = LeadExecutor::new(
        oracle,
        collaborators.runner,
        collaborators.references,
        LeadExecutorConfig {
            step_budget: config.step_budget,
            command_timeout: config.command_timeout(),
            repeat_retries: config.repeat_retries,
            prompt_budget_bytes: config.prompt_budget_bytes,
        },
    );
    let summarizer = Summarizer::new(oracle, config.max_digest_chars, config.prompt_budget_bytes);
    let mut manager = FrontierManager::new(
        oracle,
        collaborators.references,
        config.max_seed_leads,
        config.prompt_budget_bytes,
    );

    let seeded = manager.seed(&shared_context)?;
    on_event(&EngineEvent::Seeded { leads: &seeded });

    let mut leads_run = 0u32;
    let mut lead_failures = Vec::new();
    let mut policy_violations = 0u32;

    while let Some(lead) = manager.next_lead() {
        leads_run += 1;
        on_event(&EngineEvent::LeadStarted {
            index: leads_run,
            lead: &lead,
            remaining: manager.frontier().len(),
        });

        let transcript =
            executor.run(&lead, &shared_context, manager.history(), &mut on_event)?;
        on_event(&EngineEvent::LeadFinished {
            transcript: &transcript,
        });
        if let TranscriptOutcome::Failed { error } = &transcript.outcome {
            warn!(lead = %lead, error = %error, "lead aborted");
            lead_failures.push(LeadFailure {
                lead: lead.clone(),
                error: error.clone(),
            });
        } else if transcript.outcome.is_policy_violation() {
            policy_violations += 1;
        }

        let digest = summarizer.summarize(&shared_context, &transcript);
        on_event(&EngineEvent::Digested {
            lead: &lead,
            digest: &digest,
        });

        let update = manager.update(&shared_context, &transcript, &digest);
        if let Some(recorder) = collaborators.recorder {
            recorder
                .write_lead(&LeadRecord {
                    index: leads_run,
                    transcript: &transcript,
                    digest: &digest,
                    update: update.as_ref().ok(),
                })
                .context("record lead")?;
        }
        let applied = update?;
        on_event(&EngineEvent::FrontierUpdated {
            applied: &applied,
            open_leads: manager.frontier().len(),
        });
    }

    info!(leads_run, failures = lead_failures.len(), "frontier exhausted");
    if let Some(recorder) = collaborators.recorder {
        recorder
            .write_run(&RunRecord {
                target: &mission.target,
                leads_run,
                lead_failures: lead_failures.len() as u32,
                policy_violations,
                history: manager.history().iter().collect(),
            })
            .context("record run")?;
    }

    Ok(EngineOutcome {
        leads_run,
        lead_failures,
        policy_violations,
        history: manager.history().iter().cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::documents::NoContext;
    use crate::test_support::{ScriptedOracle, ScriptedSandbox, digest, next_step, seed, update};

    fn config() -> EngineConfig {
        EngineConfig {
            step_budget: 3,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn shared_context_lists_hints() {
        let mission = Mission {
            target: " 10.0.0.5 ".to_string(),
            hints: vec!["web app on 8080".to_string(), "  ".to_string()],
        };
        assert_eq!(
            mission.shared_context(),
            "10.0.0.5\n\nOperator hints:\n- web app on 8080"
        );
        assert_eq!(Mission::new("host").shared_context(), "host");
    }

    #[test]
    fn empty_seed_ends_the_run_without_leads() {
        let oracle = ScriptedOracle::new([seed(&[])]);
        let sandbox = ScriptedSandbox::echoing();
        let runner = CommandRunner::new(&sandbox);
        let collaborators = Collaborators {
            oracle: &oracle,
            runner: &runner,
            references: &NoContext,
            recorder: None,
        };

        let outcome =
            run_engine(&config(), &collaborators, &Mission::new("host"), |_| {}).expect("run");

        assert_eq!(outcome.leads_run, 0);
        assert!(outcome.history.is_empty());
        assert_eq!(oracle.prompts().len(), 1);
    }

    #[test]
    fn events_follow_the_lead_lifecycle() {
        let oracle = ScriptedOracle::new([
            seed(&["Check SSH"]),
            next_step("ssh -V", true),
            digest("OpenSSH 9.6", true),
            update(&[], &[]),
        ]);
        let sandbox = ScriptedSandbox::echoing();
        let runner = CommandRunner::new(&sandbox);
        let collaborators = Collaborators {
            oracle: &oracle,
            runner: &runner,
            references: &NoContext,
            recorder: None,
        };

        let mut kinds = Vec::new();
        run_engine(&config(), &collaborators, &Mission::new("host"), |event| {
            kinds.push(match event {
                EngineEvent::Seeded { .. } => "seeded",
                EngineEvent::LeadStarted { .. } => "lead",
                EngineEvent::CommandStarted { .. } => "start",
                EngineEvent::CommandRejected { .. } => "rejected",
                EngineEvent::CommandFinished { .. } => "finish",
                EngineEvent::LeadFinished { .. } => "lead-done",
                EngineEvent::Digested { .. } => "digest",
                EngineEvent::FrontierUpdated { .. } => "update",
            });
        })
        .expect("run");

        assert_eq!(
            kinds,
            vec!["seeded", "lead", "start", "finish", "lead-done", "digest", "update"]
        );
    }
}
