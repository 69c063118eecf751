//! Bounded sub-loop that pursues a single lead.
//!
//! The executor is an explicit state machine: it asks the oracle for the next
//! command, runs it, appends a [`Step`], and repeats until the oracle signals
//! terminal or the step budget runs out. Every lead gets a fresh transcript.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::budget::StepBudget;
use crate::core::decision::NextStepDecision;
use crate::core::frontier::History;
use crate::core::lead::Lead;
use crate::core::transcript::{Step, Transcript, TranscriptOutcome, render_steps};
use crate::events::EngineEvent;
use crate::io::command_runner::CommandRunner;
use crate::io::documents::ContextProvider;
use crate::io::oracle::{Oracle, decide};
use crate::io::prompt::{NextStepInputs, PromptBuilder};
use crate::io::sandbox::Sandbox;

/// Limits applied to every lead.
#[derive(Debug, Clone)]
pub struct LeadExecutorConfig {
    pub step_budget: u32,
    pub command_timeout: Duration,
    /// Re-prompts allowed after consecutive repeated commands.
    pub repeat_retries: u32,
    pub prompt_budget_bytes: usize,
}

/// Runs leads against one oracle and one sandbox.
pub struct LeadExecutor<'a, O: ?Sized, S, C: ?Sized> {
    oracle: &'a O,
    runner: &'a CommandRunner<S>,
    references: &'a C,
    config: LeadExecutorConfig,
}

enum Phase {
    AwaitingDecision,
    Executing(NextStepDecision),
    Terminal(TranscriptOutcome),
}

impl<'a, O, S, C> LeadExecutor<'a, O, S, C>
where
    O: Oracle + ?Sized,
    S: Sandbox,
    C: ContextProvider + ?Sized,
{
    pub fn new(
        oracle: &'a O,
        runner: &'a CommandRunner<S>,
        references: &'a C,
        config: LeadExecutorConfig,
    ) -> Self {
        Self {
            oracle,
            runner,
            references,
            config,
        }
    }

    /// Pursue `lead` until it concludes, is cut off, or the oracle answers
    /// with a malformed decision.
    ///
    /// A malformed decision ends the lead with [`TranscriptOutcome::Failed`];
    /// transport failures of the oracle or the sandbox are returned as errors.
    #[instrument(skip_all, fields(lead = %lead))]
    pub fn run(
        &self,
        lead: &Lead,
        shared_context: &str,
        history: &History,
        on_event: &mut dyn FnMut(&EngineEvent<'_>),
    ) -> Result<Transcript> {
        let references = self
            .references
            .context_for(&format!("{}\n{}", lead.as_str(), shared_context));
        let history_text = history.render();
        let prompts = PromptBuilder::new(self.config.prompt_budget_bytes);

        let mut budget = StepBudget::new(self.config.step_budget);
        let mut steps: Vec<Step> = Vec::new();
        let mut notice: Option<String> = None;
        let mut rejections = 0u32;
        let mut phase = Phase::AwaitingDecision;

        let outcome = loop {
            phase = match phase {
                Phase::AwaitingDecision => {
                    let transcript = render_steps(&steps);
                    let prompt = prompts
                        .next_step(&NextStepInputs {
                            target: shared_context,
                            lead: lead.as_str(),
                            history: &history_text,
                            references: &references,
                            transcript: &transcript,
                            notice: notice.as_deref(),
                            step_budget: budget.limit(),
                            remaining_steps: budget.remaining(),
                            timeout_secs: self.config.command_timeout.as_secs(),
                        })
                        .context("render next-step prompt")?
                        .render();

                    match decide::<_, NextStepDecision>(self.oracle, prompt) {
                        Ok(decision) => self.review(
                            decision,
                            &steps,
                            &mut rejections,
                            &mut notice,
                            on_event,
                        ),
                        Err(err) if err.is_decode() => {
                            warn!(err = %err, "aborting lead on malformed decision");
                            Phase::Terminal(TranscriptOutcome::Failed {
                                error: err.to_string(),
                            })
                        }
                        Err(err) => return Err(err).context("next-step decision"),
                    }
                }
                Phase::Executing(decision) => {
                    let step_no = budget.used() + 1;
                    on_event(&EngineEvent::CommandStarted {
                        step: step_no,
                        topic: &decision.topic,
                        log: &decision.log,
                        command: &decision.command,
                    });
                    let result = self
                        .runner
                        .execute(&decision.command, self.config.command_timeout)
                        .with_context(|| format!("execute `{}`", decision.command))?;
                    budget.spend();

                    let exhausted = budget.is_exhausted();
                    steps.push(Step {
                        command: decision.command,
                        topic: decision.topic,
                        log: decision.log,
                        stdout: result.stdout,
                        exit_code: result.exit_code,
                        timed_out: result.timed_out,
                        terminal: decision.terminal || exhausted,
                    });
                    if let Some(step) = steps.last() {
                        on_event(&EngineEvent::CommandFinished {
                            step: step_no,
                            result: step,
                        });
                    }

                    if decision.terminal {
                        Phase::Terminal(TranscriptOutcome::Concluded)
                    } else if exhausted {
                        warn!(budget = budget.limit(), "step budget exhausted");
                        Phase::Terminal(TranscriptOutcome::BudgetExhausted {
                            budget: budget.limit(),
                        })
                    } else {
                        Phase::AwaitingDecision
                    }
                }
                Phase::Terminal(outcome) => break outcome,
            };
        };

        // Outcomes reached without running a command still close the last step.
        if !outcome.is_failed()
            && let Some(last) = steps.last_mut()
        {
            last.terminal = true;
        }

        info!(steps = steps.len(), outcome = %outcome, "lead finished");
        Ok(Transcript {
            lead: lead.clone(),
            steps,
            outcome,
        })
    }

    /// Decide what to do with a well-formed decision.
    fn review(
        &self,
        mut decision: NextStepDecision,
        steps: &[Step],
        rejections: &mut u32,
        notice: &mut Option<String>,
        on_event: &mut dyn FnMut(&EngineEvent<'_>),
    ) -> Phase {
        decision.command = decision.command.trim().to_string();
        if decision.command.is_empty() {
            debug!("oracle concluded the lead without a command");
            return Phase::Terminal(TranscriptOutcome::Concluded);
        }

        let repeated = steps
            .last()
            .is_some_and(|previous| previous.command == decision.command);
        if !repeated {
            *rejections = 0;
            *notice = None;
            return Phase::Executing(decision);
        }

        *rejections += 1;
        warn!(command = %decision.command, attempt = *rejections, "rejected repeated command");
        on_event(&EngineEvent::CommandRejected {
            command: &decision.command,
            attempt: *rejections,
        });
        if *rejections > self.config.repeat_retries {
            return Phase::Terminal(TranscriptOutcome::RepeatGuard {
                command: decision.command,
            });
        }
        *notice = Some(format!(
            "The command `{}` was just executed and was not run again. \
             Propose a different command, or finish the lead with `terminal` set to true.",
            decision.command
        ));
        Phase::AwaitingDecision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::documents::NoContext;
    use crate::test_support::{ScriptedOracle, ScriptedSandbox, lead, next_step};

    fn config(step_budget: u32) -> LeadExecutorConfig {
        LeadExecutorConfig {
            step_budget,
            command_timeout: Duration::from_secs(10),
            repeat_retries: 2,
            prompt_budget_bytes: 60_000,
        }
    }

    fn run_lead(
        oracle: &ScriptedOracle,
        sandbox: &ScriptedSandbox,
        step_budget: u32,
    ) -> Result<Transcript> {
        let runner = CommandRunner::new(sandbox);
        let executor = LeadExecutor::new(oracle, &runner, &NoContext, config(step_budget));
        executor.run(&lead("Enumerate services"), "10.0.0.5", &History::new(), &mut |_| {})
    }

    #[test]
    fn empty_terminal_command_concludes_without_running() {
        let oracle = ScriptedOracle::new([next_step("", true)]);
        let sandbox = ScriptedSandbox::echoing();

        let transcript = run_lead(&oracle, &sandbox, 5).expect("run");

        assert!(transcript.is_empty());
        assert_eq!(transcript.outcome, TranscriptOutcome::Concluded);
        assert!(sandbox.commands().is_empty());
    }

    #[test]
    fn repeated_command_is_rejected_with_notice() {
        let oracle = ScriptedOracle::new([
            next_step("nmap -sV 10.0.0.5", false),
            next_step("nmap -sV 10.0.0.5", false),
            next_step("whatweb 10.0.0.5", true),
        ]);
        let sandbox = ScriptedSandbox::echoing();

        let transcript = run_lead(&oracle, &sandbox, 5).expect("run");

        assert_eq!(transcript.len(), 2);
        assert_eq!(sandbox.commands(), vec!["nmap -sV 10.0.0.5", "whatweb 10.0.0.5"]);
        let prompts = oracle.prompts();
        assert!(prompts[2].contains("`nmap -sV 10.0.0.5` was just executed"));
        assert!(!prompts[1].contains("### Notice"));
    }

    #[test]
    fn repeat_guard_cuts_off_after_retries() {
        let oracle = ScriptedOracle::new([
            next_step("id", false),
            next_step("id", false),
            next_step("id", false),
            next_step("id", false),
        ]);
        let sandbox = ScriptedSandbox::echoing();

        let transcript = run_lead(&oracle, &sandbox, 10).expect("run");

        assert_eq!(transcript.len(), 1);
        assert_eq!(
            transcript.outcome,
            TranscriptOutcome::RepeatGuard {
                command: "id".to_string()
            }
        );
        assert!(transcript.outcome.is_policy_violation());
        assert!(transcript.last().expect("step").terminal);
        assert_eq!(oracle.prompts().len(), 4);
    }

    #[test]
    fn transcript_so_far_is_shown_to_the_oracle() {
        let oracle = ScriptedOracle::new([
            next_step("whoami", false),
            next_step("uname -a", true),
        ]);
        let sandbox = ScriptedSandbox::echoing();

        run_lead(&oracle, &sandbox, 5).expect("run");

        let prompts = oracle.prompts();
        assert!(!prompts[0].contains("### Transcript So Far"));
        assert!(prompts[1].contains("Command: whoami"));
        assert!(prompts[1].contains("4 of 5 commands left"));
    }

    #[test]
    fn sandbox_failure_is_fatal() {
        let oracle = ScriptedOracle::new([next_step("id", false)]);
        let sandbox = ScriptedSandbox::unreachable();

        let err = run_lead(&oracle, &sandbox, 5).unwrap_err();
        assert!(
            err.chain()
                .any(|cause| cause.downcast_ref::<crate::error::SandboxError>().is_some())
        );
    }

    #[test]
    fn oracle_transport_failure_is_fatal() {
        let oracle = ScriptedOracle::with_replies([]);
        let sandbox = ScriptedSandbox::echoing();

        let err = run_lead(&oracle, &sandbox, 5).unwrap_err();
        let oracle_err = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<crate::error::OracleError>())
            .expect("oracle error");
        assert!(!oracle_err.is_decode());
    }
}
