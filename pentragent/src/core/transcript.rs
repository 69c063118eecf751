//! Transcripts: the ordered record of what happened while pursuing one lead.

use std::fmt;

use serde::Serialize;

use super::lead::Lead;

/// One iteration of a lead's sub-loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub command: String,
    pub topic: String,
    pub log: String,
    pub stdout: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub terminal: bool,
}

/// Why a transcript stopped growing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptOutcome {
    /// The oracle signalled that the lead is finished.
    Concluded,
    /// The step budget ran out before the oracle signalled terminal.
    BudgetExhausted { budget: u32 },
    /// The oracle kept proposing the command it had just run.
    RepeatGuard { command: String },
    /// The oracle response could not be decoded; the lead was aborted.
    Failed { error: String },
}

impl TranscriptOutcome {
    /// True for outcomes forced by the engine rather than chosen by the oracle.
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::BudgetExhausted { .. } | Self::RepeatGuard { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for TranscriptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concluded => f.write_str("concluded by the oracle"),
            Self::BudgetExhausted { budget } => write!(
                f,
                "inconclusive, step budget of {budget} exhausted before the lead concluded"
            ),
            Self::RepeatGuard { command } => write!(
                f,
                "inconclusive, loop-guard triggered by repeated command `{command}`"
            ),
            Self::Failed { error } => write!(f, "aborted, oracle response rejected: {error}"),
        }
    }
}

/// Ordered steps for one lead plus the reason the sequence ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    pub lead: Lead,
    pub steps: Vec<Step>,
    pub outcome: TranscriptOutcome,
}

impl Transcript {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }
}

/// Render steps for inclusion in a prompt, one block per step.
pub fn render_steps(steps: &[Step]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(idx, step)| {
            let mut block = format!(
                "Step {n}: {topic}\nLog: {log}\nCommand: {command}\nExit code: {code}",
                n = idx + 1,
                topic = step.topic.trim(),
                log = step.log.trim(),
                command = step.command,
                code = step.exit_code,
            );
            if step.timed_out {
                block.push_str(" (timed out)");
            }
            block.push_str("\nOutput:\n");
            let stdout = step.stdout.trim_end();
            if stdout.is_empty() {
                block.push_str("(no output)");
            } else {
                block.push_str(stdout);
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(command: &str, exit_code: i32) -> Step {
        Step {
            command: command.to_string(),
            topic: "recon".to_string(),
            log: "look around".to_string(),
            stdout: String::new(),
            exit_code,
            timed_out: exit_code == 124,
            terminal: false,
        }
    }

    #[test]
    fn render_steps_numbers_and_marks_timeouts() {
        let rendered = render_steps(&[step("id", 0), step("sleep 60", 124)]);
        assert!(rendered.starts_with("Step 1: recon"));
        assert!(rendered.contains("Step 2: recon"));
        assert!(rendered.contains("Exit code: 124 (timed out)"));
        assert!(rendered.contains("(no output)"));
    }

    #[test]
    fn outcome_flags_policy_violations() {
        assert!(TranscriptOutcome::BudgetExhausted { budget: 3 }.is_policy_violation());
        assert!(
            TranscriptOutcome::RepeatGuard {
                command: "ls".to_string()
            }
            .is_policy_violation()
        );
        assert!(!TranscriptOutcome::Concluded.is_policy_violation());
        assert!(
            TranscriptOutcome::Failed {
                error: "bad".to_string()
            }
            .is_failed()
        );
    }

    #[test]
    fn repeat_guard_outcome_reads_as_inconclusive() {
        let outcome = TranscriptOutcome::RepeatGuard {
            command: "nmap host".to_string(),
        };
        assert!(outcome.to_string().contains("loop-guard triggered"));
    }
}
