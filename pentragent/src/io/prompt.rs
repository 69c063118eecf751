//! Prompt builder for oracle calls.
//!
//! Each decision kind has one template. Rendered templates are split into
//! sections by `<!-- section:KEY required|droppable -->` markers and then fit
//! into a byte budget.

use anyhow::Result;
use minijinja::{Environment, context};
use tracing::debug;

const NEXT_STEP_TEMPLATE: &str = include_str!("prompts/next_step.md");
const FRONTIER_SEED_TEMPLATE: &str = include_str!("prompts/frontier_seed.md");
const FRONTIER_UPDATE_TEMPLATE: &str = include_str!("prompts/frontier_update.md");
const DIGEST_TEMPLATE: &str = include_str!("prompts/digest.md");

const TRUNCATED_MARKER: &str = "[earlier steps truncated]\n";

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("next_step", NEXT_STEP_TEMPLATE)
            .expect("next_step template should be valid");
        env.add_template("frontier_seed", FRONTIER_SEED_TEMPLATE)
            .expect("frontier_seed template should be valid");
        env.add_template("frontier_update", FRONTIER_UPDATE_TEMPLATE)
            .expect("frontier_update template should be valid");
        env.add_template("digest", DIGEST_TEMPLATE)
            .expect("digest template should be valid");
        Self { env }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        Ok(template.render(ctx)?)
    }
}

fn non_empty(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Inputs for the next-step decision of a lead's sub-loop.
#[derive(Debug, Clone)]
pub struct NextStepInputs<'a> {
    pub target: &'a str,
    pub lead: &'a str,
    pub history: &'a str,
    pub references: &'a [String],
    pub transcript: &'a str,
    pub notice: Option<&'a str>,
    pub step_budget: u32,
    pub remaining_steps: u32,
    pub timeout_secs: u64,
}

/// Inputs for the initial frontier decision.
#[derive(Debug, Clone)]
pub struct SeedInputs<'a> {
    pub target: &'a str,
    pub references: &'a [String],
    pub max_leads: usize,
}

/// Inputs for the frontier update decision after a lead finishes.
#[derive(Debug, Clone)]
pub struct UpdateInputs<'a> {
    pub target: &'a str,
    pub lead: &'a str,
    pub outcome: &'a str,
    pub digest: &'a str,
    pub dead_end: bool,
    pub frontier: &'a str,
    pub history: &'a str,
}

/// Inputs for summarizing a finished transcript.
#[derive(Debug, Clone)]
pub struct DigestInputs<'a> {
    pub target: &'a str,
    pub lead: &'a str,
    pub outcome: &'a str,
    pub transcript: &'a str,
    pub max_chars: usize,
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    /// Section identifier (e.g., "contract", "transcript").
    key: String,
    /// Whether this section is required (cannot be dropped).
    required: bool,
    /// Full section content including header.
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    use std::sync::LazyLock;
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker regex")
    });

    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str().to_string();
            let required = caps.get(2)?.as_str() == "required";
            Some((whole.start(), whole.end(), key, required))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (_, start, key, required)) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map(|next| next.0)
            .unwrap_or(rendered.len());
        let content = rendered[*start..end].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }

    sections
}

/// Apply budget to parsed sections.
///
/// Drop order: references -> history. The transcript is never dropped; it is
/// trimmed from the front so the newest steps survive. Anything still over
/// budget truncates the last section.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    // Sections are joined with a blank line when rendered.
    let total_len = |secs: &[ParsedSection]| -> usize {
        let separators = secs.len().saturating_sub(1) * 2;
        secs.iter().map(|s| s.content.len()).sum::<usize>() + separators
    };

    if total_len(sections) <= budget {
        return;
    }

    for key in ["references", "history"] {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let over = total_len(sections).saturating_sub(budget);
    if over > 0
        && let Some(section) = sections.iter_mut().find(|s| s.key == "transcript")
    {
        let before_len = section.content.len();
        section.content = trim_front(&section.content, over + TRUNCATED_MARKER.len());
        debug!(
            before_len,
            after_len = section.content.len(),
            "trimmed transcript for budget"
        );
    }

    let over = total_len(sections).saturating_sub(budget);
    if over > 0
        && let Some(last) = sections.last_mut()
    {
        let allowed = last.content.len().saturating_sub(over);
        let before_len = last.content.len();
        if allowed > 12 {
            truncate_on_char_boundary(&mut last.content, allowed - 12);
            last.content.push_str("\n[truncated]");
        } else {
            truncate_on_char_boundary(&mut last.content, allowed);
        }
        debug!(
            section = %last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

/// Remove at least `excess` bytes from the body of a transcript section,
/// keeping its header line and the newest content.
fn trim_front(content: &str, excess: usize) -> String {
    let (header, body) = match content.find("<transcript>") {
        Some(idx) => {
            let split = idx + "<transcript>".len();
            (&content[..split], &content[split..])
        }
        None => ("", content),
    };
    let mut cut = excess.min(body.len());
    while !body.is_char_boundary(cut) {
        cut += 1;
    }
    // Resume at a step boundary when one is available.
    let rest = &body[cut..];
    let rest = match rest.find("\nStep ") {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    format!("{header}\n{TRUNCATED_MARKER}{rest}")
}

fn truncate_on_char_boundary(text: &mut String, max_len: usize) {
    if text.len() <= max_len {
        return;
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

/// Render sections back to a single string.
fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds prompts within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    /// Create a builder with the given byte budget.
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn next_step(&self, input: &NextStepInputs<'_>) -> Result<PromptPack> {
        let rendered = PromptEngine::new().render(
            "next_step",
            context! {
                target => input.target.trim(),
                lead => input.lead,
                history => non_empty(input.history),
                references => input.references,
                transcript => non_empty(input.transcript),
                notice => input.notice.and_then(non_empty),
                step_budget => input.step_budget,
                remaining_steps => input.remaining_steps,
                timeout_secs => input.timeout_secs,
            },
        )?;
        Ok(self.fit(&rendered))
    }

    pub fn frontier_seed(&self, input: &SeedInputs<'_>) -> Result<PromptPack> {
        let rendered = PromptEngine::new().render(
            "frontier_seed",
            context! {
                target => input.target.trim(),
                references => input.references,
                max_leads => input.max_leads,
            },
        )?;
        Ok(self.fit(&rendered))
    }

    pub fn frontier_update(&self, input: &UpdateInputs<'_>) -> Result<PromptPack> {
        let rendered = PromptEngine::new().render(
            "frontier_update",
            context! {
                target => input.target.trim(),
                lead => input.lead,
                outcome => input.outcome,
                digest => input.digest.trim(),
                dead_end => if input.dead_end { "yes" } else { "no" },
                frontier => non_empty(input.frontier),
                history => non_empty(input.history),
            },
        )?;
        Ok(self.fit(&rendered))
    }

    pub fn digest(&self, input: &DigestInputs<'_>) -> Result<PromptPack> {
        let rendered = PromptEngine::new().render(
            "digest",
            context! {
                target => input.target.trim(),
                lead => input.lead,
                outcome => input.outcome,
                transcript => non_empty(input.transcript),
                max_chars => input.max_chars,
            },
        )?;
        Ok(self.fit(&rendered))
    }

    fn fit(&self, rendered: &str) -> PromptPack {
        let mut sections = parse_sections(rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        PromptPack {
            content: render_sections(&sections),
        }
    }
}

/// A rendered prompt ready to send to the oracle.
#[derive(Debug, Clone)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    /// Get the rendered prompt content.
    pub fn render(&self) -> String {
        self.content.clone()
    }
}
