//! Leads: the investigative objectives the engine pursues.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A short natural-language objective. Identity is its exact text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lead(String);

impl Lead {
    /// Build a lead from oracle text, trimming surrounding whitespace.
    ///
    /// Returns `None` for blank text.
    pub fn new(text: impl AsRef<str>) -> Option<Self> {
        let trimmed = text.as_ref().trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Lead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convert raw oracle strings into leads, dropping blanks and keeping the
/// first occurrence of each text.
pub fn leads_from_texts<I, S>(texts: I) -> Vec<Lead>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut leads: Vec<Lead> = Vec::new();
    for lead in texts.into_iter().filter_map(Lead::new) {
        if !leads.contains(&lead) {
            leads.push(lead);
        }
    }
    leads
}
