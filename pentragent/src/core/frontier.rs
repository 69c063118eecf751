//! Frontier and history bookkeeping.
//!
//! The frontier is the queue of leads still awaiting execution; the history is
//! every lead ever admitted to it. Both are plain in-memory values so the
//! update rules can be tested without an oracle.

use std::collections::VecDeque;

use serde::Serialize;

use super::lead::Lead;

/// Ordered queue of active leads. Never holds two equal leads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Frontier {
    leads: VecDeque<Lead>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }

    pub fn contains(&self, lead: &Lead) -> bool {
        self.leads.contains(lead)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lead> {
        self.leads.iter()
    }

    /// Take the next lead to execute.
    pub fn pop_front(&mut self) -> Option<Lead> {
        self.leads.pop_front()
    }

    /// Append `lead` unless it is already queued. Returns whether it was added.
    pub fn push_back(&mut self, lead: Lead) -> bool {
        if self.contains(&lead) {
            return false;
        }
        self.leads.push_back(lead);
        true
    }

    /// Remove `lead` if queued. Returns whether it was present.
    pub fn remove(&mut self, lead: &Lead) -> bool {
        let before = self.leads.len();
        self.leads.retain(|queued| queued != lead);
        self.leads.len() != before
    }
}

impl FromIterator<Lead> for Frontier {
    fn from_iter<T: IntoIterator<Item = Lead>>(iter: T) -> Self {
        let mut frontier = Frontier::new();
        for lead in iter {
            frontier.push_back(lead);
        }
        frontier
    }
}

/// Every lead ever admitted to the frontier, in admission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct History {
    leads: Vec<Lead>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }

    pub fn contains(&self, lead: &Lead) -> bool {
        self.leads.contains(lead)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lead> {
        self.leads.iter()
    }

    /// Record `lead` unless already present. Returns whether it was recorded.
    pub fn admit(&mut self, lead: Lead) -> bool {
        if self.contains(&lead) {
            return false;
        }
        self.leads.push(lead);
        true
    }

    /// Purge `lead`. Returns whether it was present.
    pub fn purge(&mut self, lead: &Lead) -> bool {
        let before = self.leads.len();
        self.leads.retain(|known| known != lead);
        self.leads.len() != before
    }

    /// Render as a bullet list for prompts.
    pub fn render(&self) -> String {
        render_leads(self.leads.iter())
    }
}

impl FromIterator<Lead> for History {
    fn from_iter<T: IntoIterator<Item = Lead>>(iter: T) -> Self {
        let mut history = History::new();
        for lead in iter {
            history.admit(lead);
        }
        history
    }
}

pub(crate) fn render_leads<'a>(leads: impl Iterator<Item = &'a Lead>) -> String {
    leads
        .map(|lead| format!("- {lead}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lead additions and removals requested after a lead finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrontierUpdate {
    pub to_add: Vec<Lead>,
    pub to_remove: Vec<Lead>,
}

/// What actually changed when a [`FrontierUpdate`] was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppliedUpdate {
    /// Leads appended to the frontier.
    pub added: Vec<Lead>,
    /// Leads purged from the frontier and/or the history.
    pub removed: Vec<Lead>,
}

impl AppliedUpdate {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Apply `update`: removals first, then additions.
///
/// A lead named in both lists of one update stays removed. Removal purges the
/// lead from the frontier and the history.
pub fn apply_update(
    frontier: &mut Frontier,
    history: &mut History,
    update: &FrontierUpdate,
) -> AppliedUpdate {
    let mut applied = AppliedUpdate::default();

    for lead in &update.to_remove {
        let in_frontier = frontier.remove(lead);
        let in_history = history.purge(lead);
        if (in_frontier || in_history) && !applied.removed.contains(lead) {
            applied.removed.push(lead.clone());
        }
    }

    for lead in &update.to_add {
        if update.to_remove.contains(lead) {
            continue;
        }
        if frontier.push_back(lead.clone()) {
            applied.added.push(lead.clone());
        }
        history.admit(lead.clone());
    }

    applied
}
