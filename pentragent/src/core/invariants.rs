//! Semantic invariants over the frontier and history.

use std::collections::HashSet;

use super::frontier::{Frontier, History};

/// Check invariants that must hold after every frontier mutation:
/// - No duplicate leads in the frontier
/// - No duplicate leads in the history
/// - Every frontier lead is in the history
pub fn validate_frontier(frontier: &Frontier, history: &History) -> Vec<String> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for lead in frontier.iter() {
        if !seen.insert(lead) {
            errors.push(format!("duplicate frontier lead '{lead}'"));
        }
    }

    let mut seen = HashSet::new();
    for lead in history.iter() {
        if !seen.insert(lead) {
            errors.push(format!("duplicate history lead '{lead}'"));
        }
    }

    for lead in frontier.iter() {
        if !history.contains(lead) {
            errors.push(format!("frontier lead '{lead}' missing from history"));
        }
    }

    errors
}
