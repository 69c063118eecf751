//! Oracle-driven components of a run: the per-lead sub-loop, the summarizer,
//! and the frontier owner.

pub mod frontier_manager;
pub mod lead_executor;
pub mod summarizer;
