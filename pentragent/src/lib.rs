//! Autonomous penetration-testing agent driven by a decision oracle.
//!
//! A run keeps a frontier of open leads. Each lead is pursued by a bounded
//! sub-loop that asks the oracle for one shell command at a time and runs it
//! in a sandbox under a hard timeout. Finished leads are summarized and the
//! oracle decides which leads to add or drop, until none remain.
//!
//! - **[`core`]**: Pure, deterministic logic (leads, frontier updates,
//!   transcripts, decision decoding). No I/O.
//! - **[`io`]**: Side-effecting collaborators (processes, sandbox, oracles,
//!   documents, config, records). Behind traits so tests can script them.
//! - **[`agents`]**: The lead executor, summarizer, and frontier manager.
//! - **[`engine`]**: The outer loop tying them together.

pub mod agents;
pub mod core;
pub mod engine;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
