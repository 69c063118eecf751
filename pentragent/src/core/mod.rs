//! Deterministic, pure logic shared by the engine.
//!
//! Core modules are free of I/O side effects. They operate on in-memory
//! leads, frontiers and transcripts and return deterministic outputs suitable
//! for tests.

pub mod budget;
pub mod decision;
pub mod digest;
pub mod frontier;
pub mod invariants;
pub mod lead;
pub mod transcript;
