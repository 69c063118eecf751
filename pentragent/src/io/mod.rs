//! Side-effecting collaborators: processes, the sandbox, oracles, files.

pub mod chat_oracle;
pub mod command_oracle;
pub mod command_runner;
pub mod config;
pub mod documents;
pub mod man_pages;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod recorder;
pub mod sandbox;
