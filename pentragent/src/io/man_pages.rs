//! Tool man pages fetched through the sandbox into the document store.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::io::command_runner::CommandRunner;
use crate::io::documents::{Document, DocumentStore};
use crate::io::sandbox::Sandbox;

/// Document type under which man pages are stored.
pub const MAN_PAGE_DOC_TYPE: &str = "kali_tool";

static TOOL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+-]*$").expect("tool name regex should compile")
});

/// What happened to one requested tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManPageFetch {
    Saved(PathBuf),
    /// `man` printed nothing, failed, or timed out.
    Missing { reason: String },
}

/// Shell line that renders the man page of `tool` as plain text.
pub fn man_command(tool: &str) -> String {
    format!("man {tool} 2>/dev/null | col -bx")
}

/// Fetch the man page of `tool` inside the sandbox and save it as a
/// [`MAN_PAGE_DOC_TYPE`] document.
///
/// Tool names are restricted to a conservative character set since they are
/// spliced into a shell line. An unreachable sandbox is an error; a missing
/// page is not.
#[instrument(skip(runner, store))]
pub fn fetch_man_page<S: Sandbox>(
    runner: &CommandRunner<S>,
    store: &DocumentStore,
    tool: &str,
    timeout: Duration,
) -> Result<ManPageFetch> {
    if !TOOL_NAME.is_match(tool) {
        bail!("invalid tool name {tool:?}");
    }

    let result = runner
        .execute(&man_command(tool), timeout)
        .with_context(|| format!("fetch man page for {tool}"))?;
    let reason = if result.timed_out {
        Some("man timed out".to_string())
    } else if result.exit_code != 0 {
        Some(format!("man exited with {}", result.exit_code))
    } else if result.stdout.trim().is_empty() {
        Some("no man page".to_string())
    } else {
        None
    };
    if let Some(reason) = reason {
        warn!(reason = %reason, "man page not saved");
        return Ok(ManPageFetch::Missing { reason });
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default();
    let path = store.save(&Document {
        title: tool.to_string(),
        content: result.stdout,
        source: format!("man {tool}"),
        doc_type: MAN_PAGE_DOC_TYPE.to_string(),
        timestamp,
        metadata: json!({ "tool_name": tool }),
    })?;
    info!(path = %path.display(), "man page saved");
    Ok(ManPageFetch::Saved(path))
}
