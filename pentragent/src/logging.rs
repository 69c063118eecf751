//! Diagnostic tracing for debugging runs.
//!
//! Tracing goes to stderr and is filtered by `RUST_LOG`. The operator stream
//! (leads, commands, outputs, digests) is printed to stdout by the CLI and is
//! not affected by the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Compact output on stderr.
///
/// # Example
/// ```bash
/// RUST_LOG=pentragent=debug pentragent run 10.0.0.5
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
