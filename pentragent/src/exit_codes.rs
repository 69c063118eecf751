//! Stable exit codes for pentragent CLI commands.

/// The run finished with an empty frontier, or the command succeeded.
pub const OK: i32 = 0;
/// Invalid usage or configuration, or any other unrecoverable error.
pub const INVALID: i32 = 1;
/// The oracle answered a seed or update call with a malformed decision.
pub const DECODE_FAILURE: i32 = 2;
/// The oracle or the sandbox could not be reached.
pub const TRANSPORT_FAILURE: i32 = 3;
