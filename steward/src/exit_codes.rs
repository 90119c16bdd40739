//! Stable exit codes for steward CLI commands.

/// Command succeeded: invariants pass, gate allows, or the pipeline is done.
pub const OK: i32 = 0;
/// Denied, exhausted, escalated, or unrecoverable. The JSON output carries `error_class`.
pub const FAILED: i32 = 1;
