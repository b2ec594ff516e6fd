//! Stable exit codes for pilot CLI commands.

/// Run reached `terminal_success`, or the command completed.
pub const OK: i32 = 0;
/// Invalid settings, plan, or environment; also any unrecoverable engine error.
pub const INVALID: i32 = 1;
/// Run landed in `terminal_failure`.
pub const FAILED: i32 = 2;
/// An operator signal stopped the run at a node boundary.
pub const CANCELLED: i32 = 3;
