//! Stable exit codes for ceil CLI commands.

/// Command succeeded, or every executed command applied cleanly.
pub const OK: i32 = 0;
/// Invalid input (syntax error, bad config) or any other error.
pub const INVALID: i32 = 1;
/// The auditor rejected the program.
pub const REJECTED: i32 = 4;
/// Commands still failed after execution or after the last repair attempt.
pub const FAILED: i32 = 5;
