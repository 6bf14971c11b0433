//! Stable exit codes for the graybox CLI.

/// The tree ran to completion.
pub const OK: i32 = 0;
/// Invalid command line, config or tree description, or another I/O error.
pub const INVALID: i32 = 1;
/// A node terminated the run.
pub const TERMINATED: i32 = 2;
/// This process is a non-primary rank of a distributed run; nothing was done.
pub const SKIPPED: i32 = 3;
