//! Process exit codes. Part of the public contract for scripts and CI.

pub const SUCCESS: i32 = 0;
pub const TASKS_FAILED: i32 = 1; // At least one task ended in `failed`
pub const CONFIG_ERROR: i32 = 2; // Batch file unreadable/invalid or bad arguments
pub const RUNTIME_ERROR: i32 = 3; // Tasks ran but the run could not be recorded (e.g. report I/O)
pub const INTERRUPTED: i32 = 130; // Ctrl-C; running commands were killed
