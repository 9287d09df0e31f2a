//! Batch task runner: runs a callable over named task inputs, concurrently or
//! sequentially, with per-task timeouts and status-filtered retry rounds.

pub mod config;
pub mod engine;
pub mod errors;
pub mod model;
pub mod report;

pub use config::{load_runner_config, RunnerConfig};
pub use engine::{ExecuteOptions, ResultProcessor, Runner};
pub use errors::{RunError, RunErrorKind, TaskTimedOut};
pub use model::{merge_arguments, Arguments, Outcome, OutcomeState, RunResult, TaskSpec, TaskStatus};
