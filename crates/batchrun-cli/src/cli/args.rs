use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "batchrun",
    version,
    about = "Run a batch of commands with per-task timeouts and filtered retries"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run every task in a batch file
    Run(RunArgs),
    /// Parse a batch file and report what would run
    Validate(ValidateArgs),
}

/// Failure classes that may be retried.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Timeout,
    Error,
}

impl From<RetryClass> for batchrun_core::TaskStatus {
    fn from(class: RetryClass) -> Self {
        match class {
            RetryClass::Timeout => batchrun_core::TaskStatus::Timeout,
            RetryClass::Error => batchrun_core::TaskStatus::Error,
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    #[arg(long, default_value = "batch.yaml")]
    pub config: PathBuf,

    /// run tasks concurrently (overrides `parallel` in the batch file)
    #[arg(long, conflicts_with = "sequential")]
    pub parallel: bool,

    /// run tasks one at a time (overrides `parallel` in the batch file)
    #[arg(long)]
    pub sequential: bool,

    /// number of rounds; failed tasks matching --retry-on are re-run
    #[arg(long)]
    pub max_retry_times: Option<u32>,

    /// failure class to retry (repeatable): timeout|error
    #[arg(long = "retry-on", value_enum)]
    pub retry_on: Vec<RetryClass>,

    /// per-task timeout in seconds (0 disables)
    #[arg(long)]
    pub timeout: Option<f64>,

    /// maximum tasks in flight when running concurrently
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_concurrency: Option<u64>,

    /// suppress progress and per-task failure notices
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// where to write the JSON run report
    #[arg(long, default_value = "run.json")]
    pub output: PathBuf,
}

#[derive(Parser, Clone, Debug)]
pub struct ValidateArgs {
    #[arg(long, default_value = "batch.yaml")]
    pub config: PathBuf,
}
