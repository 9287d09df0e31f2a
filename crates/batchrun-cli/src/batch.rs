//! Batch file: runner settings, the command every task runs, and the tasks.

use anyhow::Context;
use batchrun_core::{Arguments, RunnerConfig, TaskSpec, TaskStatus};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct BatchFile {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(flatten)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub parallel: bool,

    #[serde(default = "default_rounds")]
    pub max_retry_times: u32,

    /// Failure classes retried after the first round.
    #[serde(default)]
    pub retry_on: Vec<TaskStatus>,

    /// Program and arguments run for every task.
    pub command: Vec<String>,

    #[serde(default)]
    pub common_args: Arguments,

    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

fn default_version() -> u32 {
    1
}

fn default_rounds() -> u32 {
    1
}

pub fn load_batch(path: &Path) -> anyhow::Result<BatchFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Batch file not found: {}", path.display()))?;
    parse_batch(&raw).with_context(|| format!("invalid batch file {}", path.display()))
}

pub fn parse_batch(raw: &str) -> anyhow::Result<BatchFile> {
    let batch: BatchFile = serde_yaml::from_str(raw)?;
    anyhow::ensure!(
        batch.version == 1,
        "unsupported batch version {} (expected 1)",
        batch.version
    );
    anyhow::ensure!(!batch.command.is_empty(), "`command` must name a program");
    if let Some(bad) = batch.retry_on.iter().find(|s| !s.is_retryable()) {
        anyhow::bail!("retry_on entry '{}' is not a failure status", bad);
    }
    batch.runner.validate()?;
    Ok(batch)
}
