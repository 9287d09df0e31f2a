use crate::errors::RunError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Construction-time runner settings. Immutable for the runner's lifetime.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Label prefix for progress output, e.g. "Processing tasks (try 1)".
    pub description: String,

    /// Emit progress and failure notices to the observer.
    pub verbose: bool,

    /// Per-task limit in seconds. Zero or absent means no limit.
    pub timeout_seconds: Option<f64>,

    /// Upper bound on tasks in flight during a concurrent round.
    /// Absent means every eligible task is launched at once.
    pub max_concurrency: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            description: "Processing tasks".to_string(),
            verbose: true,
            timeout_seconds: None,
            max_concurrency: None,
        }
    }
}

impl RunnerConfig {
    /// Effective timeout in seconds, `None` when unset or non-positive.
    pub fn timeout_secs(&self) -> Option<f64> {
        self.timeout_seconds
            .filter(|secs| secs.is_finite() && *secs > 0.0)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs().map(Duration::from_secs_f64)
    }

    pub fn round_label(&self, attempt: u32) -> String {
        format!("{} (try {})", self.description, attempt)
    }

    /// Checks shared by every source of runner settings.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.max_concurrency == Some(0) {
            return Err(RunError::config_parse(
                None,
                "max_concurrency must be at least 1",
            ));
        }
        Ok(())
    }
}

pub fn load_runner_config(path: &Path) -> Result<RunnerConfig, RunError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        RunError::missing_config(path.display().to_string(), e.to_string())
    })?;
    parse_runner_config(&raw).map_err(|e| {
        let e = e.with_path(path.display().to_string());
        tracing::debug!(path = %path.display(), "runner config rejected: {}", e);
        e
    })
}

pub fn parse_runner_config(raw: &str) -> Result<RunnerConfig, RunError> {
    let cfg: RunnerConfig = serde_yaml::from_str(raw)
        .map_err(|e| RunError::config_parse(None, format!("invalid runner config: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}
