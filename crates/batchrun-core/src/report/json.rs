use anyhow::Context;
use crate::model::{Outcome, RunResult, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRow {
    pub name: String,
    pub status: TaskStatus,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Machine-readable summary of one `execute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub description: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
    pub succeeded_tasks: Vec<OutcomeRow>,
    pub failed_tasks: Vec<OutcomeRow>,
}

fn row<T: Serialize>(outcome: &Outcome<T>) -> anyhow::Result<OutcomeRow> {
    let payload = match outcome.payload() {
        Some(value) => Some(serde_json::to_value(value)?),
        None => None,
    };
    Ok(OutcomeRow {
        name: outcome.name.clone(),
        status: outcome.status(),
        attempt: outcome.attempt,
        duration_ms: outcome.duration_ms,
        message: outcome.message().to_string(),
        payload,
    })
}

impl RunReport {
    pub fn from_result<T: Serialize>(
        description: &str,
        started_at: DateTime<Utc>,
        result: &RunResult<T>,
    ) -> anyhow::Result<Self> {
        let succeeded_tasks = result.succeeded.iter().map(row).collect::<anyhow::Result<Vec<_>>>()?;
        let failed_tasks = result.failed.iter().map(row).collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            description: description.to_string(),
            started_at,
            finished_at: Utc::now(),
            passed: succeeded_tasks.len(),
            failed: failed_tasks.len(),
            total: result.total(),
            succeeded_tasks,
            failed_tasks,
        })
    }
}

pub fn write_report(report: &RunReport, out: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(out, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("failed to write report {}", out.display()))?;
    Ok(())
}
