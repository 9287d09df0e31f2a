use crate::errors::RunError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Keyword-style arguments handed to a task callable.
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// One named unit of work and the arguments unique to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default)]
    pub args: Arguments,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, args: Arguments) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Pair task names with their unique arguments. `None` gives every task an
    /// empty argument map.
    pub fn zip(
        names: Vec<String>,
        args_list: Option<Vec<Arguments>>,
    ) -> Result<Vec<TaskSpec>, RunError> {
        let Some(args_list) = args_list else {
            return Ok(names
                .into_iter()
                .map(|name| TaskSpec::new(name, Arguments::new()))
                .collect());
        };
        if names.len() != args_list.len() {
            return Err(RunError::invalid_args(format!(
                "task_names has {} entries but unique_args_list has {}",
                names.len(),
                args_list.len()
            )));
        }
        Ok(names
            .into_iter()
            .zip(args_list)
            .map(|(name, args)| TaskSpec::new(name, args))
            .collect())
    }
}

/// Merge per-task and shared arguments. Unique keys win on collision.
#[must_use]
pub fn merge_arguments(unique: &Arguments, common: &Arguments) -> Arguments {
    let mut merged = common.clone();
    for (k, v) in unique {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Start,
    Success,
    Timeout,
    Error,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Start => "start",
            TaskStatus::Success => "success",
            TaskStatus::Timeout => "timeout",
            TaskStatus::Error => "error",
        }
    }

    /// Failure classes a caller may name in a retry filter.
    pub fn is_retryable(self) -> bool {
        matches!(self, TaskStatus::Timeout | TaskStatus::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(TaskStatus::Start),
            "success" => Ok(TaskStatus::Success),
            "timeout" => Ok(TaskStatus::Timeout),
            "error" => Ok(TaskStatus::Error),
            other => Err(RunError::invalid_args(format!(
                "unknown task status '{}' (expected start|success|timeout|error)",
                other
            ))),
        }
    }
}

/// Classification of one attempt together with what it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "payload", rename_all = "snake_case")]
pub enum OutcomeState<T> {
    Start,
    Success(T),
    Timeout(String),
    Error(String),
}

impl<T> OutcomeState<T> {
    pub fn status(&self) -> TaskStatus {
        match self {
            OutcomeState::Start => TaskStatus::Start,
            OutcomeState::Success(_) => TaskStatus::Success,
            OutcomeState::Timeout(_) => TaskStatus::Timeout,
            OutcomeState::Error(_) => TaskStatus::Error,
        }
    }
}

/// Immutable record of a task's latest attempt. A retry yields a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub name: String,
    pub args: Arguments,
    pub state: OutcomeState<T>,
    /// Round that produced this record, 1-based; 0 for the start sentinel.
    pub attempt: u32,
    pub duration_ms: Option<u64>,
}

impl<T> Outcome<T> {
    pub fn start(task: TaskSpec) -> Self {
        Self {
            name: task.name,
            args: task.args,
            state: OutcomeState::Start,
            attempt: 0,
            duration_ms: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    /// Failure message for timeout/error records; empty otherwise.
    pub fn message(&self) -> &str {
        match &self.state {
            OutcomeState::Timeout(msg) | OutcomeState::Error(msg) => msg,
            OutcomeState::Start | OutcomeState::Success(_) => "",
        }
    }

    pub fn payload(&self) -> Option<&T> {
        match &self.state {
            OutcomeState::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.state, OutcomeState::Success(_))
    }

    /// Drop the attempt record, keeping what is needed to dispatch again.
    pub fn into_task(self) -> TaskSpec {
        TaskSpec::new(self.name, self.args)
    }
}

/// Final partition of a run after all retry rounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult<T> {
    pub succeeded: Vec<Outcome<T>>,
    pub failed: Vec<Outcome<T>>,
}

impl<T> RunResult<T> {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: serde_json::Value) -> Arguments {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn merge_prefers_unique_arguments() {
        let unique = args(json!({"x": 1, "only_unique": true}));
        let common = args(json!({"x": 99, "only_common": "c"}));
        let merged = merge_arguments(&unique, &common);
        assert_eq!(merged["x"], json!(1));
        assert_eq!(merged["only_unique"], json!(true));
        assert_eq!(merged["only_common"], json!("c"));
        assert_eq!(common["x"], json!(99), "common args must not be mutated");
    }

    #[test]
    fn zip_rejects_length_mismatch() {
        let err = TaskSpec::zip(
            vec!["a".into(), "b".into()],
            Some(vec![Arguments::new()]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("task_names has 2"), "{}", err);
    }

    #[test]
    fn zip_without_args_gives_empty_maps() {
        let tasks = TaskSpec::zip(vec!["a".into(), "b".into()], None).unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.args.is_empty()));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Timeout".parse::<TaskStatus>().unwrap(), TaskStatus::Timeout);
        assert_eq!(" error ".parse::<TaskStatus>().unwrap(), TaskStatus::Error);
        assert!("flaky".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let mut outcome: Outcome<i64> = Outcome::start(TaskSpec::new("t1", Arguments::new()));
        outcome.state = OutcomeState::Timeout("timeout (>=1.5s)".into());
        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["state"]["status"], json!("timeout"));
        assert_eq!(v["state"]["payload"], json!("timeout (>=1.5s)"));
        assert_eq!(outcome.message(), "timeout (>=1.5s)");
        assert!(outcome.payload().is_none());
    }
}
