use crate::config::RunnerConfig;
use crate::engine::dispatch::{dispatch_concurrent, dispatch_sequential};
use crate::engine::invoke::{Invocation, ResultProcessor};
use crate::errors::RunError;
use crate::model::{Arguments, Outcome, RunResult, TaskSpec, TaskStatus};
use crate::report::{ConsoleObserver, SharedObserver};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Per-call settings for [`Runner::execute`].
pub struct ExecuteOptions<T> {
    /// Merged into every task's arguments; unique arguments win on collision.
    pub common_args: Arguments,
    pub result_processor: Option<ResultProcessor<T>>,
    pub parallel: bool,
    /// Number of rounds. Zero runs nothing.
    pub max_retry_times: u32,
    /// Failure classes re-dispatched after the first round. Empty means
    /// failures are never retried.
    pub retry_task_filters: BTreeSet<TaskStatus>,
}

impl<T> Default for ExecuteOptions<T> {
    fn default() -> Self {
        Self {
            common_args: Arguments::new(),
            result_processor: None,
            parallel: false,
            max_retry_times: 1,
            retry_task_filters: BTreeSet::new(),
        }
    }
}

impl<T> ExecuteOptions<T> {
    pub fn with_common_args(mut self, common_args: Arguments) -> Self {
        self.common_args = common_args;
        self
    }

    pub fn with_result_processor(
        mut self,
        processor: impl Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.result_processor = Some(Arc::new(processor));
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn max_retry_times(mut self, rounds: u32) -> Self {
        self.max_retry_times = rounds;
        self
    }

    pub fn retry_on(mut self, status: TaskStatus) -> Self {
        self.retry_task_filters.insert(status);
        self
    }

    fn validate(&self) -> Result<(), RunError> {
        if let Some(bad) = self
            .retry_task_filters
            .iter()
            .find(|status| !status.is_retryable())
        {
            return Err(RunError::invalid_args(format!(
                "retry filter '{}' is not a failure status (expected timeout|error)",
                bad
            )));
        }
        Ok(())
    }
}

fn is_eligible<T>(outcome: &Outcome<T>, filters: &BTreeSet<TaskStatus>) -> bool {
    let status = outcome.status();
    status == TaskStatus::Start || filters.contains(&status)
}

pub struct Runner {
    config: RunnerConfig,
    observer: SharedObserver,
}

impl Runner {
    /// Runner reporting to stderr.
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            observer: Arc::new(ConsoleObserver::stderr()),
        }
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run every task, retrying eligible failures for up to
    /// `max_retry_times` rounds. Each task ends up in exactly one of
    /// `succeeded`/`failed`. Task faults never escape; only invalid options
    /// do.
    pub async fn execute<T, F>(
        &self,
        func: F,
        tasks: Vec<TaskSpec>,
        options: ExecuteOptions<T>,
    ) -> Result<RunResult<T>, RunError>
    where
        T: Send + 'static,
        F: Fn(&Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        options.validate()?;
        let ExecuteOptions {
            common_args,
            result_processor,
            parallel,
            max_retry_times,
            retry_task_filters,
        } = options;

        let inv = Invocation {
            func: Arc::new(func),
            common: Arc::new(common_args),
            processor: result_processor,
            timeout: self.config.timeout(),
            timeout_secs: self.config.timeout_secs(),
            observer: self.config.verbose.then(|| self.observer.clone()),
        };

        let mut succeeded: Vec<Outcome<T>> = Vec::new();
        let mut failed: Vec<Outcome<T>> = tasks.into_iter().map(Outcome::start).collect();

        for retry_time in 0..max_retry_times {
            if failed.is_empty() {
                break;
            }
            let attempt = retry_time + 1;
            let (eligible, carried): (Vec<_>, Vec<_>) = failed
                .into_iter()
                .partition(|o| is_eligible(o, &retry_task_filters));
            if eligible.is_empty() {
                // Filtered-out statuses cannot change without an attempt.
                tracing::debug!(round = attempt, carried = carried.len(), "no eligible tasks left");
                failed = carried;
                break;
            }

            tracing::debug!(
                round = attempt,
                eligible = eligible.len(),
                carried = carried.len(),
                parallel,
                "dispatching round"
            );
            let label = self.config.round_label(attempt);
            let batch: Vec<TaskSpec> = eligible.into_iter().map(Outcome::into_task).collect();
            let round = if parallel {
                dispatch_concurrent(&inv, batch, attempt, &label, self.config.max_concurrency)
                    .await
            } else {
                dispatch_sequential(&inv, batch, attempt, &label)
            };

            failed = carried;
            for outcome in round {
                if outcome.is_success() {
                    succeeded.push(outcome);
                } else {
                    failed.push(outcome);
                }
            }
        }

        tracing::debug!(
            succeeded = succeeded.len(),
            failed = failed.len(),
            "run finished"
        );
        Ok(RunResult { succeeded, failed })
    }
}
