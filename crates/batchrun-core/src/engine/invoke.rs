//! Per-task invocation: merge arguments, run the callable under the optional
//! timeout, post-process, classify. Two paths share [`Invocation::settle`]:
//! `invoke_direct` runs on the caller, `invoke_off_context` on the blocking pool.

use crate::errors::fault::{classify_fault, panic_message, timeout_message};
use crate::model::{merge_arguments, Arguments, Outcome, OutcomeState, TaskSpec};
use crate::report::{failure_notice, SharedObserver};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The task callable. Receives the merged arguments.
pub type TaskFn<T> = Arc<dyn Fn(&Arguments) -> anyhow::Result<T> + Send + Sync>;

/// Side-effecting callback run once per successful result. A failure here
/// turns the task into an `error`.
pub type ResultProcessor<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

/// Raw result of running the callable: the panic message when it unwound.
type RawResult<T> = Result<anyhow::Result<T>, String>;

pub(crate) struct Invocation<T> {
    pub(crate) func: TaskFn<T>,
    pub(crate) common: Arc<Arguments>,
    pub(crate) processor: Option<ResultProcessor<T>>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) timeout_secs: Option<f64>,
    /// `None` when the runner is not verbose.
    pub(crate) observer: Option<SharedObserver>,
}

impl<T> Clone for Invocation<T> {
    fn clone(&self) -> Self {
        Self {
            func: self.func.clone(),
            common: self.common.clone(),
            processor: self.processor.clone(),
            timeout: self.timeout,
            timeout_secs: self.timeout_secs,
            observer: self.observer.clone(),
        }
    }
}

impl<T: Send + 'static> Invocation<T> {
    /// Run on the calling context. A callable that blocks past the limit is
    /// not interrupted; only a timeout fault it reports itself is classified
    /// as `timeout`.
    pub(crate) fn invoke_direct(&self, task: TaskSpec, attempt: u32) -> Outcome<T> {
        let started = Instant::now();
        let merged = merge_arguments(&task.args, &self.common);
        let raw = catch_unwind(AssertUnwindSafe(|| (self.func)(&merged))).map_err(panic_message);
        let state = self.settle(raw);
        self.finish(task, attempt, started, state)
    }

    /// Run on the blocking pool, raced against the timeout. Losing the race
    /// abandons the result; the worker thread runs the call to completion.
    pub(crate) async fn invoke_off_context(&self, task: TaskSpec, attempt: u32) -> Outcome<T> {
        let started = Instant::now();
        let func = self.func.clone();
        let common = self.common.clone();
        let unique = task.args.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let merged = merge_arguments(&unique, &common);
            func(&merged)
        });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    let state = OutcomeState::Timeout(timeout_message(self.timeout_secs));
                    return self.finish(task, attempt, started, state);
                }
            },
            None => handle.await,
        };

        let raw = joined.map_err(|e| {
            if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                format!("task did not complete: {}", e)
            }
        });
        let state = self.settle(raw);
        self.finish(task, attempt, started, state)
    }

    fn settle(&self, raw: RawResult<T>) -> OutcomeState<T> {
        match raw {
            Err(panicked) => OutcomeState::Error(panicked),
            Ok(Err(e)) => classify_fault(&e, self.timeout_secs),
            Ok(Ok(value)) => match self.post_process(&value) {
                None => OutcomeState::Success(value),
                Some(failed) => failed,
            },
        }
    }

    fn post_process(&self, value: &T) -> Option<OutcomeState<T>> {
        let processor = self.processor.as_ref()?;
        match catch_unwind(AssertUnwindSafe(|| processor(value))) {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(classify_fault(&e, self.timeout_secs)),
            Err(payload) => Some(OutcomeState::Error(panic_message(payload))),
        }
    }

    /// Build the outcome record and emit the failure notice, if any.
    pub(crate) fn finish(
        &self,
        task: TaskSpec,
        attempt: u32,
        started: Instant,
        state: OutcomeState<T>,
    ) -> Outcome<T> {
        if let Some(notice) = failure_notice(&task.name, &state) {
            match &self.observer {
                Some(observer) => {
                    tracing::debug!(task = %task.name, status = %state.status(), attempt, "{}", notice);
                    observer.write(&notice);
                }
                None => {
                    tracing::warn!(task = %task.name, status = %state.status(), attempt, "{}", notice);
                }
            }
        }
        Outcome {
            name: task.name,
            args: task.args,
            state,
            attempt,
            duration_ms: Some(started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TaskTimedOut;
    use crate::model::TaskStatus;
    use crate::report::{Observer, ProgressEvent};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Notes(Mutex<Vec<String>>);

    impl Observer for Notes {
        fn round_started(&self, _label: &str, _total: usize) {}
        fn task_finished(&self, _event: ProgressEvent) {}
        fn write(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    fn invocation<T>(
        func: impl Fn(&Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
        timeout_secs: Option<f64>,
        observer: Option<SharedObserver>,
    ) -> Invocation<T> {
        Invocation {
            func: Arc::new(func),
            common: Arc::new(json!({"shared": 1, "k": "common"}).as_object().cloned().unwrap()),
            processor: None,
            timeout: timeout_secs.map(Duration::from_secs_f64),
            timeout_secs,
            observer,
        }
    }

    fn task(name: &str) -> TaskSpec {
        TaskSpec::new(name, json!({"k": "unique"}).as_object().cloned().unwrap())
    }

    #[test]
    fn direct_success_sees_merged_args_and_keeps_unique_args() {
        let inv = invocation(|a: &Arguments| Ok(format!("{}-{}", a["k"], a["shared"])), None, None);
        let out = inv.invoke_direct(task("t"), 1);
        assert_eq!(out.state, OutcomeState::Success("\"unique\"-1".to_string()));
        assert_eq!(out.args.len(), 1, "outcome carries only the unique args");
        assert_eq!(out.attempt, 1);
        assert!(out.duration_ms.is_some());
    }

    #[test]
    fn direct_error_and_panic_become_error_outcomes() {
        let notes = Arc::new(Notes::default());
        let inv: Invocation<()> = invocation(
            |_| Err(anyhow::anyhow!("bad input")),
            None,
            Some(notes.clone() as SharedObserver),
        );
        let out = inv.invoke_direct(task("e"), 1);
        assert_eq!(out.state, OutcomeState::Error("bad input".into()));

        let inv: Invocation<()> = invocation(|_| panic!("kaboom"), None, None);
        let out = inv.invoke_direct(task("p"), 1);
        assert_eq!(out.state, OutcomeState::Error("panicked: kaboom".into()));

        assert_eq!(
            notes.0.lock().unwrap().as_slice(),
            ["❌ Task [e] failed: bad input".to_string()]
        );
    }

    #[test]
    fn direct_reported_timeout_uses_configured_limit() {
        let inv: Invocation<()> = invocation(|_| Err(TaskTimedOut.into()), Some(3.0), None);
        let out = inv.invoke_direct(task("slow"), 2);
        assert_eq!(out.status(), TaskStatus::Timeout);
        assert_eq!(out.message(), "timeout (>=3.0s)");
    }

    #[test]
    fn processor_failure_is_task_error() {
        let mut inv = invocation(|_| Ok(5_u32), None, None);
        let processor: ResultProcessor<u32> = Arc::new(|v: &u32| {
            anyhow::ensure!(*v < 5, "value {} too large", v);
            Ok(())
        });
        inv.processor = Some(processor);
        let out = inv.invoke_direct(task("proc"), 1);
        assert_eq!(out.state, OutcomeState::Error("value 5 too large".into()));
    }

    #[tokio::test]
    async fn off_context_times_out_slow_callable() {
        let notes = Arc::new(Notes::default());
        let inv: Invocation<()> = invocation(
            |_| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            },
            Some(0.05),
            Some(notes.clone() as SharedObserver),
        );
        let out = inv.invoke_off_context(task("sleepy"), 1).await;
        assert_eq!(out.state, OutcomeState::Timeout("timeout (>=0.05s)".into()));
        assert_eq!(
            notes.0.lock().unwrap().as_slice(),
            ["⚠️ Task [sleepy] failed: timeout (>=0.05s)".to_string()]
        );
    }

    #[tokio::test]
    async fn off_context_matches_direct_classification() {
        let inv: Invocation<String> = invocation(
            |a: &Arguments| match a["k"].as_str() {
                Some("unique") => Err(anyhow::anyhow!("rejected {}", a["shared"])),
                _ => Ok("ok".into()),
            },
            Some(5.0),
            None,
        );
        let direct = inv.invoke_direct(task("same"), 1);
        let off = inv.invoke_off_context(task("same"), 1).await;
        assert_eq!(direct.state, off.state);
        assert_eq!(direct.name, off.name);
        assert_eq!(direct.args, off.args);

        let inv: Invocation<()> = invocation(|_| panic!("worker panic"), None, None);
        let off = inv.invoke_off_context(task("p"), 1).await;
        assert_eq!(off.state, OutcomeState::Error("panicked: worker panic".into()));
    }
}
