use crate::engine::invoke::Invocation;
use crate::model::{Arguments, Outcome, OutcomeState, TaskSpec};
use crate::report::ProgressEvent;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Launch every task of the round on the blocking pool and reap them in
/// completion order. Each task owns its timeout clock, started once it holds
/// a concurrency permit.
pub(crate) async fn dispatch_concurrent<T: Send + 'static>(
    inv: &Invocation<T>,
    tasks: Vec<TaskSpec>,
    attempt: u32,
    label: &str,
    max_concurrency: Option<usize>,
) -> Vec<Outcome<T>> {
    let total = tasks.len();
    if let Some(observer) = &inv.observer {
        observer.round_started(label, total);
    }

    let sem = max_concurrency.map(|n| Arc::new(Semaphore::new(n.max(1))));
    let mut join_set = JoinSet::new();
    let mut in_flight: HashMap<tokio::task::Id, TaskSpec> = HashMap::with_capacity(total);
    for task in tasks {
        let inv = inv.clone();
        let sem = sem.clone();
        let spec = task.clone();
        let handle = join_set.spawn(async move {
            let _permit = match sem {
                Some(sem) => sem.acquire_owned().await.ok(),
                None => None,
            };
            inv.invoke_off_context(spec, attempt).await
        });
        in_flight.insert(handle.id(), task);
    }

    let mut outcomes = Vec::with_capacity(total);
    while let Some(res) = join_set.join_next_with_id().await {
        let outcome = match res {
            Ok((id, outcome)) => {
                in_flight.remove(&id);
                outcome
            }
            Err(e) => {
                let task = in_flight
                    .remove(&e.id())
                    .unwrap_or_else(|| TaskSpec::new("unknown", Arguments::new()));
                let state = OutcomeState::Error(format!("join error: {}", e));
                inv.finish(task, attempt, Instant::now(), state)
            }
        };
        outcomes.push(outcome);
        if let Some(observer) = &inv.observer {
            observer.task_finished(ProgressEvent {
                done: outcomes.len(),
                total,
            });
        }
    }

    if let Some(observer) = &inv.observer {
        observer.round_finished(label);
    }
    outcomes
}

/// Run the round's tasks one at a time on the calling context, in input order.
pub(crate) fn dispatch_sequential<T: Send + 'static>(
    inv: &Invocation<T>,
    tasks: Vec<TaskSpec>,
    attempt: u32,
    label: &str,
) -> Vec<Outcome<T>> {
    let total = tasks.len();
    if let Some(observer) = &inv.observer {
        observer.round_started(label, total);
    }

    let mut outcomes = Vec::with_capacity(total);
    for task in tasks {
        outcomes.push(inv.invoke_direct(task, attempt));
        if let Some(observer) = &inv.observer {
            observer.task_finished(ProgressEvent {
                done: outcomes.len(),
                total,
            });
        }
    }

    if let Some(observer) = &inv.observer {
        observer.round_finished(label);
    }
    outcomes
}
