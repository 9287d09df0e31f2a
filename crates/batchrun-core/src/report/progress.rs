//! Progress reporting for runner rounds. The runner emits done/total per
//! completion; display layers consume it through an [`Observer`].

use std::sync::Arc;

/// One progress update: how many tasks of the current round are done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
}

/// Sink for round progress and out-of-band failure notices.
///
/// `write` may be called while a round is in progress; implementations must
/// keep it from corrupting whatever progress rendering they do.
pub trait Observer: Send + Sync {
    fn round_started(&self, label: &str, total: usize);

    fn task_finished(&self, event: ProgressEvent);

    fn round_finished(&self, _label: &str) {}

    fn write(&self, message: &str);
}

pub type SharedObserver = Arc<dyn Observer>;

/// Observer that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn round_started(&self, _label: &str, _total: usize) {}

    fn task_finished(&self, _event: ProgressEvent) {}

    fn write(&self, _message: &str) {}
}
