pub mod console;
pub mod json;
pub mod progress;

pub use console::ConsoleObserver;
pub use progress::{NoopObserver, Observer, ProgressEvent, SharedObserver};

use crate::model::OutcomeState;

/// One-line notice for a failed attempt, or `None` for non-failures.
pub fn failure_notice<T>(task_name: &str, state: &OutcomeState<T>) -> Option<String> {
    match state {
        OutcomeState::Timeout(msg) => Some(format!("⚠️ Task [{}] failed: {}", task_name, msg)),
        OutcomeState::Error(msg) => Some(format!("❌ Task [{}] failed: {}", task_name, msg)),
        OutcomeState::Start | OutcomeState::Success(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_are_tagged_by_failure_class() {
        let t: OutcomeState<()> = OutcomeState::Timeout("timeout (>=1.0s)".into());
        let e: OutcomeState<()> = OutcomeState::Error("boom".into());
        assert_eq!(
            failure_notice("fetch", &t).as_deref(),
            Some("⚠️ Task [fetch] failed: timeout (>=1.0s)")
        );
        assert_eq!(
            failure_notice("fetch", &e).as_deref(),
            Some("❌ Task [fetch] failed: boom")
        );
        assert_eq!(failure_notice::<()>("fetch", &OutcomeState::Start), None);
    }
}
