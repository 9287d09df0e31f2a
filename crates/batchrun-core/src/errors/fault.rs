//! Turning task faults into outcome states.

use crate::model::OutcomeState;
use std::any::Any;

/// Returned by a callable to report a timeout-shaped fault of its own.
/// Classified as `timeout` regardless of the runner's configured limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, thiserror::Error)]
#[error("timeout")]
pub struct TaskTimedOut;

/// Message for a `timeout` outcome. A configured limit is echoed back with
/// at least one decimal, so `3.0` stays `3.0`.
pub fn timeout_message(timeout_secs: Option<f64>) -> String {
    match timeout_secs {
        Some(secs) => format!("timeout (>={:?}s)", secs),
        None => "timeout".to_string(),
    }
}

pub(crate) fn is_timeout_fault(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.is::<TaskTimedOut>() || cause.is::<tokio::time::error::Elapsed>()
    })
}

/// Classify a fault raised by a callable or a result post-processor. The
/// error message keeps the whole context chain.
pub fn classify_fault<T>(err: &anyhow::Error, timeout_secs: Option<f64>) -> OutcomeState<T> {
    if is_timeout_fault(err) {
        OutcomeState::Timeout(timeout_message(timeout_secs))
    } else {
        OutcomeState::Error(format!("{:#}", err))
    }
}

/// Render a panic payload the way `error` outcomes carry it.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };
    format!("panicked: {}", detail)
}
