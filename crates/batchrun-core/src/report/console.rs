use crate::report::progress::{Observer, ProgressEvent};
use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Format a single progress line for display. Deterministic, unit-testable.
#[must_use]
pub fn format_progress_line(label: &str, done: usize, total: usize) -> String {
    format!("{}: {}/{}", label, done, total)
}

/// Minimum interval between progress updates to avoid log spam.
const PROGRESS_MIN_INTERVAL_MS: u64 = 200;

/// For large rounds, emit at most every this many tasks (10% step).
pub(crate) fn progress_step(total: usize) -> usize {
    if total <= 10 {
        1
    } else {
        std::cmp::max(1, total / 10)
    }
}

struct ThrottleState {
    label: String,
    step: usize,
    last_emit: Option<Instant>,
}

struct Inner {
    out: Box<dyn Write + Send>,
    throttle: ThrottleState,
}

/// Line-oriented observer. Progress lines are throttled; failure notices are
/// always written. Every write holds one lock so lines never interleave.
pub struct ConsoleObserver {
    inner: Mutex<Inner>,
}

impl ConsoleObserver {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                out,
                throttle: ThrottleState {
                    label: String::new(),
                    step: 1,
                    last_emit: None,
                },
            }),
        }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    fn with_inner(&self, f: impl FnOnce(&mut Inner)) {
        // A poisoned lock only means another writer panicked mid-line.
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *guard);
    }
}

fn emit_line(out: &mut dyn Write, line: &str) {
    if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
        tracing::debug!("console observer write failed: {}", e);
    }
}

impl Observer for ConsoleObserver {
    fn round_started(&self, label: &str, total: usize) {
        self.with_inner(|inner| {
            inner.throttle = ThrottleState {
                label: label.to_string(),
                step: progress_step(total),
                last_emit: None,
            };
            emit_line(inner.out.as_mut(), &format_progress_line(label, 0, total));
        });
    }

    fn task_finished(&self, ev: ProgressEvent) {
        if ev.total == 0 {
            return;
        }
        let now = Instant::now();
        self.with_inner(|inner| {
            let t = &mut inner.throttle;
            let emit_final = ev.done == ev.total;
            let emit_step = ev.done.is_multiple_of(t.step) || ev.done == 1;
            let interval_ok = t
                .last_emit
                .map(|last| {
                    now.saturating_duration_since(last)
                        >= Duration::from_millis(PROGRESS_MIN_INTERVAL_MS)
                })
                .unwrap_or(true);
            if emit_final || (emit_step && interval_ok) {
                t.last_emit = Some(now);
                let line = format_progress_line(&t.label, ev.done, ev.total);
                emit_line(inner.out.as_mut(), &line);
            }
        });
    }

    fn write(&self, message: &str) {
        self.with_inner(|inner| emit_line(inner.out.as_mut(), message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[test]
    fn progress_line_format() {
        assert_eq!(
            format_progress_line("Processing tasks (try 1)", 3, 7),
            "Processing tasks (try 1): 3/7"
        );
    }

    #[test]
    fn step_is_ten_percent_for_large_rounds() {
        assert_eq!(progress_step(5), 1);
        assert_eq!(progress_step(10), 1);
        assert_eq!(progress_step(100), 10);
        assert_eq!(progress_step(15), 1);
    }

    #[test]
    fn final_tick_and_notices_are_always_written() {
        let buf = SharedBuf::default();
        let obs = ConsoleObserver::new(Box::new(buf.clone()));
        obs.round_started("demo (try 1)", 3);
        obs.task_finished(ProgressEvent { done: 1, total: 3 });
        obs.write("❌ Task [b] failed: nope");
        // Inside the throttle window, so only the final tick shows up.
        obs.task_finished(ProgressEvent { done: 2, total: 3 });
        obs.task_finished(ProgressEvent { done: 3, total: 3 });

        let lines = buf.lines();
        assert_eq!(
            lines,
            vec![
                "demo (try 1): 0/3",
                "demo (try 1): 1/3",
                "❌ Task [b] failed: nope",
                "demo (try 1): 3/3",
            ]
        );
    }
}
