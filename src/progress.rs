//! Weighted multi-step progress tracking, shared between the pipeline
//! (writer) and status polling (reader).

use parking_lot::Mutex;
use std::sync::Arc;

/// Capability to report fractional completion of one unit of work.
///
/// Stages receive a sink bound to their step index instead of a closure
/// capturing the meter, which keeps the mutable state explicit and lets
/// tests substitute a recording fake.
pub trait ProgressSink: Send + Sync {
    fn report(&self, current: u64, total: u64);
}

impl<S: ProgressSink + ?Sized> ProgressSink for Arc<S> {
    fn report(&self, current: u64, total: u64) {
        (**self).report(current, total)
    }
}

struct MeterState {
    steps: usize,
    fraction: f64,
}

/// Thread-safe progress meter over a fixed number of equally weighted steps.
///
/// The fraction is non-decreasing over the meter's lifetime, except that
/// [`Meter::rebase`] may re-baseline a provisional meter to the real step
/// count before any step has advanced.
#[derive(Clone)]
pub struct Meter {
    inner: Arc<Mutex<MeterState>>,
}

impl Meter {
    pub fn new(steps: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MeterState {
                steps,
                fraction: 0.0,
            })),
        }
    }

    /// Replace the step count and restart from zero. Used once at pipeline
    /// start to go from the provisional 1-step meter to the real one.
    pub fn rebase(&self, steps: usize) {
        let mut state = self.inner.lock();
        state.steps = steps;
        state.fraction = 0.0;
    }

    /// Current overall fraction in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.inner.lock().fraction
    }

    pub fn finished(&self) -> bool {
        self.progress() >= 1.0
    }

    /// Force the fraction to 1.0. Called on every pipeline exit path so
    /// status polling always unblocks.
    pub fn finish_now(&self) {
        self.inner.lock().fraction = 1.0;
    }

    /// A sink bound to step index `n`. Indices must be `< steps`; exceeding
    /// the step count is a caller bug, not a runtime error.
    pub fn step(&self, n: usize) -> StepSink {
        StepSink {
            inner: Arc::clone(&self.inner),
            step: n,
        }
    }
}

/// [`ProgressSink`] bound to one step of a [`Meter`].
#[derive(Clone)]
pub struct StepSink {
    inner: Arc<Mutex<MeterState>>,
    step: usize,
}

impl ProgressSink for StepSink {
    fn report(&self, current: u64, total: u64) {
        let within = (current as f64 / total.max(1) as f64).clamp(0.0, 1.0);
        let mut state = self.inner.lock();
        state.fraction = (self.step as f64 + within) / state.steps.max(1) as f64;
    }
}
