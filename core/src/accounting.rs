//! Consecutive failure counting

use crate::sync::CounterCell;

/// Counts consecutive failures since the last success or reset
///
/// Only counts; the threshold check lives in the state machine because it is
/// what drives the trip.
#[derive(Debug)]
pub struct FailureAccounting<C> {
    failures: C,
}

impl<C: CounterCell> FailureAccounting<C> {
    pub fn new() -> Self {
        Self { failures: C::new() }
    }

    pub fn record_success(&self) {
        self.failures.set(0);
    }

    /// Returns the failure count including this one
    pub fn record_failure(&self) -> u64 {
        self.failures.increment()
    }

    pub fn count(&self) -> u64 {
        self.failures.get()
    }
}

impl<C: CounterCell> Default for FailureAccounting<C> {
    fn default() -> Self {
        Self::new()
    }
}
