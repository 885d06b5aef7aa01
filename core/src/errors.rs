//! Error types for circuit breaker operations

use crate::state::CircuitState;
use std::fmt;
use thiserror::Error;

/// Why the breaker declined to run a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Circuit is open and cooling down
    Open,
    /// Another caller's probe is running
    HalfOpenProbeInFlight,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Open => f.write_str("open"),
            RejectReason::HalfOpenProbeInFlight => f.write_str("half-open probe in progress"),
        }
    }
}

/// Errors returned by [`crate::Breaker::execute`]
///
/// A rejection means the task never ran. `Execution` carries the task's own
/// error, untouched.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The breaker refused to run the task; retry later
    #[error("circuit '{circuit}' rejected call: {reason}")]
    Rejected {
        circuit: String,
        reason: RejectReason,
    },
    /// The task ran and failed
    #[error("{0}")]
    Execution(E),
}

impl<E> CircuitError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, CircuitError::Rejected { .. })
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            CircuitError::Rejected { reason, .. } => Some(*reason),
            CircuitError::Execution(_) => None,
        }
    }

    /// The task's error, if the task ran
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            CircuitError::Rejected { .. } => None,
        }
    }
}

/// Errors raised while constructing a breaker
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("backoff multiplier must be at least 1")]
    ZeroMultiplier,
    #[error("a circuit cannot start in the internal ResetTimeout state")]
    InitialResetTimeout,
    #[error("failed to spawn reset timer thread: {0}")]
    TimerSpawn(#[from] std::io::Error),
}

/// A transition that must succeed did not; the single-probe guarantee was broken
#[derive(Debug, Error)]
#[error("circuit '{circuit}': expected {expected} -> {target} but found {found}")]
pub struct InvariantViolation {
    pub circuit: String,
    pub expected: CircuitState,
    pub target: CircuitState,
    pub found: CircuitState,
}
