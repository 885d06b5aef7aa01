//! Circuit states and their packed representation

use std::fmt;

/// State of a circuit breaker
///
/// `ResetTimeout` is internal: it marks an `Open` circuit whose cooldown has
/// elapsed, so the next caller may probe. It is reported as `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CircuitState {
    /// Calls run normally; failures accumulate
    Closed = 0,
    /// Calls are rejected until the reset timer fires
    Open = 1,
    /// Cooldown elapsed; the next caller becomes the probe
    ResetTimeout = 2,
    /// A single probe is in flight; other calls are rejected
    HalfOpen = 3,
}

impl CircuitState {
    /// The state as seen from outside the breaker
    pub fn external(self) -> Self {
        match self {
            CircuitState::ResetTimeout => CircuitState::Open,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::ResetTimeout => "ResetTimeout",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::ResetTimeout,
            3 => CircuitState::HalfOpen,
            other => unreachable!("invalid circuit state byte {}", other),
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
