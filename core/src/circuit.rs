//! Circuit breaker state machine
//!
//! ```text
//! Closed ──[failures > max_failures]──> Open ──[reset timer]──> ResetTimeout
//!   ▲                                    ▲                          │
//!   │                                    │ [probe fails]            │ [first caller wins CAS]
//!   │                                    │                          ▼
//!   └────────────[probe succeeds]─────────────────────────────── HalfOpen
//! ```
//!
//! Every transition is a compare-and-set from the expected prior state.
//! Counters and the reset delay are updated independently of the state cell;
//! they are only consulted by the thread that just won a transition.

use crate::{
    accounting::FailureAccounting,
    backoff,
    callbacks::CircuitListener,
    errors::{BuildError, CircuitError, InvariantViolation, RejectReason},
    scheduler::ResetTimer,
    state::CircuitState,
    sync::{Atomic, DelayCell, ListenerSet, Local, StateCell, SyncStrategy},
};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static CIRCUIT_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Consecutive failures tolerated while closed; the next one trips the circuit
    pub max_failures: u64,

    /// Delay between tripping and the first recovery probe
    pub reset_delay: Duration,

    /// Factor applied to the reset delay after each failed probe (1 = constant)
    pub backoff_multiplier: u32,

    /// Ceiling for the grown reset delay. Raised to `reset_delay` if lower.
    pub max_reset_delay: Duration,

    /// Starting state: Closed, Open or HalfOpen
    ///
    /// A breaker started `HalfOpen` has no recovery attempt running yet, so the
    /// first caller runs it and settles the circuit.
    pub initial_state: CircuitState,

    /// Jitter factor for scheduled resets (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: delay * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_delay: Duration::from_secs(30),
            backoff_multiplier: 2,
            max_reset_delay: Duration::from_secs(300),
            initial_state: CircuitState::Closed,
            jitter_factor: 0.0,
        }
    }
}

impl Config {
    /// Reject unusable settings and normalize the rest
    pub fn validate(mut self) -> Result<Self, BuildError> {
        if self.backoff_multiplier == 0 {
            return Err(BuildError::ZeroMultiplier);
        }
        if self.initial_state == CircuitState::ResetTimeout {
            return Err(BuildError::InitialResetTimeout);
        }

        self.max_reset_delay = self.max_reset_delay.max(self.reset_delay);
        self.jitter_factor = if self.jitter_factor.is_finite() {
            self.jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(self)
    }
}

/// Circuit breaker generic over its synchronization strategy
///
/// Use [`CircuitBreaker`] to share one breaker between threads (wrap it in an
/// `Arc`), or [`LocalCircuitBreaker`] when a single thread owns it.
pub struct Breaker<S: SyncStrategy = Atomic> {
    name: String,
    config: Config,
    state: S::State,
    failures: FailureAccounting<S::Counter>,
    delay: S::Delay,
    listeners: S::Listeners,
    timer: S::Timer,
}

/// Thread-safe breaker with a background reset timer
pub type CircuitBreaker = Breaker<Atomic>;

/// Single-threaded breaker; its reset timer is checked on each call
pub type LocalCircuitBreaker = Breaker<Local>;

impl<S: SyncStrategy> Breaker<S> {
    /// Create a breaker named `circuit-<serial>`
    pub fn new(config: Config) -> Result<Self, BuildError> {
        let serial = CIRCUIT_SERIAL.fetch_add(1, Ordering::Relaxed);
        Self::with_name(format!("circuit-{}", serial), config)
    }

    pub fn with_name(name: impl Into<String>, config: Config) -> Result<Self, BuildError> {
        let name = name.into();
        let config = config.validate()?;
        let state = S::State::new(match config.initial_state {
            CircuitState::HalfOpen => CircuitState::ResetTimeout,
            other => other,
        });
        let timer = S::Timer::start(&state, &name)?;

        let breaker = Self {
            delay: S::Delay::new(config.reset_delay),
            failures: FailureAccounting::new(),
            listeners: S::Listeners::new(),
            name,
            config,
            state,
            timer,
        };

        if breaker.config.initial_state == CircuitState::Open {
            breaker.arm_reset();
        }

        Ok(breaker)
    }

    /// Run `task` under circuit protection
    ///
    /// Returns the task's value, `CircuitError::Execution` with the task's own
    /// error, or `CircuitError::Rejected` if the task was not run at all.
    ///
    /// # Panics
    ///
    /// Panics if a successful probe finds the circuit no longer `HalfOpen`,
    /// which means the single-probe guarantee was broken.
    pub fn execute<T, E, F>(&self, task: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.timer.poll(&self.state);

        loop {
            match self.state.load() {
                CircuitState::Closed => return self.run_closed(task),
                CircuitState::Open => return Err(self.reject(RejectReason::Open)),
                CircuitState::HalfOpen => {
                    return Err(self.reject(RejectReason::HalfOpenProbeInFlight));
                }
                CircuitState::ResetTimeout => {
                    if self
                        .state
                        .compare_and_set(CircuitState::ResetTimeout, CircuitState::HalfOpen)
                    {
                        tracing::info!(circuit = %self.name, "circuit half-open, probing");
                        self.listeners.for_each(|l| l.on_half_open(&self.name));
                        return self.run_probe(task);
                    }
                    // Another caller became the probe; act on whatever holds now
                    tracing::trace!(circuit = %self.name, "lost probe race");
                }
            }
        }
    }

    /// Register a listener for state transitions
    pub fn add_listener<L>(&self, listener: L)
    where
        L: CircuitListener + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Externally visible state (`ResetTimeout` reports as `Open`)
    pub fn state(&self) -> CircuitState {
        self.state.load().external()
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == CircuitState::HalfOpen
    }

    /// Consecutive failures since the last success or close
    pub fn failure_count(&self) -> u64 {
        self.failures.count()
    }

    /// Delay the next trip or failed probe will wait before probing
    pub fn current_delay(&self) -> Duration {
        self.delay.get()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn run_closed<T, E>(&self, task: impl FnOnce() -> Result<T, E>) -> Result<T, CircuitError<E>> {
        match task() {
            Ok(value) => {
                self.failures.record_success();
                Ok(value)
            }
            Err(e) => {
                let failures = self.failures.record_failure();
                if failures > self.config.max_failures {
                    if self
                        .state
                        .compare_and_set(CircuitState::Closed, CircuitState::Open)
                    {
                        tracing::warn!(circuit = %self.name, failures, "circuit tripped open");
                        self.enter_open();
                    } else {
                        tracing::trace!(circuit = %self.name, "circuit already tripped by another call");
                    }
                }
                Err(CircuitError::Execution(e))
            }
        }
    }

    fn run_probe<T, E>(&self, task: impl FnOnce() -> Result<T, E>) -> Result<T, CircuitError<E>> {
        let guard = ProbeGuard {
            breaker: self,
            settled: false,
        };
        let outcome = task();
        guard.settle();

        match outcome {
            Ok(value) => {
                self.probe_succeeded();
                Ok(value)
            }
            Err(e) => {
                self.probe_failed();
                Err(CircuitError::Execution(e))
            }
        }
    }

    fn probe_succeeded(&self) {
        self.delay.set(self.config.reset_delay);
        self.failures.record_success();

        if !self
            .state
            .compare_and_set(CircuitState::HalfOpen, CircuitState::Closed)
        {
            let violation = InvariantViolation {
                circuit: self.name.clone(),
                expected: CircuitState::HalfOpen,
                target: CircuitState::Closed,
                found: self.state.load(),
            };
            tracing::error!(circuit = %self.name, %violation, "probe outcome could not be applied");
            panic!("{}", violation);
        }

        tracing::info!(circuit = %self.name, "circuit closed");
        self.listeners.for_each(|l| l.on_closed(&self.name));
    }

    fn probe_failed(&self) {
        let delay = backoff::next_delay(
            self.delay.get(),
            self.config.backoff_multiplier,
            self.config.max_reset_delay,
        );
        self.delay.set(delay);

        if self
            .state
            .compare_and_set(CircuitState::HalfOpen, CircuitState::Open)
        {
            tracing::warn!(circuit = %self.name, ?delay, "probe failed, circuit re-opened");
            self.enter_open();
        } else {
            tracing::error!(
                circuit = %self.name,
                found = %self.state.load(),
                "failed probe found circuit outside HalfOpen"
            );
        }
    }

    /// Arm the reset timer and notify listeners; caller has just won a CAS into Open
    fn enter_open(&self) {
        self.arm_reset();
        self.listeners.for_each(|l| l.on_open(&self.name));
    }

    fn arm_reset(&self) {
        let delay = backoff::jittered(self.delay.get(), self.config.jitter_factor);
        tracing::debug!(circuit = %self.name, ?delay, "reset scheduled");
        self.timer.arm(delay);
    }

    fn reject<E>(&self, reason: RejectReason) -> CircuitError<E> {
        tracing::debug!(circuit = %self.name, %reason, "call rejected");
        CircuitError::Rejected {
            circuit: self.name.clone(),
            reason,
        }
    }

    #[cfg(test)]
    pub(crate) fn raw_state(&self) -> CircuitState {
        self.state.load()
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: CircuitState) {
        self.state.store(state);
    }
}

impl<S: SyncStrategy> fmt::Debug for Breaker<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Breaker")
            .field("name", &self.name)
            .field("state", &self.state.load())
            .field("failures", &self.failures.count())
            .field("current_delay", &self.delay.get())
            .field("listeners", &self.listeners.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Treats a probe as failed if its task unwinds, so the circuit cannot be
/// left in HalfOpen with no probe running
struct ProbeGuard<'a, S: SyncStrategy> {
    breaker: &'a Breaker<S>,
    settled: bool,
}

impl<S: SyncStrategy> ProbeGuard<'_, S> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl<S: SyncStrategy> Drop for ProbeGuard<'_, S> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(circuit = %self.breaker.name, "probe panicked, counting it as failed");
            self.breaker.probe_failed();
        }
    }
}
