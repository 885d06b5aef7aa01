//! Reset scheduling for open circuits
//!
//! Each breaker owns one timer holding at most one pending action: the
//! conditional transition `Open -> ResetTimeout`. Arming again replaces the
//! pending deadline. A firing that finds the circuit in any state other than
//! `Open` does nothing.

use crate::state::CircuitState;
use crate::sync::{LocalState, SharedState, StateCell, cas_state};
use std::cell::Cell;
use std::io;
use std::sync::Weak;
use std::sync::atomic::AtomicU8;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

/// Timer that moves an open circuit into `ResetTimeout` after a delay
pub trait ResetTimer<C>: Sized {
    /// Create the timer for a circuit whose state lives in `state`
    fn start(state: &C, circuit: &str) -> io::Result<Self>;

    /// Schedule the reset attempt `delay` from now, replacing any pending one
    fn arm(&self, delay: Duration);

    /// Give a polled timer the chance to fire. Called before every dispatch.
    fn poll(&self, _state: &C) {}
}

/// Background timer thread fed by arm commands over a channel
///
/// The thread only holds a weak reference to the state cell and exits once the
/// owning breaker is dropped and the channel disconnects.
#[derive(Debug)]
pub struct ThreadTimer {
    commands: Sender<Duration>,
    circuit: String,
}

impl ResetTimer<SharedState> for ThreadTimer {
    fn start(state: &SharedState, circuit: &str) -> io::Result<Self> {
        let (commands, receiver) = mpsc::channel();
        let cell = state.downgrade();
        let name = circuit.to_string();

        thread::Builder::new()
            .name(format!("reset-timer-{}", circuit))
            .spawn(move || run_timer(&name, cell, receiver))?;

        Ok(Self {
            commands,
            circuit: circuit.to_string(),
        })
    }

    fn arm(&self, delay: Duration) {
        if self.commands.send(delay).is_err() {
            tracing::error!(circuit = %self.circuit, "reset timer thread is gone; circuit will stay open");
        }
    }
}

fn run_timer(circuit: &str, cell: Weak<AtomicU8>, commands: Receiver<Duration>) {
    let mut deadline: Option<Instant> = None;

    loop {
        let received = match deadline {
            Some(at) => commands.recv_timeout(at.saturating_duration_since(Instant::now())),
            None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(delay) => {
                // Delays too large to represent never fire
                deadline = Instant::now().checked_add(delay);
                tracing::trace!(circuit = %circuit, ?delay, "reset timer armed");
            }
            Err(RecvTimeoutError::Timeout) => {
                deadline = None;
                let Some(state) = cell.upgrade() else { break };
                fire(circuit, || {
                    cas_state(&state, CircuitState::Open, CircuitState::ResetTimeout)
                });
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::trace!(circuit = %circuit, "reset timer stopped");
}

fn fire(circuit: &str, transition: impl FnOnce() -> bool) {
    if transition() {
        tracing::debug!(circuit = %circuit, "reset timeout elapsed; next call will probe");
    } else {
        tracing::debug!(circuit = %circuit, "stale reset timer ignored");
    }
}

/// Deadline checked lazily by the breaker on each call
///
/// Used by single-threaded breakers, where no second thread may touch the state.
#[derive(Debug)]
pub struct PolledTimer {
    deadline: Cell<Option<Instant>>,
    circuit: String,
}

impl ResetTimer<LocalState> for PolledTimer {
    fn start(_state: &LocalState, circuit: &str) -> io::Result<Self> {
        Ok(Self {
            deadline: Cell::new(None),
            circuit: circuit.to_string(),
        })
    }

    fn arm(&self, delay: Duration) {
        self.deadline.set(Instant::now().checked_add(delay));
    }

    fn poll(&self, state: &LocalState) {
        if let Some(at) = self.deadline.get()
            && Instant::now() >= at
        {
            self.deadline.set(None);
            fire(&self.circuit, || {
                state.compare_and_set(CircuitState::Open, CircuitState::ResetTimeout)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let give_up = Instant::now() + Duration::from_secs(2);
        while Instant::now() < give_up {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[test]
    fn test_thread_timer_moves_open_to_reset_timeout() {
        let state = SharedState::new(CircuitState::Open);
        let timer = ThreadTimer::start(&state, "test").expect("timer should start");

        timer.arm(Duration::from_millis(10));

        assert!(wait_for(|| state.load() == CircuitState::ResetTimeout));
    }

    #[test]
    fn test_thread_timer_stale_fire_is_noop() {
        let state = SharedState::new(CircuitState::Closed);
        let timer = ThreadTimer::start(&state, "test").expect("timer should start");

        timer.arm(Duration::ZERO);
        thread::sleep(Duration::from_millis(50));

        assert_eq!(state.load(), CircuitState::Closed);
    }

    #[test]
    fn test_thread_timer_rearm_replaces_deadline() {
        let state = SharedState::new(CircuitState::Open);
        let timer = ThreadTimer::start(&state, "test").expect("timer should start");

        timer.arm(Duration::from_secs(60));
        timer.arm(Duration::from_millis(5));

        assert!(wait_for(|| state.load() == CircuitState::ResetTimeout));
    }

    #[test]
    fn test_thread_timer_longer_rearm_postpones_fire() {
        let state = SharedState::new(CircuitState::Open);
        let timer = ThreadTimer::start(&state, "test").expect("timer should start");

        timer.arm(Duration::from_millis(20));
        timer.arm(Duration::from_secs(60));
        thread::sleep(Duration::from_millis(100));

        assert_eq!(state.load(), CircuitState::Open);
    }

    #[test]
    fn test_thread_timer_ignores_unrepresentable_delay() {
        let state = SharedState::new(CircuitState::Open);
        let timer = ThreadTimer::start(&state, "test").expect("timer should start");

        timer.arm(Duration::MAX);
        thread::sleep(Duration::from_millis(20));

        assert_eq!(state.load(), CircuitState::Open);
    }

    #[test]
    fn test_thread_timer_exits_when_dropped() {
        let state = SharedState::new(CircuitState::Open);
        let timer = ThreadTimer::start(&state, "test").expect("timer should start");
        assert_eq!(state.timer_refs(), 1);

        drop(timer);

        assert!(wait_for(|| state.timer_refs() == 0));
    }

    #[test]
    fn test_polled_timer_fires_only_after_deadline() {
        let state = LocalState::new(CircuitState::Open);
        let timer = PolledTimer::start(&state, "test").expect("timer should start");

        timer.arm(Duration::from_secs(60));
        timer.poll(&state);
        assert_eq!(state.load(), CircuitState::Open);

        timer.arm(Duration::ZERO);
        timer.poll(&state);
        assert_eq!(state.load(), CircuitState::ResetTimeout);
    }

    #[test]
    fn test_polled_timer_stale_fire_is_noop() {
        let state = LocalState::new(CircuitState::HalfOpen);
        let timer = PolledTimer::start(&state, "test").expect("timer should start");

        timer.arm(Duration::ZERO);
        timer.poll(&state);

        assert_eq!(state.load(), CircuitState::HalfOpen);
        // The pending action was consumed
        state.store(CircuitState::Open);
        timer.poll(&state);
        assert_eq!(state.load(), CircuitState::Open);
    }
}
