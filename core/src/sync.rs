//! Synchronization strategies for the breaker's shared fields
//!
//! The state machine in [`crate::circuit`] is written once against the cell
//! traits below. [`Atomic`] backs them with atomics for use across threads;
//! [`Local`] backs them with `Cell`/`RefCell` for a single thread or event
//! loop. `Breaker<Local>` is `!Sync`, so the compiler enforces exclusive access.

use crate::callbacks::CircuitListener;
use crate::scheduler::{PolledTimer, ResetTimer, ThreadTimer};
use crate::state::CircuitState;
use arc_swap::ArcSwap;
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Holder for the current [`CircuitState`]
///
/// Transitions only happen through `compare_and_set`; callers must check the
/// outcome before assuming the transition took place.
pub trait StateCell {
    fn new(state: CircuitState) -> Self;

    fn load(&self) -> CircuitState;

    /// Move from `current` to `new`. Returns `false` if the cell held anything else.
    fn compare_and_set(&self, current: CircuitState, new: CircuitState) -> bool;

    /// Unconditional write, reserved for test harnesses
    fn store(&self, state: CircuitState);
}

/// Non-negative counter used for failure accounting
pub trait CounterCell {
    fn new() -> Self;
    fn get(&self) -> u64;
    fn set(&self, value: u64);
    /// Increment and return the new value
    fn increment(&self) -> u64;
}

/// Holder for the current reset delay
pub trait DelayCell {
    fn new(delay: Duration) -> Self;
    fn get(&self) -> Duration;
    fn set(&self, delay: Duration);
}

/// Ordered, append-only collection of listeners
pub trait ListenerSet {
    fn new() -> Self;
    fn push(&self, listener: Arc<dyn CircuitListener>);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit listeners in registration order
    fn for_each(&self, f: impl FnMut(&dyn CircuitListener));
}

/// Bundle of cell implementations a [`crate::Breaker`] is built from
pub trait SyncStrategy: 'static {
    type State: StateCell;
    type Counter: CounterCell;
    type Delay: DelayCell;
    type Listeners: ListenerSet;
    type Timer: ResetTimer<Self::State>;
}

/// Thread-safe strategy: atomics, an `ArcSwap` listener list and a timer thread
#[derive(Debug, Clone, Copy, Default)]
pub struct Atomic;

impl SyncStrategy for Atomic {
    type State = SharedState;
    type Counter = AtomicCounter;
    type Delay = AtomicDelay;
    type Listeners = SwapListeners;
    type Timer = ThreadTimer;
}

/// Single-threaded strategy: plain cells and a polled timer
///
/// Not safe for concurrent access; the resulting breaker is `!Sync`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Local;

impl SyncStrategy for Local {
    type State = LocalState;
    type Counter = LocalCounter;
    type Delay = LocalDelay;
    type Listeners = LocalListeners;
    type Timer = PolledTimer;
}

// Atomic cells

/// State cell shared between a breaker and its timer thread
#[derive(Debug, Clone)]
pub struct SharedState {
    cell: Arc<AtomicU8>,
}

impl SharedState {
    pub(crate) fn downgrade(&self) -> Weak<AtomicU8> {
        Arc::downgrade(&self.cell)
    }

    /// Number of timer threads still attached to this cell
    #[cfg(test)]
    pub(crate) fn timer_refs(&self) -> usize {
        Arc::weak_count(&self.cell)
    }
}

/// CAS on a packed state, used by both the breaker and the timer thread
pub(crate) fn cas_state(cell: &AtomicU8, current: CircuitState, new: CircuitState) -> bool {
    cell.compare_exchange(
        current.as_u8(),
        new.as_u8(),
        Ordering::AcqRel,
        Ordering::Acquire,
    )
    .is_ok()
}

impl StateCell for SharedState {
    fn new(state: CircuitState) -> Self {
        Self {
            cell: Arc::new(AtomicU8::new(state.as_u8())),
        }
    }

    fn load(&self) -> CircuitState {
        CircuitState::from_u8(self.cell.load(Ordering::Acquire))
    }

    fn compare_and_set(&self, current: CircuitState, new: CircuitState) -> bool {
        cas_state(&self.cell, current, new)
    }

    fn store(&self, state: CircuitState) {
        self.cell.store(state.as_u8(), Ordering::Release);
    }
}

#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl CounterCell for AtomicCounter {
    fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, value: u64) {
        self.0.store(value, Ordering::Release);
    }

    fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }
}

/// Delay stored as whole nanoseconds
#[derive(Debug)]
pub struct AtomicDelay(AtomicU64);

fn duration_to_nanos(delay: Duration) -> u64 {
    u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX)
}

impl DelayCell for AtomicDelay {
    fn new(delay: Duration) -> Self {
        Self(AtomicU64::new(duration_to_nanos(delay)))
    }

    fn get(&self) -> Duration {
        Duration::from_nanos(self.0.load(Ordering::Acquire))
    }

    fn set(&self, delay: Duration) {
        self.0.store(duration_to_nanos(delay), Ordering::Release);
    }
}

/// Copy-on-write listener list; readers iterate a snapshot while writers append
pub struct SwapListeners {
    inner: ArcSwap<Vec<Arc<dyn CircuitListener>>>,
}

impl ListenerSet for SwapListeners {
    fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(Vec::new()),
        }
    }

    fn push(&self, listener: Arc<dyn CircuitListener>) {
        self.inner.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&listener));
            next
        });
    }

    fn len(&self) -> usize {
        self.inner.load().len()
    }

    fn for_each(&self, mut f: impl FnMut(&dyn CircuitListener)) {
        let snapshot = self.inner.load_full();
        for listener in snapshot.iter() {
            f(listener.as_ref());
        }
    }
}

impl std::fmt::Debug for SwapListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapListeners")
            .field("len", &self.len())
            .finish()
    }
}

// Local cells

#[derive(Debug)]
pub struct LocalState(Cell<CircuitState>);

impl StateCell for LocalState {
    fn new(state: CircuitState) -> Self {
        Self(Cell::new(state))
    }

    fn load(&self) -> CircuitState {
        self.0.get()
    }

    fn compare_and_set(&self, current: CircuitState, new: CircuitState) -> bool {
        if self.0.get() == current {
            self.0.set(new);
            true
        } else {
            false
        }
    }

    fn store(&self, state: CircuitState) {
        self.0.set(state);
    }
}

#[derive(Debug, Default)]
pub struct LocalCounter(Cell<u64>);

impl CounterCell for LocalCounter {
    fn new() -> Self {
        Self(Cell::new(0))
    }

    fn get(&self) -> u64 {
        self.0.get()
    }

    fn set(&self, value: u64) {
        self.0.set(value);
    }

    fn increment(&self) -> u64 {
        let next = self.0.get().saturating_add(1);
        self.0.set(next);
        next
    }
}

#[derive(Debug)]
pub struct LocalDelay(Cell<Duration>);

impl DelayCell for LocalDelay {
    fn new(delay: Duration) -> Self {
        Self(Cell::new(delay))
    }

    fn get(&self) -> Duration {
        self.0.get()
    }

    fn set(&self, delay: Duration) {
        self.0.set(delay);
    }
}

pub struct LocalListeners(RefCell<Vec<Arc<dyn CircuitListener>>>);

impl ListenerSet for LocalListeners {
    fn new() -> Self {
        Self(RefCell::new(Vec::new()))
    }

    fn push(&self, listener: Arc<dyn CircuitListener>) {
        self.0.borrow_mut().push(listener);
    }

    fn len(&self) -> usize {
        self.0.borrow().len()
    }

    fn for_each(&self, mut f: impl FnMut(&dyn CircuitListener)) {
        // Snapshot so no borrow is held while listener code runs
        let snapshot = self.0.borrow().clone();
        for listener in &snapshot {
            f(listener.as_ref());
        }
    }
}

impl std::fmt::Debug for LocalListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalListeners")
            .field("len", &self.len())
            .finish()
    }
}
