//! cooldown-breaker - Circuit breaker with a single recovery probe
//!
//! This crate provides a circuit breaker built around a compare-and-set state machine:
//! - Closed → Open after more than `max_failures` consecutive failures
//! - Open → HalfOpen once the reset delay elapses and one caller claims the probe
//! - Exponential backoff of the reset delay after each failed probe, up to a ceiling
//! - A thread-safe variant (`CircuitBreaker`) and a single-threaded one (`LocalCircuitBreaker`)
//!
//! # Example
//!
//! ```rust
//! use cooldown_breaker::{Callbacks, CircuitBreaker, CircuitError, Config};
//! use std::time::Duration;
//!
//! let circuit = CircuitBreaker::with_name(
//!     "my_service",
//!     Config {
//!         max_failures: 5,
//!         reset_delay: Duration::from_secs(10),
//!         backoff_multiplier: 2,
//!         max_reset_delay: Duration::from_secs(120),
//!         ..Default::default()
//!     },
//! )
//! .expect("valid configuration");
//!
//! circuit.add_listener(Callbacks::new().on_open(|name| println!("Circuit {} opened!", name)));
//!
//! // Execute with circuit protection
//! match circuit.execute(|| Ok::<_, String>("success")) {
//!     Ok(value) => println!("got {}", value),
//!     Err(CircuitError::Rejected { reason, .. }) => println!("skipped: {}", reason),
//!     Err(CircuitError::Execution(e)) => println!("service failed: {}", e),
//! }
//!
//! assert!(circuit.is_closed());
//! ```

pub mod accounting;
pub mod backoff;
pub mod callbacks;
pub mod circuit;
pub mod errors;
pub mod scheduler;
pub mod state;
pub mod sync;

pub use accounting::FailureAccounting;
pub use callbacks::{Callbacks, CircuitListener};
pub use circuit::{Breaker, CircuitBreaker, Config, LocalCircuitBreaker};
pub use errors::{BuildError, CircuitError, InvariantViolation, RejectReason};
pub use scheduler::{PolledTimer, ResetTimer, ThreadTimer};
pub use state::CircuitState;
pub use sync::{Atomic, Local, SyncStrategy};
