//! Basic circuit breaker usage example
//!
//! Run with `RUST_LOG=debug` to see the breaker's own tracing output.

use cooldown_breaker::{Callbacks, CircuitBreaker, Config};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Circuit Breaker Basic Example ===\n");

    let circuit = CircuitBreaker::with_name(
        "payment_api",
        Config {
            max_failures: 2,
            reset_delay: Duration::from_millis(200),
            backoff_multiplier: 2,
            max_reset_delay: Duration::from_secs(2),
            ..Default::default()
        },
    )
    .expect("valid configuration");

    circuit.add_listener(
        Callbacks::new()
            .on_open(|name| println!("🔴 Circuit '{}' opened!", name))
            .on_half_open(|name| println!("🟡 Circuit '{}' half-open, probing...", name))
            .on_closed(|name| println!("🟢 Circuit '{}' closed!", name)),
    );

    println!("Initial state: {}\n", circuit.state());

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match circuit.execute(move || Ok::<_, String>(format!("Payment {}", i))) {
            Ok(result) => println!("✓ {}", result),
            Err(e) => println!("✗ Error: {}", e),
        }
    }
    println!("State: {}\n", circuit.state());

    println!("--- Triggering failures ---");
    for i in 1..=3 {
        match circuit.execute(move || Err::<String, _>(format!("Payment failed {}", i))) {
            Ok(_) => println!("✓ Success"),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("State: {} (circuit opened)\n", circuit.state());

    println!("--- Attempting call while open ---");
    match circuit.execute(|| Ok::<_, String>("Should be rejected")) {
        Ok(_) => println!("✓ Success"),
        Err(e) => println!("✗ {}", e),
    }
    println!();

    println!("--- Failed probe backs off ---");
    thread::sleep(circuit.current_delay() + Duration::from_millis(50));
    let _ = circuit.execute(|| Err::<(), _>("still down"));
    println!("Next reset delay: {:?}\n", circuit.current_delay());

    println!("--- Successful probe closes the circuit ---");
    thread::sleep(circuit.current_delay() + Duration::from_millis(50));
    match circuit.execute(|| Ok::<_, String>("Payment successful")) {
        Ok(result) => println!("✓ {}", result),
        Err(e) => println!("✗ {}", e),
    }
    println!(
        "State: {}, reset delay back to {:?}",
        circuit.state(),
        circuit.current_delay()
    );
}
