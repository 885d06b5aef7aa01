//! Reset delay growth between failed probes

use std::time::Duration;

/// Delay to use after a failed probe: `min(max, current * multiplier)`
///
/// A multiplier of 1 keeps the delay constant. Overflow saturates at `max`.
pub fn next_delay(current: Duration, multiplier: u32, max: Duration) -> Duration {
    current
        .checked_mul(multiplier)
        .map_or(max, |grown| grown.min(max))
}

/// Fixed base handed to chrono-machines; its result is read back as a ratio.
const JITTER_SCALE: u64 = 1_000_000;

/// Spread a scheduled delay by `jitter_factor` (0.0 = exact, 1.0 = full jitter)
///
/// Uses chrono-machines formula: delay * (1 - jitter + rand * jitter), so the
/// result never exceeds `delay`. The ratio is applied to the exact `Duration`,
/// so sub-millisecond precision is kept.
pub fn jittered(delay: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 || delay.is_zero() {
        return delay;
    }

    let policy = chrono_machines::Policy {
        max_attempts: 1,
        base_delay_ms: JITTER_SCALE,
        multiplier: 1.0,
        max_delay_ms: JITTER_SCALE,
    };
    let scaled = policy.calculate_delay(1, jitter_factor.min(1.0));
    let ratio = (scaled as f64 / JITTER_SCALE as f64).clamp(0.0, 1.0);
    delay.mul_f64(ratio)
}
