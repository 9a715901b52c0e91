//! Capped exponential backoff.

use std::time::Duration;

/// Delay before retry number `attempt` (1-based): `initial * multiplier^(attempt-1)`,
/// never more than `max`.
pub fn capped_exponential(
    initial: Duration,
    multiplier: f64,
    max: Duration,
    attempt: u32,
) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63) as i32;
    let factor = multiplier.max(1.0).powi(exponent);
    let delay = initial.as_secs_f64() * factor;

    if !delay.is_finite() || delay >= max.as_secs_f64() {
        max
    } else {
        Duration::from_secs_f64(delay)
    }
}
