//! Reconnect backoff policy.

use std::time::Duration;

/// Base delay for the first reconnect attempt.
pub const BASE_DELAY: Duration = Duration::from_millis(100);

/// Calculate the delay before a reconnect attempt.
///
/// Exponential: `BASE_DELAY * 2^(attempt - 1)`, capped at `max`.
/// Attempt numbers are 1-based; attempt 0 retries immediately.
pub fn retry_delay(attempt: u32, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    // Clamp the shift so the multiplier cannot overflow.
    let shift = attempt.saturating_sub(1).min(30);
    let millis = (BASE_DELAY.as_millis() as u64).saturating_mul(1 << shift);

    Duration::from_millis(millis).min(max)
}
