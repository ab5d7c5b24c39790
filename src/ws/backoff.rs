//! Reconnection backoff policy

use std::time::Duration;

/// Delay before the reconnection that follows `attempt` earlier retries.
///
/// `min(cap, base * 2^attempt)`, saturating at the cap.
pub fn reconnect_delay(base: Duration, attempt: u32, cap: Duration) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(cap, |delay| delay.min(cap))
}
