//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Un-jittered delay before retry `attempt` (1-based): `min_backoff * 2^(attempt-1)`.
pub fn base_backoff(attempt: u32, min_backoff: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
    min_backoff.saturating_mul(exponential_base)
}

/// Inclusive range the jittered delay of `attempt` falls into.
pub fn backoff_bounds(attempt: u32, min_backoff: Duration, jitter: f64) -> (Duration, Duration) {
    let base = base_backoff(attempt, min_backoff);
    (scale(base, 1.0 - jitter), scale(base, 1.0 + jitter))
}

/// Calculate exponential backoff delay with jitter.
///
/// The delay is drawn uniformly from `base * [1 - jitter, 1 + jitter]`,
/// independently on every call.
pub fn calculate_backoff(attempt: u32, min_backoff: Duration, jitter: f64) -> Duration {
    let base = base_backoff(attempt, min_backoff);
    if jitter <= 0.0 || base.is_zero() {
        return base;
    }

    let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
    scale(base, factor)
}

fn scale(base: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(base.as_secs_f64() * factor.max(0.0)).unwrap_or(Duration::MAX)
}
