//! Exponential backoff with jitter for job retry scheduling.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// `delay(n) = min(base * 2^(n-1), max)`, jittered by up to ±10%.
/// `attempt` is 1-indexed: the delay before the first retry is `delay(1)`.
pub fn next_delay(config: BackoffConfig, attempt: u32) -> Duration {
    debug_assert!(attempt >= 1);
    let exponent = attempt.saturating_sub(1).min(32);
    let unjittered = config
        .base_delay
        .checked_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX))
        .unwrap_or(config.max_delay)
        .min(config.max_delay);

    jitter(unjittered)
}

fn jitter(delay: Duration) -> Duration {
    let millis = delay.as_millis() as f64;
    let factor = rand::thread_rng().gen_range(0.9..=1.1);
    Duration::from_millis((millis * factor).round() as u64)
}
