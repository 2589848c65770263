//! Retry delays and interval jitter

use std::time::Duration;

use rand::Rng;

use crate::config::Settings;

/// Attempts and backoff for one watch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total fetch attempts per cycle, including the first
    pub max_attempts: u32,
    /// Wait before the first retry; doubles for each further retry
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.retry_max_attempts, settings.retry_initial_delay)
    }

    /// Wait after failed attempt number `attempt` (1-based)
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use sheets_reader::watcher::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new(4, Duration::from_secs(5));
    /// assert_eq!(policy.delay_after(1), Duration::from_secs(5));
    /// assert_eq!(policy.delay_after(2), Duration::from_secs(10));
    /// assert_eq!(policy.delay_after(3), Duration::from_secs(20));
    /// ```
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay.saturating_mul(1u32 << exponent)
    }

    /// Whether another attempt is allowed after `attempt` failed
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Spread `base` uniformly by up to `percent` in either direction
pub fn jittered<R: Rng>(base: Duration, percent: u8, rng: &mut R) -> Duration {
    if percent == 0 {
        return base;
    }
    let spread = f64::from(percent.min(100)) / 100.0;
    let factor = 1.0 + rng.random_range(-spread..=spread);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}
