//! Per-member retry policy with exponential backoff.

use std::time::Duration;

/// `delay_n = min(backoff_initial * backoff_multiplier^n, backoff_max)` before retry `n`
/// (0-based), optionally stretched by up to 25% random jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    pub backoff_initial: Duration,
    pub backoff_multiplier: f64,
    pub backoff_max: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_initial: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            backoff_max: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_backoff(mut self, initial: Duration, multiplier: f64) -> Self {
        self.backoff_initial = initial;
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.backoff_max = max;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(0.0).powi(retry as i32);
        let secs = (self.backoff_initial.as_secs_f64() * factor).min(self.backoff_max.as_secs_f64());
        let secs = if self.jitter {
            secs * (1.0 + 0.25 * rand::random::<f64>())
        } else {
            secs
        };
        Duration::try_from_secs_f64(secs).unwrap_or(self.backoff_max)
    }
}
