//! Start-spacing rate limiter for group members.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Spaces member starts at least `1 / per_second` apart.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// `None` when `per_second` is not a positive finite number, or so small that the
    /// interval does not fit a `Duration`.
    pub(crate) fn new(per_second: f64) -> Option<Self> {
        if !(per_second.is_finite() && per_second > 0.0) {
            return None;
        }
        let interval = Duration::try_from_secs_f64(1.0 / per_second).ok()?;
        Some(Self {
            interval,
            next_slot: Mutex::new(None),
        })
    }

    /// Waits for this caller's start slot.
    pub(crate) async fn acquire(&self) {
        let slot = {
            let mut next = match self.next_slot.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot.checked_add(self.interval).unwrap_or(slot));
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}
