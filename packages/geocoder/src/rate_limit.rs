//! Minimum-interval rate limiter shared by every caller of one provider.
//!
//! Public geocoders enforce request ceilings (Nominatim allows one request
//! per second). A [`RateLimiter`] hands out evenly spaced slots: each
//! [`RateLimiter::acquire`] reserves the next free slot under a short lock
//! and then sleeps outside the lock until that slot arrives, so concurrent
//! workers queue up instead of bursting.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum delay between consecutive acquisitions.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter that spaces acquisitions at least `min_interval`
    /// apart. A zero interval never waits.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Creates a limiter from a millisecond interval.
    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// The configured minimum interval.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the caller may issue its next request.
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let wait = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.min_interval);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            log::trace!("rate limiter: waiting {wait:?}");
            tokio::time::sleep(wait).await;
        }
    }
}
