//! Politeness throttle
//!
//! Enforces a minimum spacing between requests to one remote resource across
//! every task sharing the instance. Callers reserve a slot under a short lock
//! and sleep outside it, so the network call itself is never serialized.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Shared handle to a throttle
pub type SharedThrottle = Arc<Throttle>;

/// Minimum-interval request pacer
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    next_allowed: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Create a throttle granting at most one acquisition per `interval`
    ///
    /// A zero interval disables throttling.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_allowed: Mutex::new(None),
        }
    }

    /// Create a shared throttle
    pub fn shared(interval: Duration) -> SharedThrottle {
        Arc::new(Self::new(interval))
    }

    /// Configured interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until at least `interval` has passed since the previously
    /// granted acquisition. Returns the time spent waiting.
    pub async fn acquire(&self) -> Duration {
        if self.interval.is_zero() {
            return Duration::ZERO;
        }

        let wait = {
            let mut next_allowed = self.next_allowed.lock().await;
            let now = Instant::now();
            let slot = match *next_allowed {
                Some(t) if t > now => t,
                _ => now,
            };
            *next_allowed = Some(slot + self.interval);
            slot - now
        };

        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Throttle wait");
            sleep(wait).await;
        }
        crate::metrics::record_throttle_wait(wait);
        wait
    }
}
