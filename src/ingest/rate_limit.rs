// src/ingest/rate_limit.rs
//! Process-wide minimum spacing between requests to the same source.
//!
//! Slots are reserved under a lock and awaited outside it, so concurrent
//! topics hitting one source queue up `spacing` apart instead of racing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    spacing: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Reserve the next free slot for `key` and return when it opens.
    pub fn reserve(&self, key: &str) -> Instant {
        let now = Instant::now();
        let mut slots = self.next_slot.lock().unwrap_or_else(|p| p.into_inner());
        let slot = slots.get(key).map_or(now, |&t| t.max(now));
        slots.insert(key.to_string(), slot + self.spacing);
        slot
    }

    /// Wait until a request to `key` is allowed.
    pub async fn acquire(&self, key: &str) {
        let slot = self.reserve(key);
        if slot > Instant::now() {
            tracing::trace!(target: "fetch", source = key, "rate limited, waiting");
            tokio::time::sleep_until(slot).await;
        }
    }
}
