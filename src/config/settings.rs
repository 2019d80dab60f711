// src/config/settings.rs
//! Global tunables with defaults, environment overrides and validation.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Ten years of retained content.
pub const MAX_RETENTION_DAYS: u64 = 3_650;
/// One year, the longest sweep or poll period accepted.
pub const MAX_INTERVAL_HOURS: u64 = 8_760;

/// Process-wide knobs. Every field can be overridden by `DIGEST_<UPPER_NAME>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub max_items_per_source: usize,
    pub max_items_per_topic: usize,
    pub content_retention_days: u32,
    pub fetch_timeout_secs: u64,
    pub summarize_timeout_secs: u64,
    pub rate_limit_spacing_ms: u64,
    pub max_response_bytes: usize,
    pub recency_half_life_hours: f64,
    pub summary_top_k: usize,
    pub worker_pool: usize,
    pub poll_interval_secs: u64,
    pub retention_interval_hours: u64,
    pub summarize_max_attempts: u32,
    pub summarize_backoff_ms: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_items_per_source: 10,
            max_items_per_topic: 20,
            content_retention_days: 7,
            fetch_timeout_secs: 15,
            summarize_timeout_secs: 90,
            rate_limit_spacing_ms: 1_000,
            max_response_bytes: 2 * 1024 * 1024,
            recency_half_life_hours: 12.0,
            summary_top_k: 15,
            worker_pool: 4,
            poll_interval_secs: 60,
            retention_interval_hours: 24,
            summarize_max_attempts: 3,
            summarize_backoff_ms: 500,
        }
    }
}

/// Overwrite `slot` when `lookup(key)` yields a parsable value.
fn override_from<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable override"),
        }
    }
}

impl Tunables {
    /// Apply `DIGEST_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|k| std::env::var(k).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_from(&lookup, "DIGEST_MAX_ITEMS_PER_SOURCE", &mut self.max_items_per_source);
        override_from(&lookup, "DIGEST_MAX_ITEMS_PER_TOPIC", &mut self.max_items_per_topic);
        override_from(&lookup, "DIGEST_CONTENT_RETENTION_DAYS", &mut self.content_retention_days);
        override_from(&lookup, "DIGEST_FETCH_TIMEOUT_SECS", &mut self.fetch_timeout_secs);
        override_from(&lookup, "DIGEST_SUMMARIZE_TIMEOUT_SECS", &mut self.summarize_timeout_secs);
        override_from(&lookup, "DIGEST_RATE_LIMIT_SPACING_MS", &mut self.rate_limit_spacing_ms);
        override_from(&lookup, "DIGEST_MAX_RESPONSE_BYTES", &mut self.max_response_bytes);
        override_from(&lookup, "DIGEST_RECENCY_HALF_LIFE_HOURS", &mut self.recency_half_life_hours);
        override_from(&lookup, "DIGEST_SUMMARY_TOP_K", &mut self.summary_top_k);
        override_from(&lookup, "DIGEST_WORKER_POOL", &mut self.worker_pool);
        override_from(&lookup, "DIGEST_POLL_INTERVAL_SECS", &mut self.poll_interval_secs);
        override_from(&lookup, "DIGEST_RETENTION_INTERVAL_HOURS", &mut self.retention_interval_hours);
        override_from(&lookup, "DIGEST_SUMMARIZE_MAX_ATTEMPTS", &mut self.summarize_max_attempts);
        override_from(&lookup, "DIGEST_SUMMARIZE_BACKOFF_MS", &mut self.summarize_backoff_ms);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&str, u64); 11] = [
            ("max_items_per_source", self.max_items_per_source as u64),
            ("max_items_per_topic", self.max_items_per_topic as u64),
            ("content_retention_days", u64::from(self.content_retention_days)),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("summarize_timeout_secs", self.summarize_timeout_secs),
            ("max_response_bytes", self.max_response_bytes as u64),
            ("summary_top_k", self.summary_top_k as u64),
            ("worker_pool", self.worker_pool as u64),
            ("poll_interval_secs", self.poll_interval_secs),
            ("retention_interval_hours", self.retention_interval_hours),
            ("summarize_max_attempts", u64::from(self.summarize_max_attempts)),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::tunable(key, "must be greater than zero"));
            }
        }
        // Ceilings keep the derived chrono and std durations in range.
        let bounded: [(&str, u64, u64); 3] = [
            ("content_retention_days", u64::from(self.content_retention_days), MAX_RETENTION_DAYS),
            ("retention_interval_hours", self.retention_interval_hours, MAX_INTERVAL_HOURS),
            ("poll_interval_secs", self.poll_interval_secs, MAX_INTERVAL_HOURS * 3_600),
        ];
        for (key, value, max) in bounded {
            if value > max {
                return Err(ConfigError::tunable(key, format!("must be at most {max}")));
            }
        }
        if !(self.recency_half_life_hours.is_finite()
            && self.recency_half_life_hours > 0.0
            && self.recency_half_life_hours <= MAX_INTERVAL_HOURS as f64)
        {
            return Err(ConfigError::tunable(
                "recency_half_life_hours",
                format!("must be a positive number up to {MAX_INTERVAL_HOURS}"),
            ));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn summarize_timeout(&self) -> Duration {
        Duration::from_secs(self.summarize_timeout_secs)
    }

    pub fn rate_limit_spacing(&self) -> Duration {
        Duration::from_millis(self.rate_limit_spacing_ms)
    }

    pub fn summarize_backoff(&self) -> Duration {
        Duration::from_millis(self.summarize_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention_interval_hours * 3_600)
    }

    pub fn recency_half_life(&self) -> chrono::Duration {
        chrono::Duration::milliseconds((self.recency_half_life_hours * 3_600_000.0) as i64)
    }

    pub fn retention_horizon(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.content_retention_days))
    }
}
