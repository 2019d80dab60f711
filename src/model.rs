// src/model.rs
//! Core entities: topics, sources, items, summaries, run logs.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::fingerprint;
use crate::ingest::parsers::{api::FieldMap, html::HtmlRules};

pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_BODY_CHARS: usize = 2000;
pub const MAX_URL_CHARS: usize = 1000;
const REDACTED: &str = "***";

/// A named subject aggregating content from one or more sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topic {
    /// Unique lowercase-underscore identifier.
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub refresh_hours: u32,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    /// Last cycle that ended in success or partial success.
    #[serde(default)]
    pub last_success_at: Option<DateTime<Utc>>,
}

impl Topic {
    pub fn refresh_interval(&self) -> Duration {
        Duration::hours(i64::from(self.refresh_hours.max(1)))
    }

    /// True once the refresh interval elapsed without a successful cycle.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.last_success_at {
            Some(at) => now - at > self.refresh_interval(),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Api,
    Rss,
    Html,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Rss => "rss",
            Self::Html => "html",
        }
    }
}

/// A configured origin of content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub name: String,
    pub display_name: String,
    pub kind: SourceKind,
    pub url: String,
    /// Priority in `[0.1, 1.0]`.
    pub weight: f64,
    pub enabled: bool,
    pub topics: Vec<String>,
    /// Field extraction for `api` sources.
    #[serde(default)]
    pub mapping: FieldMap,
    /// Selector rules for `html` sources.
    #[serde(default)]
    pub rules: HtmlRules,
    /// Extra request headers (API keys, `Accept`).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Query parameters appended to `url`.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Source {
    pub fn feeds(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }

    /// Copy safe to show over HTTP: header values are masked.
    pub fn redacted(mut self) -> Self {
        for value in self.headers.values_mut() {
            *value = REDACTED.to_string();
        }
        self
    }
}

/// A single normalized piece of content. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub topic: String,
    pub source: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    /// Identity of the item within its topic.
    pub fingerprint: String,
}

impl Item {
    /// Build an item, capping field lengths and computing its fingerprint.
    /// A missing publication time defaults to the fetch time.
    pub fn new(
        topic: &str,
        source: &str,
        title: &str,
        body: &str,
        url: &str,
        published_at: Option<DateTime<Utc>>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let title = truncate_chars(title.trim(), MAX_TITLE_CHARS);
        let body = truncate_chars(body.trim(), MAX_BODY_CHARS);
        let url = truncate_chars(url.trim(), MAX_URL_CHARS);
        let fingerprint = fingerprint(&title, &url);
        Self {
            topic: topic.to_string(),
            source: source.to_string(),
            title,
            body,
            url,
            published_at: published_at.unwrap_or(fetched_at),
            fetched_at,
            fingerprint,
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s.to_string()
    }
}

/// The current AI-generated condensation for one topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub topic: String,
    pub text: String,
    pub generated_at: DateTime<Utc>,
    /// Fingerprints of the items the text was derived from.
    pub item_ids: Vec<String>,
    pub sources_used: Vec<String>,
    /// Provider that produced the text (`openai`, `mock`, `extractive`, ...).
    pub provider: String,
    pub stale: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Success,
    Partial,
    Failure,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failure => "failure",
        }
    }

    /// Success and partial success both count as a completed refresh.
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Failure)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Audit record of one cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunLog {
    pub topic: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub source_errors: Vec<SourceFailure>,
    pub items_new: usize,
    /// Step-level failure detail (summarizer, store, cancellation).
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_defaults_published_to_fetch_time_and_caps_lengths() {
        let now = Utc::now();
        let long = "x".repeat(MAX_BODY_CHARS + 50);
        let it = Item::new("technology", "hn", " Title ", &long, "https://a.example/1", None, now);
        assert_eq!(it.published_at, now);
        assert_eq!(it.title, "Title");
        assert_eq!(it.body.chars().count(), MAX_BODY_CHARS);
        assert_eq!(it.fingerprint, fingerprint("Title", "https://a.example/1"));
    }

    #[test]
    fn topic_overdue_after_interval() {
        let now = Utc::now();
        let mut t = Topic {
            name: "weather".into(),
            display_name: "Weather".into(),
            description: String::new(),
            enabled: true,
            refresh_hours: 2,
            last_run_at: None,
            last_success_at: None,
        };
        assert!(t.is_overdue(now));
        t.last_success_at = Some(now - Duration::minutes(30));
        assert!(!t.is_overdue(now));
        t.last_success_at = Some(now - Duration::hours(3));
        assert!(t.is_overdue(now));
    }
}
