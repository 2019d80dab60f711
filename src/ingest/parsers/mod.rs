// src/ingest/parsers/mod.rs
//! One normalizer per source type, dispatched by `SourceKind`.
//!
//! Contract shared by all variants: bad entries are skipped and reported in
//! `ParseOutcome::errors`; only unusable payloads (empty, wrong content type,
//! unreadable root) fail the whole call.

pub mod api;
pub mod html;
pub mod rss;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::error::ParseError;
use crate::ingest::fetcher::FetchResponse;
use crate::model::{Item, Source, SourceKind};

pub struct ParseContext<'a> {
    pub source: &'a Source,
    pub topic: &'a str,
    pub fetched_at: DateTime<Utc>,
}

impl ParseContext<'_> {
    pub(crate) fn item(
        &self,
        title: &str,
        body: &str,
        url: &str,
        published_at: Option<DateTime<Utc>>,
    ) -> Item {
        Item::new(
            self.topic,
            &self.source.name,
            title,
            body,
            url,
            published_at,
            self.fetched_at,
        )
    }
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub items: Vec<Item>,
    /// Entries that were skipped, or the point where reading stopped.
    pub errors: Vec<ParseError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parser {
    Api,
    Rss,
    Html,
}

impl Parser {
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Api => Self::Api,
            SourceKind::Rss => Self::Rss,
            SourceKind::Html => Self::Html,
        }
    }

    pub fn parse(
        &self,
        raw: &FetchResponse,
        ctx: &ParseContext<'_>,
    ) -> Result<ParseOutcome, ParseError> {
        let text = raw.text();
        if text.trim().is_empty() {
            return Err(ParseError::Empty);
        }
        match self {
            Self::Api => api::parse(&text, ctx),
            Self::Rss => rss::parse(&text, ctx),
            Self::Html => html::parse(&text, raw.content_type.as_deref(), ctx),
        }
    }
}

/// Parse the timestamp formats seen in feeds and APIs: RFC 2822, RFC 3339,
/// `YYYY-MM-DD HH:MM:SS` (assumed UTC), and unix seconds or milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(dt) = OffsetDateTime::parse(s, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    s.parse::<i64>().ok().and_then(timestamp_from_number)
}

/// Unix seconds, or milliseconds when the value is too large to be seconds.
pub fn timestamp_from_number(n: i64) -> Option<DateTime<Utc>> {
    if n <= 0 {
        return None;
    }
    if n > 100_000_000_000 {
        Utc.timestamp_millis_opt(n).single()
    } else {
        Utc.timestamp_opt(n, 0).single()
    }
}
