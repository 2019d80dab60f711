// src/ingest/mod.rs
pub mod fetcher;
pub mod parsers;
pub mod rate_limit;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};

use crate::error::SourceError;
use crate::ingest::fetcher::Fetcher;
use crate::ingest::parsers::{ParseContext, Parser};
use crate::model::{Item, Source};

/// Normalize text: decode entities, strip tags, unify quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) Strip HTML tags. Entities are decoded afterwards, so escaped
    // markup (`&lt;b&gt;`) survives as literal text.
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[a-z!][^>]*>").unwrap());
    let stripped = re_tags.replace_all(s, " ");

    // 2) HTML entity decode, the only place text is decoded
    let mut out = html_escape::decode_html_entities(&stripped).to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Everything one source contributed to a cycle.
#[derive(Debug, Clone)]
pub struct SourceHarvest {
    pub source: String,
    pub weight: f64,
    pub items: Vec<Item>,
    pub errors: Vec<SourceError>,
}

impl SourceHarvest {
    /// A source is healthy when it yielded items or finished without errors.
    /// Zero items and no errors means "nothing new", which is fine.
    pub fn is_healthy(&self) -> bool {
        !self.items.is_empty() || self.errors.is_empty()
    }
}

/// Fetch one source and run the parser selected by its type.
/// Failures are captured in the harvest, never propagated.
pub async fn harvest_source(
    fetcher: &dyn Fetcher,
    source: &Source,
    topic: &str,
    fetched_at: DateTime<Utc>,
) -> SourceHarvest {
    let mut harvest = SourceHarvest {
        source: source.name.clone(),
        weight: source.weight,
        items: Vec::new(),
        errors: Vec::new(),
    };

    let raw = match fetcher.fetch(source).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(target: "fetch", source = %source.name, error = %e, "fetch failed");
            counter!("digest_fetch_errors_total").increment(1);
            harvest.errors.push(e.into());
            return harvest;
        }
    };

    let t0 = std::time::Instant::now();
    let ctx = ParseContext {
        source,
        topic,
        fetched_at,
    };
    match Parser::for_kind(source.kind).parse(&raw, &ctx) {
        Ok(outcome) => {
            for e in &outcome.errors {
                tracing::debug!(target: "fetch", source = %source.name, error = %e, "entry skipped");
            }
            counter!("digest_parse_errors_total").increment(outcome.errors.len() as u64);
            harvest.items = outcome.items;
            harvest
                .errors
                .extend(outcome.errors.into_iter().map(SourceError::from));
        }
        Err(e) => {
            tracing::warn!(target: "fetch", source = %source.name, error = %e, "parse failed");
            counter!("digest_parse_errors_total").increment(1);
            harvest.errors.push(e.into());
        }
    }
    histogram!("digest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    harvest
}
