// tests/common/mod.rs
// Shared builders for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use topic_digest::config::settings::Tunables;
use topic_digest::ingest::fetcher::{Fetcher, FetchResponse, StaticFetcher};
use topic_digest::model::{Item, RunLog, RunOutcome, Source, SourceKind, Topic};
use topic_digest::pipeline::Pipeline;
use topic_digest::store::memory::MemoryStore;
use topic_digest::store::{CycleCommit, Store, SummaryUpdate};
use topic_digest::summarize::provider::DynProvider;
use topic_digest::summarize::SummarizerClient;

pub fn topic(name: &str, refresh_hours: u32) -> Topic {
    Topic {
        name: name.to_string(),
        display_name: name.replace('_', " "),
        description: String::new(),
        enabled: true,
        refresh_hours,
        last_run_at: None,
        last_success_at: None,
    }
}

pub fn source(name: &str, kind: SourceKind, weight: f64, topics: &[&str]) -> Source {
    Source {
        name: name.to_string(),
        display_name: name.to_string(),
        kind,
        url: format!("https://{}.example.com/", name.replace('_', "-")),
        weight,
        enabled: true,
        topics: topics.iter().map(|t| t.to_string()).collect(),
        mapping: Default::default(),
        rules: Default::default(),
        headers: Default::default(),
        params: Default::default(),
    }
}

/// Fast retries, small caps; everything else default.
pub fn tunables() -> Tunables {
    Tunables {
        summarize_backoff_ms: 10,
        rate_limit_spacing_ms: 0,
        ..Tunables::default()
    }
}

/// A receiver that never signals cancellation.
pub fn no_cancel() -> watch::Receiver<bool> {
    watch::channel(false).1
}

/// RSS 2.0 document; `(title, link, hours_ago)` per entry.
pub fn rss_feed(entries: &[(&str, &str, i64)]) -> String {
    let now = Utc::now();
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Feed</title>"#,
    );
    for (title, link, hours_ago) in entries {
        let date = (now - Duration::hours(*hours_ago)).to_rfc2822();
        out.push_str(&format!(
            "<item><title>{title}</title><link>{link}</link>\
             <description>About {title}</description><pubDate>{date}</pubDate></item>"
        ));
    }
    out.push_str("</channel></rss>");
    out
}

pub fn rss_response(entries: &[(&str, &str, i64)]) -> FetchResponse {
    FetchResponse::ok(rss_feed(entries)).with_content_type("application/rss+xml")
}

pub fn item_at(
    topic: &str,
    source: &str,
    title: &str,
    url: &str,
    fetched_at: DateTime<Utc>,
) -> Item {
    Item::new(topic, source, title, "", url, None, fetched_at)
}

pub fn run_log(topic: &str, outcome: RunOutcome) -> RunLog {
    let now = Utc::now();
    RunLog {
        topic: topic.to_string(),
        started_at: now,
        finished_at: now,
        outcome,
        source_errors: vec![],
        items_new: 0,
        message: None,
    }
}

/// Persist `items` for `topic` as if an earlier cycle produced them.
pub fn seed_items(store: &dyn Store, topic: &str, items: Vec<Item>) {
    store
        .commit_cycle(CycleCommit {
            topic: topic.to_string(),
            new_items: items,
            summary: SummaryUpdate::Unchanged,
            run_log: RunLog {
                message: Some("seed".into()),
                ..run_log(topic, RunOutcome::Success)
            },
        })
        .expect("seed commit");
}

pub fn store_with(topics: &[Topic], sources: &[Source]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.sync_catalog(topics, sources).expect("sync catalog");
    store
}

pub fn pipeline(
    store: Arc<dyn Store>,
    fetcher: Arc<StaticFetcher>,
    provider: Option<DynProvider>,
    tunables: &Tunables,
) -> Pipeline {
    let fetcher: Arc<dyn Fetcher> = fetcher;
    Pipeline::new(
        store,
        fetcher,
        SummarizerClient::new(provider, tunables),
        tunables.clone(),
    )
}
