// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Describe every series once per process.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_fetch_errors_total", "Source fetches that failed");
        describe_counter!("digest_parse_errors_total", "Entries or payloads the parsers rejected");
        describe_counter!("digest_items_new_total", "Items persisted by cycles");
        describe_counter!("digest_dedup_dropped_total", "Items dropped as duplicates or over the per-source cap");
        describe_counter!("digest_cycles_total", "Finished topic cycles by outcome");
        describe_counter!("digest_summarize_attempts_total", "Summarization attempts by outcome");
        describe_counter!("digest_retention_deleted_total", "Rows deleted by retention sweeps");
        describe_histogram!("digest_cycle_ms", "Topic cycle duration in milliseconds");
        describe_histogram!("digest_parse_ms", "Parse duration per source in milliseconds");
        describe_gauge!("digest_last_cycle_ts", "Unix time of the last finished cycle");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already set.
    pub fn init() -> anyhow::Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
