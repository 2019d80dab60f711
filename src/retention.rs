// src/retention.rs
//! Retention manager: per-topic sweep of expired items and run logs plus the
//! per-topic item cap, on its own cadence.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::settings::Tunables;
use crate::error::StoreError;
use crate::store::{PrunePolicy, PruneReport, Store};

#[derive(Debug, Clone, Serialize)]
pub struct TopicSweep {
    pub topic: String,
    #[serde(flatten)]
    pub report: PruneReport,
}

#[derive(Clone)]
pub struct RetentionManager {
    store: Arc<dyn Store>,
    horizon: chrono::Duration,
    max_items: usize,
}

impl RetentionManager {
    pub fn new(store: Arc<dyn Store>, tunables: &Tunables) -> Self {
        Self {
            store,
            horizon: tunables.retention_horizon(),
            max_items: tunables.max_items_per_topic,
        }
    }

    pub fn policy(&self, now: DateTime<Utc>) -> PrunePolicy {
        PrunePolicy {
            cutoff: now - self.horizon,
            max_items: self.max_items,
        }
    }

    /// One pass over every topic, one transaction per topic. A failing topic
    /// is logged and skipped.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<TopicSweep>, StoreError> {
        let policy = self.policy(now);
        let mut out = Vec::new();
        for topic in self.store.topics()? {
            match self.store.prune_topic(&topic.name, &policy) {
                Ok(report) => {
                    if !report.is_noop() {
                        tracing::info!(
                            target: "retention",
                            topic = %topic.name,
                            items = report.items_deleted,
                            run_logs = report.run_logs_deleted,
                            "pruned"
                        );
                        counter!("digest_retention_deleted_total", "kind" => "item")
                            .increment(report.items_deleted as u64);
                        counter!("digest_retention_deleted_total", "kind" => "run_log")
                            .increment(report.run_logs_deleted as u64);
                    }
                    out.push(TopicSweep {
                        topic: topic.name,
                        report,
                    });
                }
                Err(e) => {
                    tracing::warn!(target: "retention", topic = %topic.name, error = %e, "prune failed");
                }
            }
        }
        Ok(out)
    }

    /// Sweep now, then every `period`, until `shutdown` flips to true.
    pub fn spawn(self, period: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(e) = self.sweep(Utc::now()) {
                    tracing::warn!(target: "retention", error = %e, "sweep failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = shutdown.wait_for(|stop| *stop) => break,
                }
            }
            tracing::debug!(target: "retention", "retention task stopped");
        })
    }
}
