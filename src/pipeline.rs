// src/pipeline.rs
//! One topic cycle: fetch every enabled source, parse, dedupe, rank,
//! summarize, then persist everything in a single store transaction.
//!
//! Source failures stay scoped to their source. A summarizer failure keeps
//! the previous summary (flagged stale) but still persists the new items.
//! Cancellation at any await point drops the cycle without touching items or
//! the summary; only a failure run log is recorded.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use tokio::sync::watch;

use crate::analyze::dedup::{dedupe, SourceBatch};
use crate::analyze::rank::{rank, RankParams};
use crate::config::settings::Tunables;
use crate::error::{Cancelled, StoreError};
use crate::ingest::fetcher::Fetcher;
use crate::ingest::harvest_source;
use crate::model::{Item, RunLog, RunOutcome, SourceFailure, Summary};
use crate::source_weights::SourceWeights;
use crate::store::{CycleCommit, Store, SummaryUpdate};
use crate::summarize::SummarizerClient;

/// Resolves once `rx` reads `true`. Never resolves if the sender is gone.
pub async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub run_log: RunLog,
    pub summary_refreshed: bool,
    pub cancelled: bool,
}

impl CycleReport {
    pub fn outcome(&self) -> RunOutcome {
        self.run_log.outcome
    }
}

#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn Fetcher>,
    summarizer: SummarizerClient,
    tunables: Tunables,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        fetcher: Arc<dyn Fetcher>,
        summarizer: SummarizerClient,
        tunables: Tunables,
    ) -> Self {
        Self {
            store,
            fetcher,
            summarizer,
            tunables,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run one cycle for `topic`. `Err` when the topic is unknown or a store
    /// read fails; a failed read is still recorded as a failure run log.
    pub async fn run_cycle(
        &self,
        topic: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<CycleReport, StoreError> {
        let started_at = Utc::now();
        let t0 = Instant::now();
        let topic_row = self
            .store
            .topic(topic)
            .map_err(|e| self.read_failed(topic, started_at, &[], e))?
            .ok_or_else(|| StoreError::UnknownTopic(topic.to_string()))?;
        let all_sources = self
            .store
            .sources()
            .map_err(|e| self.read_failed(topic, started_at, &[], e))?;
        let sources: Vec<_> = all_sources
            .iter()
            .filter(|s| s.enabled && s.feeds(topic))
            .cloned()
            .collect();
        let weights = SourceWeights::from_sources(&all_sources);

        tracing::info!(target: "pipeline", topic, sources = sources.len(), "cycle started");

        // 1) fetch + parse, strictly one source after another
        let mut batches = Vec::with_capacity(sources.len());
        let mut source_errors = Vec::new();
        let mut healthy = 0usize;
        for source in &sources {
            let harvest = tokio::select! {
                h = harvest_source(self.fetcher.as_ref(), source, topic, Utc::now()) => h,
                _ = cancelled(&mut cancel) => return Ok(self.abandon(topic, started_at, source_errors)),
            };
            if harvest.is_healthy() {
                healthy += 1;
            }
            source_errors.extend(harvest.errors.iter().map(|e| SourceFailure {
                source: harvest.source.clone(),
                error: e.to_string(),
            }));
            batches.push(SourceBatch {
                source: harvest.source,
                weight: weights.weight_for(&source.name),
                items: harvest.items,
            });
        }

        // 2) dedupe against everything retained, rank, cap
        let retained = self
            .store
            .recent_items(topic, usize::MAX)
            .map_err(|e| self.read_failed(topic, started_at, &source_errors, e))?;
        let dedup = dedupe(batches, &retained, self.tunables.max_items_per_source);
        counter!("digest_dedup_dropped_total").increment((dedup.duplicates + dedup.capped) as u64);
        let params = RankParams {
            now: Utc::now(),
            half_life: self.tunables.recency_half_life(),
        };
        let fresh = rank(
            dedup.fresh,
            &weights,
            params,
            self.tunables.max_items_per_topic,
        );

        // 3) summarize the top of fresh + retained
        let all_failed = !sources.is_empty() && healthy == 0;
        let current = self
            .store
            .current_summary(topic)
            .map_err(|e| self.read_failed(topic, started_at, &source_errors, e))?;
        let pool: Vec<Item> = fresh.iter().cloned().chain(retained).collect();
        let pool = rank(pool, &weights, params, self.summarizer.top_k());
        let mut message = None;
        let mut summarize_failed = false;
        let summary = if all_failed {
            message = Some("every source failed".to_string());
            SummaryUpdate::MarkStale
        } else if pool.is_empty() {
            SummaryUpdate::Unchanged
        } else if fresh.is_empty() && current.as_ref().is_some_and(|s| covers(s, &pool)) {
            SummaryUpdate::Touch
        } else {
            let result = tokio::select! {
                r = self.summarizer.summarize(&topic_row, &pool, &all_sources, Utc::now()) => r,
                _ = cancelled(&mut cancel) => return Ok(self.abandon(topic, started_at, source_errors)),
            };
            match result {
                Ok(s) => SummaryUpdate::Replace(s),
                Err(e) => {
                    summarize_failed = true;
                    message = Some(format!("summarize: {e}"));
                    SummaryUpdate::MarkStale
                }
            }
        };

        let outcome = if all_failed || summarize_failed {
            RunOutcome::Failure
        } else if source_errors.is_empty() {
            RunOutcome::Success
        } else {
            RunOutcome::Partial
        };
        if sources.is_empty() {
            message = Some("no enabled sources".to_string());
        }

        let summary_refreshed = matches!(summary, SummaryUpdate::Replace(_));
        let items_new = fresh.len();
        let mut run_log = RunLog {
            topic: topic.to_string(),
            started_at,
            finished_at: Utc::now(),
            outcome,
            source_errors,
            items_new,
            message,
        };

        // 4) persist atomically
        let commit = CycleCommit {
            topic: topic.to_string(),
            new_items: fresh,
            summary,
            run_log: run_log.clone(),
        };
        let summary_refreshed = match self.store.commit_cycle(commit) {
            Ok(()) => summary_refreshed,
            Err(e) => {
                tracing::error!(target: "pipeline", topic, error = %e, "commit failed; cycle rolled back");
                run_log.outcome = RunOutcome::Failure;
                run_log.items_new = 0;
                run_log.message = Some(format!("store: {e}"));
                if let Err(e2) = self.store.append_run_log(run_log.clone()) {
                    tracing::error!(target: "pipeline", topic, error = %e2, "could not record run log");
                }
                false
            }
        };

        let elapsed_ms = t0.elapsed().as_secs_f64() * 1_000.0;
        counter!("digest_items_new_total").increment(run_log.items_new as u64);
        counter!("digest_cycles_total", "outcome" => run_log.outcome.as_str()).increment(1);
        histogram!("digest_cycle_ms").record(elapsed_ms);
        gauge!("digest_last_cycle_ts").set(run_log.finished_at.timestamp() as f64);

        tracing::info!(
            target: "pipeline",
            topic,
            outcome = run_log.outcome.as_str(),
            items_new = run_log.items_new,
            source_errors = run_log.source_errors.len(),
            summary_refreshed,
            elapsed_ms = elapsed_ms as u64,
            "cycle finished"
        );

        Ok(CycleReport {
            run_log,
            summary_refreshed,
            cancelled: false,
        })
    }

    /// Record a cycle that could not read its inputs, then hand the error back.
    fn read_failed(
        &self,
        topic: &str,
        started_at: chrono::DateTime<Utc>,
        source_errors: &[SourceFailure],
        error: StoreError,
    ) -> StoreError {
        tracing::error!(target: "pipeline", topic, error = %error, "store read failed");
        let run_log = RunLog {
            topic: topic.to_string(),
            started_at,
            finished_at: Utc::now(),
            outcome: RunOutcome::Failure,
            source_errors: source_errors.to_vec(),
            items_new: 0,
            message: Some(format!("store: {error}")),
        };
        if let Err(e) = self.store.append_run_log(run_log) {
            tracing::error!(target: "pipeline", topic, error = %e, "could not record run log");
        }
        counter!("digest_cycles_total", "outcome" => RunOutcome::Failure.as_str()).increment(1);
        error
    }

    /// Record a cancelled cycle. Items and summary stay untouched.
    fn abandon(
        &self,
        topic: &str,
        started_at: chrono::DateTime<Utc>,
        source_errors: Vec<SourceFailure>,
    ) -> CycleReport {
        tracing::warn!(target: "pipeline", topic, "cycle cancelled");
        let run_log = RunLog {
            topic: topic.to_string(),
            started_at,
            finished_at: Utc::now(),
            outcome: RunOutcome::Failure,
            source_errors,
            items_new: 0,
            message: Some(Cancelled.to_string()),
        };
        if let Err(e) = self.store.append_run_log(run_log.clone()) {
            tracing::error!(target: "pipeline", topic, error = %e, "could not record run log");
        }
        counter!("digest_cycles_total", "outcome" => "cancelled").increment(1);
        CycleReport {
            run_log,
            summary_refreshed: false,
            cancelled: true,
        }
    }
}

/// A summary is current when it is not stale and was built from exactly the
/// items now at the top of the pool.
fn covers(summary: &Summary, pool: &[Item]) -> bool {
    if summary.stale || summary.item_ids.len() != pool.len() {
        return false;
    }
    let ids: HashSet<&str> = summary.item_ids.iter().map(String::as_str).collect();
    pool.iter().all(|i| ids.contains(i.fingerprint.as_str()))
}
