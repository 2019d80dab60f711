// src/store/mod.rs
//! Persistence contract for topics, sources, items, summaries and run logs.
//!
//! Every mutating call is one transaction: either all of its writes become
//! visible to readers or none do.

pub mod memory;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::model::{Item, RunLog, Source, Summary, Topic};

/// What a cycle does to the topic's live summary.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryUpdate {
    /// Overwrite in place with a fresh summary.
    Replace(Summary),
    /// Keep the text, set the stale flag.
    MarkStale,
    /// Keep the text, clear the stale flag (nothing new to say).
    Touch,
    Unchanged,
}

/// All writes of one topic cycle.
#[derive(Debug, Clone)]
pub struct CycleCommit {
    pub topic: String,
    pub new_items: Vec<Item>,
    pub summary: SummaryUpdate,
    pub run_log: RunLog,
}

#[derive(Debug, Clone, Copy)]
pub struct PrunePolicy {
    /// Items fetched and run logs finished before this instant go.
    pub cutoff: DateTime<Utc>,
    /// Newest items kept per topic.
    pub max_items: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub items_deleted: usize,
    pub run_logs_deleted: usize,
}

impl PruneReport {
    pub fn is_noop(&self) -> bool {
        self.items_deleted == 0 && self.run_logs_deleted == 0
    }
}

pub trait Store: Send + Sync {
    /// Upsert topics and sources from config and replace the tagging
    /// relation. Topics absent from `topics` are kept.
    fn sync_catalog(&self, topics: &[Topic], sources: &[Source]) -> Result<(), StoreError>;

    fn topics(&self) -> Result<Vec<Topic>, StoreError>;
    fn topic(&self, name: &str) -> Result<Option<Topic>, StoreError>;
    fn sources(&self) -> Result<Vec<Source>, StoreError>;
    fn sources_for_topic(&self, topic: &str) -> Result<Vec<Source>, StoreError>;

    /// Newest first by fetch time.
    fn recent_items(&self, topic: &str, limit: usize) -> Result<Vec<Item>, StoreError>;
    fn current_summary(&self, topic: &str) -> Result<Option<Summary>, StoreError>;
    /// Newest first; `None` means all topics.
    fn run_logs(&self, topic: Option<&str>, limit: usize) -> Result<Vec<RunLog>, StoreError>;

    /// Persist a cycle's items, summary change and run log atomically, and
    /// stamp the topic's last run/success times.
    fn commit_cycle(&self, commit: CycleCommit) -> Result<(), StoreError>;
    /// Record a run log on its own (cancelled or failed-to-commit cycles).
    fn append_run_log(&self, log: RunLog) -> Result<(), StoreError>;

    /// Delete expired items/run logs and enforce the item cap for one topic.
    fn prune_topic(&self, topic: &str, policy: &PrunePolicy) -> Result<PruneReport, StoreError>;
    /// Delete a topic together with its items, summary and run logs.
    fn remove_topic(&self, topic: &str) -> Result<(), StoreError>;
}
