// src/service.rs
//! Read/trigger surface the serving layer relies on. Everything here is
//! read-only except the refresh triggers, which go through the scheduler's
//! at-most-one-run-per-topic gate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::model::{Item, RunLog, Source, Summary, Topic};
use crate::scheduler::{Scheduler, TopicStatus, TriggerResult};
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct TopicView {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub enabled: bool,
    pub refresh_hours: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub has_summary: bool,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    /// `ok` or `degraded`.
    pub status: &'static str,
    pub scheduler_alive: bool,
    pub shutting_down: bool,
    pub last_tick: Option<DateTime<Utc>>,
    pub topics: usize,
    pub enabled_topics: usize,
    pub sources: usize,
    pub stale_summaries: usize,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub topics: Vec<TopicStatus>,
    pub recent_runs: Vec<RunLog>,
}

/// Stored flag, or the refresh interval elapsed since the last success.
pub fn is_stale(topic: &Topic, summary: &Summary, now: DateTime<Utc>) -> bool {
    summary.stale || topic.is_overdue(now)
}

#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn Store>,
    scheduler: Scheduler,
    started_at: DateTime<Utc>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn Store>, scheduler: Scheduler) -> Self {
        Self {
            store,
            scheduler,
            started_at: Utc::now(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn require_topic(&self, name: &str) -> Result<Topic, StoreError> {
        self.store
            .topic(name)?
            .ok_or_else(|| StoreError::UnknownTopic(name.to_string()))
    }

    pub fn list_topics(&self) -> Result<Vec<TopicView>, StoreError> {
        let now = Utc::now();
        self.store
            .topics()?
            .into_iter()
            .map(|t| -> Result<TopicView, StoreError> {
                let summary = self.store.current_summary(&t.name)?;
                Ok(TopicView {
                    has_summary: summary.is_some(),
                    stale: summary.as_ref().is_some_and(|s| is_stale(&t, s, now)),
                    name: t.name,
                    display_name: t.display_name,
                    description: t.description,
                    enabled: t.enabled,
                    refresh_hours: t.refresh_hours,
                    last_success_at: t.last_success_at,
                })
            })
            .collect()
    }

    /// Live summary with staleness evaluated at read time.
    pub fn current_summary(&self, topic: &str) -> Result<Option<Summary>, StoreError> {
        let t = self.require_topic(topic)?;
        let now = Utc::now();
        Ok(self.store.current_summary(topic)?.map(|mut s| {
            s.stale = is_stale(&t, &s, now);
            s
        }))
    }

    pub fn raw_items(&self, topic: &str, limit: usize) -> Result<Vec<Item>, StoreError> {
        self.require_topic(topic)?;
        self.store.recent_items(topic, limit)
    }

    pub fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        self.store.sources()
    }

    pub fn trigger_refresh(&self, topic: &str) -> Result<TriggerResult, StoreError> {
        self.scheduler.trigger_refresh(topic)
    }

    pub fn trigger_all(&self) -> Result<Vec<(String, TriggerResult)>, StoreError> {
        self.scheduler.trigger_all()
    }

    pub fn health_status(&self) -> Result<Health, StoreError> {
        let now = Utc::now();
        let topics = self.store.topics()?;
        let sources = self.store.sources()?.len();
        let mut stale = 0;
        for t in &topics {
            if let Some(s) = self.store.current_summary(&t.name)? {
                if t.enabled && is_stale(t, &s, now) {
                    stale += 1;
                }
            }
        }

        let last_tick = self.scheduler.last_tick();
        let grace = chrono::Duration::from_std(self.scheduler.poll_interval() * 2)
            .unwrap_or_else(|_| chrono::Duration::minutes(2))
            + chrono::Duration::seconds(5);
        let shutting_down = self.scheduler.is_shutting_down();
        let scheduler_alive = !shutting_down && last_tick.is_some_and(|at| now - at <= grace);

        Ok(Health {
            status: if scheduler_alive { "ok" } else { "degraded" },
            scheduler_alive,
            shutting_down,
            last_tick,
            enabled_topics: topics.iter().filter(|t| t.enabled).count(),
            topics: topics.len(),
            sources,
            stale_summaries: stale,
            uptime_secs: (now - self.started_at).num_seconds(),
        })
    }

    pub fn run_status(&self, recent: usize) -> Result<RunStatus, StoreError> {
        Ok(RunStatus {
            topics: self.scheduler.status()?,
            recent_runs: self.store.run_logs(None, recent)?,
        })
    }

    pub fn run_logs(&self, topic: Option<&str>, limit: usize) -> Result<Vec<RunLog>, StoreError> {
        if let Some(name) = topic {
            self.require_topic(name)?;
        }
        self.store.run_logs(topic, limit)
    }
}
