// src/scheduler.rs
//! Topic scheduler.
//!
//! One driver task wakes every `poll_interval`, finds due topics and hands
//! each to a worker task. Per-topic state is `Idle -> Running -> Idle|Backoff`.
//! The transition to `Running` happens under one lock, which is what keeps a
//! topic to at most one cycle at a time for both the driver and manual
//! triggers. A semaphore bounds how many cycles run across topics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::settings::Tunables;
use crate::error::StoreError;
use crate::model::{RunOutcome, Topic};
use crate::pipeline::{cancelled, CycleReport, Pipeline};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Running,
    /// Last cycle failed; not retried before `retry_after`.
    Backoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerResult {
    Started,
    AlreadyRunning,
    UnknownTopic,
    Disabled,
}

#[derive(Debug, Clone)]
struct TopicState {
    phase: Phase,
    retry_after: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    last_outcome: Option<RunOutcome>,
    consecutive_failures: u32,
}

impl Default for TopicState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            retry_after: None,
            last_attempt: None,
            last_outcome: None,
            consecutive_failures: 0,
        }
    }
}

/// Per-topic view for `runStatus()`.
#[derive(Debug, Clone, Serialize)]
pub struct TopicStatus {
    pub topic: String,
    pub enabled: bool,
    pub phase: Phase,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_outcome: Option<RunOutcome>,
    pub consecutive_failures: u32,
    /// `None` while running or disabled.
    pub next_due: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerCfg {
    pub poll_interval: Duration,
    pub worker_pool: usize,
}

impl SchedulerCfg {
    pub fn from_tunables(t: &Tunables) -> Self {
        Self {
            poll_interval: t.poll_interval(),
            worker_pool: t.worker_pool.max(1),
        }
    }
}

struct Inner {
    pipeline: Pipeline,
    store: Arc<dyn Store>,
    cfg: SchedulerCfg,
    permits: Arc<Semaphore>,
    states: Mutex<HashMap<String, TopicState>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    last_tick: Mutex<Option<DateTime<Utc>>>,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Due when enabled, not running, past any backoff, and the refresh interval
/// elapsed since the last success (or it never succeeded).
fn is_due(topic: &Topic, state: Option<&TopicState>, now: DateTime<Utc>) -> bool {
    if !topic.enabled {
        return false;
    }
    if let Some(st) = state {
        match st.phase {
            Phase::Running => return false,
            Phase::Backoff if st.retry_after.is_some_and(|at| now < at) => return false,
            _ => {}
        }
    }
    topic.is_overdue(now)
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, cfg: SchedulerCfg) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let store = pipeline.store().clone();
        Self {
            inner: Arc::new(Inner {
                pipeline,
                store,
                permits: Arc::new(Semaphore::new(cfg.worker_pool)),
                cfg,
                states: Mutex::new(HashMap::new()),
                shutdown_tx,
                tasks: Mutex::new(Vec::new()),
                last_tick: Mutex::new(None),
            }),
        }
    }

    /// Start every due topic. Returns the names started.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        *relock(&self.inner.last_tick) = Some(now);
        let mut started = Vec::new();
        for listed in self.inner.store.topics()? {
            if let Some(topic) = self.begin_if_due(&listed.name, now)? {
                tracing::debug!(target: "scheduler", topic = %topic.name, "topic due");
                self.spawn_cycle(topic.name.clone(), topic.refresh_interval());
                started.push(topic.name);
            }
        }
        Ok(started)
    }

    /// Due check and `Running` transition under one lock. The topic row is
    /// re-read there, so a cycle that committed since `topics()` was listed
    /// is seen.
    fn begin_if_due(&self, name: &str, now: DateTime<Utc>) -> Result<Option<Topic>, StoreError> {
        let mut states = relock(&self.inner.states);
        let Some(topic) = self.inner.store.topic(name)? else {
            return Ok(None);
        };
        if !is_due(&topic, states.get(name), now) {
            return Ok(None);
        }
        let st = states.entry(name.to_string()).or_default();
        st.phase = Phase::Running;
        st.last_attempt = Some(now);
        Ok(Some(topic))
    }

    /// Manual "refresh now": skips the interval and backoff checks, never runs
    /// a topic twice at once.
    pub fn trigger_refresh(&self, name: &str) -> Result<TriggerResult, StoreError> {
        let Some(topic) = self.inner.store.topic(name)? else {
            return Ok(TriggerResult::UnknownTopic);
        };
        if !topic.enabled {
            return Ok(TriggerResult::Disabled);
        }
        if !self.try_begin(name, Utc::now()) {
            tracing::info!(target: "scheduler", topic = name, "refresh rejected: already running");
            return Ok(TriggerResult::AlreadyRunning);
        }
        tracing::info!(target: "scheduler", topic = name, "manual refresh started");
        self.spawn_cycle(topic.name.clone(), topic.refresh_interval());
        Ok(TriggerResult::Started)
    }

    pub fn trigger_all(&self) -> Result<Vec<(String, TriggerResult)>, StoreError> {
        let mut out = Vec::new();
        for topic in self.inner.store.topics()? {
            let result = self.trigger_refresh(&topic.name)?;
            out.push((topic.name, result));
        }
        Ok(out)
    }

    /// `Idle|Backoff -> Running`, atomically. False if already running.
    fn try_begin(&self, name: &str, now: DateTime<Utc>) -> bool {
        let mut states = relock(&self.inner.states);
        let st = states.entry(name.to_string()).or_default();
        if st.phase == Phase::Running {
            return false;
        }
        st.phase = Phase::Running;
        st.last_attempt = Some(now);
        true
    }

    fn finish(&self, name: &str, result: &Result<CycleReport, StoreError>, interval: chrono::Duration) {
        let now = Utc::now();
        let mut states = relock(&self.inner.states);
        let st = states.entry(name.to_string()).or_default();
        let outcome = match result {
            Ok(report) => report.outcome(),
            Err(_) => RunOutcome::Failure,
        };
        st.last_outcome = Some(outcome);
        if outcome.is_success() {
            st.phase = Phase::Idle;
            st.retry_after = None;
            st.consecutive_failures = 0;
        } else {
            // wait a full interval before trying a failing topic again
            let retry_after = st.last_attempt.unwrap_or(now) + interval;
            st.phase = Phase::Backoff;
            st.retry_after = Some(retry_after);
            st.consecutive_failures = st.consecutive_failures.saturating_add(1);
            tracing::warn!(
                target: "scheduler",
                topic = name,
                failures = st.consecutive_failures,
                retry_after = %retry_after,
                "topic backing off"
            );
        }
    }

    fn spawn_cycle(&self, name: String, interval: chrono::Duration) {
        let this = self.clone();
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let permit = tokio::select! {
                p = this.inner.permits.clone().acquire_owned() => p,
                _ = cancelled(&mut shutdown) => {
                    this.release_cancelled(&name);
                    return;
                }
            };
            let Ok(_permit) = permit else {
                this.release_cancelled(&name);
                return;
            };

            let result = this.inner.pipeline.run_cycle(&name, shutdown).await;
            if let Err(e) = &result {
                tracing::error!(target: "scheduler", topic = %name, error = %e, "cycle could not run");
            }
            this.finish(&name, &result, interval);
        });

        let mut tasks = relock(&self.inner.tasks);
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Cancelled before the cycle began: back to idle.
    fn release_cancelled(&self, name: &str) {
        if let Some(st) = relock(&self.inner.states).get_mut(name) {
            st.phase = Phase::Idle;
        }
    }

    /// Drive `tick` on the poll interval until shutdown. The first tick fires
    /// immediately, so topics that never succeeded refresh at startup.
    pub fn spawn(&self) -> JoinHandle<()> {
        let this = self.clone();
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.inner.cfg.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(
                target: "scheduler",
                poll_secs = this.inner.cfg.poll_interval.as_secs(),
                workers = this.inner.cfg.worker_pool,
                "scheduler started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = this.tick(Utc::now()) {
                            tracing::warn!(target: "scheduler", error = %e, "tick failed");
                        }
                    }
                    _ = cancelled(&mut shutdown) => break,
                }
            }
            tracing::info!(target: "scheduler", "scheduler stopped");
        })
    }

    /// Wait for every cycle spawned so far (and any they race with) to end.
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = std::mem::take(&mut *relock(&self.inner.tasks));
            if pending.is_empty() {
                return;
            }
            for h in pending {
                let _ = h.await;
            }
        }
    }

    /// Cancel in-flight cycles and wait for them to wind down.
    pub async fn shutdown(&self) {
        self.inner.shutdown_tx.send_replace(true);
        self.wait_idle().await;
    }

    /// Receiver that flips to `true` on `shutdown`, for sibling background tasks.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    pub fn phase(&self, topic: &str) -> Phase {
        relock(&self.inner.states)
            .get(topic)
            .map_or(Phase::Idle, |s| s.phase)
    }

    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        *relock(&self.inner.last_tick)
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.cfg.poll_interval
    }

    pub fn status(&self) -> Result<Vec<TopicStatus>, StoreError> {
        let now = Utc::now();
        let topics = self.inner.store.topics()?;
        let states = relock(&self.inner.states);
        Ok(topics
            .into_iter()
            .map(|t| {
                let st = states.get(&t.name).cloned().unwrap_or_default();
                let next_due = match (t.enabled, st.phase) {
                    (false, _) | (_, Phase::Running) => None,
                    (true, Phase::Backoff) => st.retry_after,
                    (true, Phase::Idle) => Some(
                        t.last_success_at
                            .map_or(now, |at| (at + t.refresh_interval()).max(now)),
                    ),
                };
                TopicStatus {
                    enabled: t.enabled,
                    phase: st.phase,
                    last_attempt: st.last_attempt.or(t.last_run_at),
                    last_success: t.last_success_at,
                    last_outcome: st.last_outcome,
                    consecutive_failures: st.consecutive_failures,
                    next_due,
                    topic: t.name,
                }
            })
            .collect())
    }
}
