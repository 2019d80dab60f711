// tests/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use topic_digest::error::{FetchError, StoreError};
use topic_digest::ingest::fetcher::StaticFetcher;
use topic_digest::model::{Item, RunLog, RunOutcome, Source, SourceKind, Summary, Topic};
use topic_digest::scheduler::{Phase, Scheduler, SchedulerCfg, TriggerResult};
use topic_digest::store::memory::MemoryStore;
use topic_digest::store::{CycleCommit, PrunePolicy, PruneReport, Store};

mod common;

fn cfg(worker_pool: usize) -> SchedulerCfg {
    SchedulerCfg {
        poll_interval: Duration::from_secs(60),
        worker_pool,
    }
}

fn feed(prefix: &str) -> topic_digest::ingest::fetcher::FetchResponse {
    let t1 = format!("{prefix} one");
    let t2 = format!("{prefix} two");
    let l1 = format!("https://{prefix}.example/1");
    let l2 = format!("https://{prefix}.example/2");
    common::rss_response(&[(t1.as_str(), l1.as_str(), 1), (t2.as_str(), l2.as_str(), 2)])
}

fn two_topics() -> Arc<MemoryStore> {
    common::store_with(
        &[common::topic("technology", 1), common::topic("weather", 2)],
        &[
            common::source("tech_rss", SourceKind::Rss, 0.9, &["technology"]),
            common::source("weather_rss", SourceKind::Rss, 0.7, &["weather"]),
        ],
    )
}

fn scheduler(store: Arc<MemoryStore>, fetcher: Arc<StaticFetcher>, workers: usize) -> Scheduler {
    let pipeline = common::pipeline(store, fetcher, None, &common::tunables());
    Scheduler::new(pipeline, cfg(workers))
}

#[tokio::test(start_paused = true)]
async fn refresh_while_running_is_rejected() {
    let store = two_topics();
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_delay(Duration::from_secs(10))
            .respond("tech_rss", feed("tech")),
    );
    let sched = scheduler(store.clone(), fetcher, 2);

    assert_eq!(sched.trigger_refresh("technology").unwrap(), TriggerResult::Started);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sched.phase("technology"), Phase::Running);
    assert_eq!(
        sched.trigger_refresh("technology").unwrap(),
        TriggerResult::AlreadyRunning
    );

    sched.wait_idle().await;
    assert_eq!(sched.phase("technology"), Phase::Idle);
    assert_eq!(store.run_logs(Some("technology"), 10).unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_start_one_cycle() {
    let store = two_topics();
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_delay(Duration::from_millis(200))
            .respond("tech_rss", feed("tech")),
    );
    let sched = scheduler(store.clone(), fetcher.clone(), 4);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let s = sched.clone();
        handles.push(tokio::spawn(async move { s.trigger_refresh("technology").unwrap() }));
    }
    let mut started = 0;
    for h in handles {
        if h.await.unwrap() == TriggerResult::Started {
            started += 1;
        }
    }
    assert_eq!(started, 1);

    sched.wait_idle().await;
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(store.run_logs(Some("technology"), 10).unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_and_disabled_topics() {
    let store = two_topics();
    let mut off = common::topic("archive", 1);
    off.enabled = false;
    store.sync_catalog(&[off], &[]).unwrap();
    let sched = scheduler(store, Arc::new(StaticFetcher::new()), 1);

    assert_eq!(sched.trigger_refresh("nope").unwrap(), TriggerResult::UnknownTopic);
    assert_eq!(sched.trigger_refresh("archive").unwrap(), TriggerResult::Disabled);
    assert!(!sched.tick(Utc::now()).unwrap().contains(&"archive".to_string()));
    sched.wait_idle().await;
}

#[tokio::test(start_paused = true)]
async fn tick_starts_only_due_topics() {
    let store = two_topics();
    let fetcher = Arc::new(
        StaticFetcher::new()
            .respond("tech_rss", feed("tech"))
            .respond("weather_rss", feed("weather")),
    );
    let sched = scheduler(store.clone(), fetcher, 2);

    let mut started = sched.tick(Utc::now()).unwrap();
    started.sort();
    assert_eq!(started, vec!["technology".to_string(), "weather".to_string()]);
    sched.wait_idle().await;
    assert!(sched.last_tick().is_some());

    // both just succeeded; neither interval has elapsed
    assert!(sched.tick(Utc::now()).unwrap().is_empty());

    // an hour and change later only the 1h topic is due again
    let later = Utc::now() + chrono::Duration::minutes(61);
    assert_eq!(sched.tick(later).unwrap(), vec!["technology".to_string()]);
    sched.wait_idle().await;
}

#[tokio::test(start_paused = true)]
async fn failed_cycle_backs_off_but_manual_refresh_bypasses() {
    let store = two_topics();
    let fetcher = Arc::new(
        StaticFetcher::new()
            .fail("tech_rss", FetchError::Timeout)
            .respond("weather_rss", feed("weather")),
    );
    let sched = scheduler(store.clone(), fetcher.clone(), 2);

    sched.tick(Utc::now()).unwrap();
    sched.wait_idle().await;
    assert_eq!(sched.phase("technology"), Phase::Backoff);
    assert_eq!(sched.phase("weather"), Phase::Idle);

    let status = sched.status().unwrap();
    let tech = status.iter().find(|s| s.topic == "technology").unwrap();
    assert_eq!(tech.last_outcome, Some(RunOutcome::Failure));
    assert_eq!(tech.consecutive_failures, 1);
    assert!(tech.next_due.unwrap() > Utc::now());

    // still inside the backoff window
    assert!(sched.tick(Utc::now()).unwrap().is_empty());

    fetcher.set("tech_rss", Ok(feed("tech")));
    assert_eq!(sched.trigger_refresh("technology").unwrap(), TriggerResult::Started);
    sched.wait_idle().await;
    assert_eq!(sched.phase("technology"), Phase::Idle);
    let tech = sched
        .status()
        .unwrap()
        .into_iter()
        .find(|s| s.topic == "technology")
        .unwrap();
    assert_eq!(tech.consecutive_failures, 0);
    assert_eq!(tech.last_outcome, Some(RunOutcome::Success));
}

#[tokio::test(start_paused = true)]
async fn worker_pool_bounds_concurrent_cycles() {
    let store = two_topics();
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_delay(Duration::from_secs(5))
            .respond("tech_rss", feed("tech"))
            .respond("weather_rss", feed("weather")),
    );
    let sched = scheduler(store.clone(), fetcher.clone(), 1);

    assert_eq!(sched.tick(Utc::now()).unwrap().len(), 2);
    sched.wait_idle().await;
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(fetcher.max_in_flight(), 1);
    assert_eq!(store.run_logs(None, 10).unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_cycles() {
    let store = two_topics();
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_delay(Duration::from_secs(60))
            .respond("tech_rss", feed("tech")),
    );
    let sched = scheduler(store.clone(), fetcher, 1);

    assert_eq!(sched.trigger_refresh("technology").unwrap(), TriggerResult::Started);
    tokio::time::sleep(Duration::from_secs(1)).await;
    sched.shutdown().await;

    assert!(sched.is_shutting_down());
    let logs = store.run_logs(Some("technology"), 10).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message.as_deref(), Some("cancelled by shutdown"));
    assert!(store.recent_items("technology", 10).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn driver_refreshes_never_run_topics_at_startup() {
    let store = two_topics();
    let fetcher = Arc::new(
        StaticFetcher::new()
            .respond("tech_rss", feed("tech"))
            .respond("weather_rss", feed("weather")),
    );
    let sched = scheduler(store.clone(), fetcher, 2);

    let driver = sched.spawn();
    tokio::time::sleep(Duration::from_millis(50)).await;
    sched.wait_idle().await;

    assert!(sched.last_tick().is_some());
    assert_eq!(store.recent_items("technology", 10).unwrap().len(), 2);
    assert_eq!(store.recent_items("weather", 10).unwrap().len(), 2);

    sched.shutdown().await;
    driver.await.unwrap();
}

/// Lists topics as they were when built; every other call sees the live store.
struct StaleListing {
    live: Arc<MemoryStore>,
    listed: Vec<Topic>,
}

impl Store for StaleListing {
    fn sync_catalog(&self, topics: &[Topic], sources: &[Source]) -> Result<(), StoreError> {
        self.live.sync_catalog(topics, sources)
    }
    fn topics(&self) -> Result<Vec<Topic>, StoreError> {
        Ok(self.listed.clone())
    }
    fn topic(&self, name: &str) -> Result<Option<Topic>, StoreError> {
        self.live.topic(name)
    }
    fn sources(&self) -> Result<Vec<Source>, StoreError> {
        self.live.sources()
    }
    fn sources_for_topic(&self, topic: &str) -> Result<Vec<Source>, StoreError> {
        self.live.sources_for_topic(topic)
    }
    fn recent_items(&self, topic: &str, limit: usize) -> Result<Vec<Item>, StoreError> {
        self.live.recent_items(topic, limit)
    }
    fn current_summary(&self, topic: &str) -> Result<Option<Summary>, StoreError> {
        self.live.current_summary(topic)
    }
    fn run_logs(&self, topic: Option<&str>, limit: usize) -> Result<Vec<RunLog>, StoreError> {
        self.live.run_logs(topic, limit)
    }
    fn commit_cycle(&self, commit: CycleCommit) -> Result<(), StoreError> {
        self.live.commit_cycle(commit)
    }
    fn append_run_log(&self, log: RunLog) -> Result<(), StoreError> {
        self.live.append_run_log(log)
    }
    fn prune_topic(&self, topic: &str, policy: &PrunePolicy) -> Result<PruneReport, StoreError> {
        self.live.prune_topic(topic, policy)
    }
    fn remove_topic(&self, topic: &str) -> Result<(), StoreError> {
        self.live.remove_topic(topic)
    }
}

#[tokio::test(start_paused = true)]
async fn tick_judges_due_from_the_latest_commit() {
    let live = two_topics();
    let before = live.topics().unwrap();
    let fetcher = Arc::new(
        StaticFetcher::new()
            .respond("tech_rss", feed("tech"))
            .respond("weather_rss", feed("weather")),
    );

    // A manual cycle commits after the listing was taken.
    let manual = scheduler(live.clone(), fetcher.clone(), 1);
    assert_eq!(manual.trigger_refresh("technology").unwrap(), TriggerResult::Started);
    manual.wait_idle().await;
    assert!(live.topic("technology").unwrap().unwrap().last_success_at.is_some());

    let stale: Arc<dyn Store> = Arc::new(StaleListing {
        live: live.clone(),
        listed: before,
    });
    let pipeline = common::pipeline(stale, fetcher.clone(), None, &common::tunables());
    let sched = Scheduler::new(pipeline, cfg(2));

    let started = sched.tick(Utc::now()).unwrap();
    assert_eq!(started, vec!["weather".to_string()]);
    sched.wait_idle().await;
    assert_eq!(live.run_logs(Some("technology"), 10).unwrap().len(), 1);
}
