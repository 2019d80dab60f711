// src/bootstrap.rs
//! Wiring: store, fetcher, summarizer, pipeline, scheduler, retention.

use std::sync::Arc;

use axum::Router;
use tokio::task::JoinHandle;

use crate::config::settings::Tunables;
use crate::config::AppConfig;
use crate::ingest::fetcher::{Fetcher, HttpFetcher};
use crate::pipeline::Pipeline;
use crate::retention::RetentionManager;
use crate::scheduler::{Scheduler, SchedulerCfg};
use crate::service::Aggregator;
use crate::store::memory::MemoryStore;
use crate::store::Store;
use crate::summarize::provider::{build_provider, DynProvider};
use crate::summarize::SummarizerClient;

pub struct App {
    pub store: Arc<dyn Store>,
    pub scheduler: Scheduler,
    pub retention: RetentionManager,
    pub aggregator: Aggregator,
    pub tunables: Tunables,
}

impl App {
    /// Production wiring from a loaded config.
    pub fn build(cfg: &AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = match &cfg.snapshot_path {
            Some(path) => Arc::new(MemoryStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&cfg.tunables)?);
        let provider = build_provider(&cfg.ai, cfg.tunables.summarize_timeout())?;
        Self::assemble(cfg, store, fetcher, provider)
    }

    /// Wiring with caller-supplied collaborators. Syncs the catalog into the
    /// store before anything runs.
    pub fn assemble(
        cfg: &AppConfig,
        store: Arc<dyn Store>,
        fetcher: Arc<dyn Fetcher>,
        provider: Option<DynProvider>,
    ) -> anyhow::Result<Self> {
        store.sync_catalog(&cfg.catalog.topics, &cfg.catalog.sources)?;

        let summarizer = SummarizerClient::new(provider, &cfg.tunables);
        tracing::info!(
            provider = summarizer.provider_name(),
            topics = cfg.catalog.topics.len(),
            sources = cfg.catalog.sources.len(),
            "pipeline assembled"
        );
        let pipeline = Pipeline::new(
            store.clone(),
            fetcher,
            summarizer,
            cfg.tunables.clone(),
        );
        let scheduler = Scheduler::new(pipeline, SchedulerCfg::from_tunables(&cfg.tunables));
        let retention = RetentionManager::new(store.clone(), &cfg.tunables);
        let aggregator = Aggregator::new(store.clone(), scheduler.clone());

        Ok(Self {
            store,
            scheduler,
            retention,
            aggregator,
            tunables: cfg.tunables.clone(),
        })
    }

    pub fn router(&self) -> Router {
        crate::api::router(self.aggregator.clone())
    }

    /// Spawn the scheduler driver and the retention task.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let driver = self.scheduler.spawn();
        let retention = self.retention.clone().spawn(
            self.tunables.retention_interval(),
            self.scheduler.shutdown_signal(),
        );
        vec![driver, retention]
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
