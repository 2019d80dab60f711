// src/config/mod.rs
//! Config file loading: catalog, tunables, AI provider, store snapshot.
//!
//! The file is TOML or JSON (by extension). Path comes from
//! `DIGEST_CONFIG_PATH`, else `config/digest.toml`, else `config/digest.json`.

pub mod ai;
pub mod catalog;
pub mod settings;

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::config::ai::AiConfig;
use crate::config::catalog::{Catalog, SourceDef, TopicDef};
use crate::config::settings::Tunables;

pub const CONFIG_PATH_ENV: &str = "DIGEST_CONFIG_PATH";
const FALLBACK_PATHS: [&str; 2] = ["config/digest.toml", "config/digest.json"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// JSON snapshot file; in-memory only when absent.
    pub snapshot_path: Option<PathBuf>,
}

/// On-disk shape of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub topics: Vec<TopicDef>,
    pub sources: Vec<SourceDef>,
    pub tunables: Tunables,
    pub ai: AiConfig,
    pub store: StoreSection,
}

/// Fully validated configuration handed to the core.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub catalog: Catalog,
    pub tunables: Tunables,
    pub ai: AiConfig,
    pub snapshot_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_file_contents(file: ConfigFile) -> anyhow::Result<Self> {
        let mut tunables = file.tunables;
        tunables.apply_env();
        tunables.validate()?;

        let catalog = Catalog::from_defs(file.topics, file.sources)?;

        let mut ai = file.ai;
        ai.resolve()?;

        Ok(Self {
            catalog,
            tunables,
            ai,
            snapshot_path: file.store.snapshot_path,
        })
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let file: ConfigFile = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&data)
                .with_context(|| format!("parsing JSON config {}", path.display()))?,
            _ => toml::from_str(&data)
                .with_context(|| format!("parsing TOML config {}", path.display()))?,
        };
        let cfg = Self::from_file_contents(file)?;
        tracing::info!(
            path = %path.display(),
            topics = cfg.catalog.topics.len(),
            sources = cfg.catalog.sources.len(),
            "config loaded"
        );
        Ok(cfg)
    }

    /// Resolve the config path from the environment and fallbacks, then load.
    pub fn load_default() -> anyhow::Result<Self> {
        if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
            return Self::load_from(p);
        }
        for candidate in FALLBACK_PATHS {
            if Path::new(candidate).exists() {
                return Self::load_from(candidate);
            }
        }
        anyhow::bail!(
            "no config file: set {CONFIG_PATH_ENV} or create one of {}",
            FALLBACK_PATHS.join(", ")
        )
    }
}
