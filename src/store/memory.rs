// src/store/memory.rs
//! In-process store with optional JSON snapshot durability.
//!
//! Transactions run against a copy of the tables; the copy replaces the live
//! tables only after the change (and the snapshot write, when configured)
//! succeeded, so readers never see half a cycle.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{Item, RunLog, Source, Summary, Topic};
use crate::store::{CycleCommit, PrunePolicy, PruneReport, Store, SummaryUpdate};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    topics: BTreeMap<String, Topic>,
    sources: BTreeMap<String, Source>,
    /// Per topic, in insertion order.
    items: BTreeMap<String, Vec<Item>>,
    summaries: BTreeMap<String, Summary>,
    /// Append order.
    run_logs: Vec<RunLog>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` when it exists; every later commit rewrites it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tables = if path.exists() {
            let data =
                fs::read_to_string(&path).map_err(|e| StoreError::Snapshot(e.to_string()))?;
            serde_json::from_str(&data).map_err(|e| StoreError::Snapshot(e.to_string()))?
        } else {
            Tables::default()
        };
        tracing::info!(
            path = %path.display(),
            topics = tables.topics.len(),
            "store snapshot opened"
        );
        Ok(Self {
            tables: Mutex::new(tables),
            snapshot: Some(path),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, StoreError> {
        let guard = self.lock()?;
        Ok(f(&guard))
    }

    fn transact<R>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut guard = self.lock()?;
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        if let Some(path) = &self.snapshot {
            write_snapshot(path, &draft)?;
        }
        *guard = draft;
        Ok(out)
    }
}

fn write_snapshot(path: &Path, tables: &Tables) -> Result<(), StoreError> {
    let err = |e: std::io::Error| StoreError::Snapshot(e.to_string());
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(err)?;
    }
    let json = serde_json::to_vec(tables).map_err(|e| StoreError::Snapshot(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp).map_err(err)?;
    f.write_all(&json).map_err(err)?;
    f.sync_all().map_err(err)?;
    fs::rename(&tmp, path).map_err(err)?;
    Ok(())
}

impl Store for MemoryStore {
    fn sync_catalog(&self, topics: &[Topic], sources: &[Source]) -> Result<(), StoreError> {
        self.transact(|t| {
            for topic in topics {
                match t.topics.get_mut(&topic.name) {
                    Some(existing) => {
                        existing.display_name = topic.display_name.clone();
                        existing.description = topic.description.clone();
                        existing.enabled = topic.enabled;
                        existing.refresh_hours = topic.refresh_hours;
                    }
                    None => {
                        t.topics.insert(topic.name.clone(), topic.clone());
                    }
                }
            }
            for source in sources {
                t.sources.insert(source.name.clone(), source.clone());
            }
            Ok(())
        })
    }

    fn topics(&self) -> Result<Vec<Topic>, StoreError> {
        self.read(|t| t.topics.values().cloned().collect())
    }

    fn topic(&self, name: &str) -> Result<Option<Topic>, StoreError> {
        self.read(|t| t.topics.get(name).cloned())
    }

    fn sources(&self) -> Result<Vec<Source>, StoreError> {
        self.read(|t| t.sources.values().cloned().collect())
    }

    fn sources_for_topic(&self, topic: &str) -> Result<Vec<Source>, StoreError> {
        self.read(|t| {
            t.sources
                .values()
                .filter(|s| s.feeds(topic))
                .cloned()
                .collect()
        })
    }

    fn recent_items(&self, topic: &str, limit: usize) -> Result<Vec<Item>, StoreError> {
        self.read(|t| {
            let mut items = t.items.get(topic).cloned().unwrap_or_default();
            items.reverse();
            // stable: equal fetch times keep newest-inserted first
            items.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
            items.truncate(limit);
            items
        })
    }

    fn current_summary(&self, topic: &str) -> Result<Option<Summary>, StoreError> {
        self.read(|t| t.summaries.get(topic).cloned())
    }

    fn run_logs(&self, topic: Option<&str>, limit: usize) -> Result<Vec<RunLog>, StoreError> {
        self.read(|t| {
            t.run_logs
                .iter()
                .rev()
                .filter(|l| topic.map_or(true, |name| l.topic == name))
                .take(limit)
                .cloned()
                .collect()
        })
    }

    fn commit_cycle(&self, commit: CycleCommit) -> Result<(), StoreError> {
        self.transact(|t| {
            let CycleCommit {
                topic,
                new_items,
                summary,
                run_log,
            } = commit;

            let entry = t
                .topics
                .get_mut(&topic)
                .ok_or_else(|| StoreError::UnknownTopic(topic.clone()))?;
            entry.last_run_at = Some(run_log.finished_at);
            if run_log.outcome.is_success() {
                entry.last_success_at = Some(run_log.finished_at);
            }

            let items = t.items.entry(topic.clone()).or_default();
            let mut seen: HashSet<&str> = items.iter().map(|i| i.fingerprint.as_str()).collect();
            for item in &new_items {
                if item.topic != topic {
                    return Err(StoreError::Constraint(format!(
                        "item for '{}' committed under '{topic}'",
                        item.topic
                    )));
                }
                if !seen.insert(item.fingerprint.as_str()) {
                    return Err(StoreError::Constraint(format!(
                        "duplicate fingerprint {} in topic '{topic}'",
                        item.fingerprint
                    )));
                }
            }
            items.extend(new_items);

            match summary {
                SummaryUpdate::Replace(s) => {
                    t.summaries.insert(topic.clone(), s);
                }
                SummaryUpdate::MarkStale => {
                    if let Some(s) = t.summaries.get_mut(&topic) {
                        s.stale = true;
                    }
                }
                SummaryUpdate::Touch => {
                    if let Some(s) = t.summaries.get_mut(&topic) {
                        s.stale = false;
                    }
                }
                SummaryUpdate::Unchanged => {}
            }

            t.run_logs.push(run_log);
            Ok(())
        })
    }

    fn append_run_log(&self, log: RunLog) -> Result<(), StoreError> {
        self.transact(|t| {
            if let Some(entry) = t.topics.get_mut(&log.topic) {
                entry.last_run_at = Some(log.finished_at);
            }
            t.run_logs.push(log);
            Ok(())
        })
    }

    fn prune_topic(&self, topic: &str, policy: &PrunePolicy) -> Result<PruneReport, StoreError> {
        // Skip the snapshot rewrite when there is nothing to delete.
        let due = self.read(|t| {
            let items = t.items.get(topic).map_or(&[][..], |v| v.as_slice());
            let expired_items = items.iter().any(|i| i.fetched_at < policy.cutoff);
            let expired_logs = t
                .run_logs
                .iter()
                .any(|l| l.topic == topic && l.finished_at < policy.cutoff);
            expired_items || expired_logs || items.len() > policy.max_items
        })?;
        if !due {
            return Ok(PruneReport::default());
        }

        self.transact(|t| {
            let mut report = PruneReport::default();
            if let Some(items) = t.items.get_mut(topic) {
                let before = items.len();
                items.retain(|i| i.fetched_at >= policy.cutoff);
                if items.len() > policy.max_items {
                    let mut order: Vec<usize> = (0..items.len()).collect();
                    order.sort_by(|&a, &b| {
                        items[b]
                            .fetched_at
                            .cmp(&items[a].fetched_at)
                            .then_with(|| b.cmp(&a))
                    });
                    let keep: HashSet<usize> = order.into_iter().take(policy.max_items).collect();
                    let mut idx = 0;
                    items.retain(|_| {
                        let kept = keep.contains(&idx);
                        idx += 1;
                        kept
                    });
                }
                report.items_deleted = before - items.len();
            }

            let before = t.run_logs.len();
            t.run_logs
                .retain(|l| l.topic != topic || l.finished_at >= policy.cutoff);
            report.run_logs_deleted = before - t.run_logs.len();
            Ok(report)
        })
    }

    fn remove_topic(&self, topic: &str) -> Result<(), StoreError> {
        self.transact(|t| {
            if t.topics.remove(topic).is_none() {
                return Err(StoreError::UnknownTopic(topic.to_string()));
            }
            t.items.remove(topic);
            t.summaries.remove(topic);
            t.run_logs.retain(|l| l.topic != topic);
            Ok(())
        })
    }
}
