// src/analyze/dedup.rs
//! Cross-source deduplication for one topic and one cycle.
//!
//! - Each source's contribution is capped at `max_per_source` first, so one
//!   high-volume feed cannot crowd out the others.
//! - Sources are visited by weight (descending), ties in fetch order; within a
//!   source, items keep their feed order. The first occurrence of a
//!   fingerprint wins.
//! - Fingerprints already retained for the topic are dropped outright.

use std::collections::HashSet;

use crate::model::Item;

/// Items one source produced in this cycle, in fetch order.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub source: String,
    pub weight: f64,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Items not seen before, in acceptance order.
    pub fresh: Vec<Item>,
    /// Items beyond the per-source cap.
    pub capped: usize,
    /// Items whose fingerprint was already retained or seen this cycle.
    pub duplicates: usize,
}

pub fn dedupe(
    mut batches: Vec<SourceBatch>,
    retained: &[Item],
    max_per_source: usize,
) -> DedupOutcome {
    // Stable sort keeps fetch order among equal weights.
    batches.sort_by(|a, b| b.weight.total_cmp(&a.weight));

    let mut seen: HashSet<String> = retained.iter().map(|i| i.fingerprint.clone()).collect();
    let mut out = DedupOutcome::default();

    for batch in batches {
        let total = batch.items.len();
        out.capped += total.saturating_sub(max_per_source);
        for item in batch.items.into_iter().take(max_per_source) {
            if seen.insert(item.fingerprint.clone()) {
                out.fresh.push(item);
            } else {
                out.duplicates += 1;
            }
        }
    }
    out
}
