// src/analyze/rank.rs
//! Ranking: `score = source_weight * recency_decay(age)`.
//!
//! `recency_decay` halves every `half_life`; items dated in the future count as
//! brand new. Ties fall back to newer publication time, then source name,
//! then fingerprint, so the order is total and repeatable.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};

use crate::model::Item;
use crate::source_weights::SourceWeights;

#[derive(Debug, Clone, Copy)]
pub struct RankParams {
    pub now: DateTime<Utc>,
    pub half_life: Duration,
}

/// Monotonically decreasing in age, `1.0` at age zero.
pub fn recency_decay(age: Duration, half_life: Duration) -> f64 {
    let age_secs = age.num_milliseconds().max(0) as f64 / 1_000.0;
    let hl_secs = (half_life.num_milliseconds().max(1) as f64) / 1_000.0;
    0.5_f64.powf(age_secs / hl_secs)
}

#[derive(Debug, Clone)]
pub struct Ranked {
    pub item: Item,
    pub score: f64,
}

fn order(a: &Ranked, b: &Ranked) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.item.published_at.cmp(&a.item.published_at))
        .then_with(|| a.item.source.cmp(&b.item.source))
        .then_with(|| a.item.fingerprint.cmp(&b.item.fingerprint))
}

/// Score and order items, best first, keeping at most `limit`.
pub fn rank_scored(
    items: Vec<Item>,
    weights: &SourceWeights,
    params: RankParams,
    limit: usize,
) -> Vec<Ranked> {
    let mut scored: Vec<Ranked> = items
        .into_iter()
        .map(|item| {
            let w = weights.weight_for(&item.source);
            let decay = recency_decay(params.now - item.published_at, params.half_life);
            Ranked {
                score: w * decay,
                item,
            }
        })
        .collect();
    scored.sort_by(order);
    scored.truncate(limit);
    scored
}

pub fn rank(
    items: Vec<Item>,
    weights: &SourceWeights,
    params: RankParams,
    limit: usize,
) -> Vec<Item> {
    rank_scored(items, weights, params, limit)
        .into_iter()
        .map(|r| r.item)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_halves_per_half_life() {
        let hl = Duration::hours(12);
        assert!((recency_decay(Duration::zero(), hl) - 1.0).abs() < 1e-12);
        assert!((recency_decay(Duration::hours(12), hl) - 0.5).abs() < 1e-12);
        assert!((recency_decay(Duration::hours(24), hl) - 0.25).abs() < 1e-12);
        assert!((recency_decay(Duration::hours(-3), hl) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn decay_is_monotonic() {
        let hl = Duration::hours(6);
        let mut prev = f64::INFINITY;
        for h in 0..48 {
            let d = recency_decay(Duration::hours(h), hl);
            assert!(d < prev);
            prev = d;
        }
    }
}
