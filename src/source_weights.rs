//! # Source Weights
//!
//! Lookup from source names to ranking weights in `[0.1, 1.0]`.
//!
//! - Built from the configured sources; the stored weight is clamped.
//! - Keyed by the exact source name; `tech_rss` and `tech-rss` are
//!   different sources.
//! - Unknown sources (e.g. removed from the catalog while their items are
//!   still retained) fall back to `DEFAULT_WEIGHT`.

use std::collections::HashMap;

use crate::model::Source;

pub const MIN_WEIGHT: f64 = 0.1;
pub const MAX_WEIGHT: f64 = 1.0;
pub const DEFAULT_WEIGHT: f64 = 0.6;

#[derive(Debug, Clone, Default)]
pub struct SourceWeights {
    weights: HashMap<String, f64>,
}

impl SourceWeights {
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a Source>) -> Self {
        let weights = sources
            .into_iter()
            .map(|s| (s.name.clone(), clamp_weight(s.weight)))
            .collect();
        Self { weights }
    }

    pub fn insert(&mut self, name: &str, weight: f64) {
        self.weights.insert(name.to_string(), clamp_weight(weight));
    }

    pub fn weight_for(&self, source: &str) -> f64 {
        self.weights.get(source).copied().unwrap_or(DEFAULT_WEIGHT)
    }
}

/// Clamp to `[MIN_WEIGHT, MAX_WEIGHT]`; NaN becomes the default.
pub fn clamp_weight(x: f64) -> f64 {
    if x.is_nan() {
        DEFAULT_WEIGHT
    } else {
        x.clamp(MIN_WEIGHT, MAX_WEIGHT)
    }
}
