// src/analyze/mod.rs
//! Per-topic merge stage: cross-source dedupe, then weight x recency ranking.

pub mod dedup;
pub mod rank;
