// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod retention;
pub mod scheduler;
pub mod service;
pub mod source_weights;
pub mod store;
pub mod summarize;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::bootstrap::App;
pub use crate::config::AppConfig;
