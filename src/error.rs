// src/error.rs
//! Error taxonomy for the aggregation pipeline.
//!
//! Each stage owns its error type so the pipeline can decide the blast radius:
//! fetch/parse errors stay scoped to one source, summarize errors to one step,
//! store errors to one cycle. Config errors only surface at load time.

use std::fmt;

use thiserror::Error;

/// Transport failure while retrieving a source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("response exceeded {limit} bytes")]
    TooLarge { limit: usize },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Malformed or unusable source content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Required fields are absent from a structured payload.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Markup/JSON could not be read past some point.
    #[error("malformed content: {0}")]
    Malformed(String),

    #[error("empty payload")]
    Empty,

    #[error("wrong content type: {0}")]
    WrongContentType(String),
}

/// External summarization service failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SummarizeError {
    #[error("rate limited by summarization service")]
    RateLimited,

    #[error("summarization timed out")]
    Timeout,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("quota exceeded")]
    QuotaExceeded,
}

impl SummarizeError {
    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }
}

/// Persistence failure. Always fatal to the current cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown topic '{0}'")]
    UnknownTopic(String),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("snapshot I/O failed: {0}")]
    Snapshot(String),
}

/// Invalid topic/source definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid topic '{name}': {message}")]
    Topic { name: String, message: String },

    #[error("invalid source '{name}': {message}")]
    Source { name: String, message: String },

    #[error("invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("invalid tunable '{key}': {message}")]
    Tunable { key: String, message: String },
}

impl ConfigError {
    pub fn topic(name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Topic {
            name: name.into(),
            message: message.to_string(),
        }
    }

    pub fn source(name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Source {
            name: name.into(),
            message: message.to_string(),
        }
    }

    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    pub fn tunable(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Tunable {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

/// Returned when shutdown interrupts an in-flight call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cancelled by shutdown")]
pub struct Cancelled;

/// Per-source error recorded in a cycle's run log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("fetch: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse: {0}")]
    Parse(#[from] ParseError),
}
