// src/ingest/fetcher.rs
//! Network fetch capability.
//!
//! `HttpFetcher` is the production implementation: bounded timeouts, a hard
//! response size cap, and per-source request spacing shared by every topic.
//! `StaticFetcher` serves canned responses for tests and offline runs.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::config::settings::Tunables;
use crate::error::FetchError;
use crate::ingest::rate_limit::RateLimiter;
use crate::model::Source;

/// Raw content returned by a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, ct: &str) -> Self {
        self.content_type = Some(ct.to_string());
        self
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<FetchResponse, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
    limiter: RateLimiter,
}

impl HttpFetcher {
    pub fn new(tunables: &Tunables) -> Result<Self, FetchError> {
        let timeout = tunables.fetch_timeout();
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                "topic-digest/",
                env!("CARGO_PKG_VERSION"),
                " (content aggregator)"
            ))
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            max_bytes: tunables.max_response_bytes,
            limiter: RateLimiter::new(tunables.rate_limit_spacing()),
        })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::ConnectionRefused(e.to_string())
    } else {
        FetchError::Transport(e.to_string())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, source: &Source) -> Result<FetchResponse, FetchError> {
        self.limiter.acquire(&source.name).await;

        let mut request = self.client.get(&source.url);
        if !source.params.is_empty() {
            request = request.query(&source.params);
        }
        for (name, value) in &source.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let mut resp = request.send().await.map_err(classify)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        if resp
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Stream so an unannounced oversized body never lands in memory whole.
        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(classify)? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(
            target: "fetch",
            source = %source.name,
            bytes = body.len(),
            "fetched"
        );
        Ok(FetchResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

// --- Test helper ---

/// Serves canned responses keyed by source name. Unknown sources answer 404.
pub struct StaticFetcher {
    responses: Mutex<HashMap<String, Result<FetchResponse, FetchError>>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold every fetch for `delay` (simulated network latency).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn respond(self, source: &str, response: FetchResponse) -> Self {
        self.set(source, Ok(response));
        self
    }

    pub fn fail(self, source: &str, error: FetchError) -> Self {
        self.set(source, Err(error));
        self
    }

    /// Replace the canned answer for a source between cycles.
    pub fn set(&self, source: &str, answer: Result<FetchResponse, FetchError>) {
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(source.to_string(), answer);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for StaticFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, source: &Source) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let answer = self
            .responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&source.name)
            .cloned()
            .unwrap_or(Err(FetchError::HttpStatus(404)));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        answer
    }
}
