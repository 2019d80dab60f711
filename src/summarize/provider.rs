// src/summarize/provider.rs
//! Summarization backends: the OpenAI chat API, a fixed mock, and a scripted
//! provider for exercising retry paths.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ai::{test_mode_mock, AiConfig};
use crate::error::SummarizeError;

/// One remote completion call. Retries and the overall deadline live in the
/// client, not here.
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, SummarizeError>;
    fn name(&self) -> &'static str;
}

pub type DynProvider = Arc<dyn SummaryProvider>;

/// Pick the provider for a config. `None` means AI is off and the extractive
/// digest is used instead.
pub fn build_provider(
    cfg: &AiConfig,
    request_timeout: Duration,
) -> anyhow::Result<Option<DynProvider>> {
    if test_mode_mock() {
        return Ok(Some(Arc::new(MockProvider::default())));
    }
    if !cfg.enabled {
        return Ok(None);
    }
    match cfg.provider.as_str() {
        "openai" => Ok(Some(Arc::new(OpenAiProvider::new(cfg, request_timeout)?))),
        "mock" => Ok(Some(Arc::new(MockProvider::default()))),
        other => anyhow::bail!("Unsupported provider in config: {other}"),
    }
}

/// OpenAI provider (Chat Completions API).
pub struct OpenAiProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(cfg: &AiConfig, request_timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("topic-digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        })
    }
}

/// Map a non-success status (and its body) onto the error taxonomy.
pub fn classify_status(status: u16, body: &str) -> SummarizeError {
    let quota = body.contains("insufficient_quota") || body.to_ascii_lowercase().contains("quota");
    match status {
        402 => SummarizeError::QuotaExceeded,
        429 if quota => SummarizeError::QuotaExceeded,
        429 => SummarizeError::RateLimited,
        408 | 504 => SummarizeError::Timeout,
        other => SummarizeError::InvalidResponse(format!("HTTP {other}")),
    }
}

#[async_trait]
impl SummaryProvider for OpenAiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, SummarizeError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let sys = "You are a news editor. Summarize the supplied items faithfully, attribute facts to their sources, and do not invent details.";
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: sys,
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SummarizeError::Timeout
                } else {
                    SummarizeError::InvalidResponse(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| SummarizeError::InvalidResponse(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SummarizeError::InvalidResponse("no completion text".to_string()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Simple mock provider for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            fixed: "Summary (mock): no notable changes.".to_string(),
        }
    }
}

#[async_trait]
impl SummaryProvider for MockProvider {
    async fn complete(&self, _prompt: &str) -> Result<String, SummarizeError> {
        Ok(self.fixed.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Replays queued answers in order; once drained, keeps answering `fallback`.
/// Records every prompt it receives.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, SummarizeError>>>,
    fallback: Result<String, SummarizeError>,
    delay: Duration,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(script: impl IntoIterator<Item = Result<String, SummarizeError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: Ok("scripted summary".to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: Result<String, SummarizeError>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl SummaryProvider for ScriptedProvider {
    async fn complete(&self, prompt: &str) -> Result<String, SummarizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self
            .script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
