// src/summarize/mod.rs
//! Summarizer client: bounded prompt, retry with exponential backoff for
//! transient failures, and one hard deadline over the whole call.

pub mod provider;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::config::settings::Tunables;
use crate::error::SummarizeError;
use crate::model::{Item, Source, Summary, Topic};
use crate::summarize::provider::DynProvider;

/// Item content is cut to this many characters inside the prompt.
pub const PROMPT_CONTENT_CHARS: usize = 500;
/// Items listed per source in the extractive digest.
pub const DIGEST_ITEMS_PER_SOURCE: usize = 5;

#[derive(Clone)]
pub struct SummarizerClient {
    provider: Option<DynProvider>,
    max_attempts: u32,
    backoff: Duration,
    timeout: Duration,
    top_k: usize,
}

impl SummarizerClient {
    /// `provider = None` produces extractive digests without any remote call.
    pub fn new(provider: Option<DynProvider>, tunables: &Tunables) -> Self {
        Self {
            provider,
            max_attempts: tunables.summarize_max_attempts.max(1),
            backoff: tunables.summarize_backoff(),
            timeout: tunables.summarize_timeout(),
            top_k: tunables.summary_top_k.max(1),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.as_ref().map_or("extractive", |p| p.name())
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Summarize the top-K of `ranked` (best first) for `topic`.
    pub async fn summarize(
        &self,
        topic: &Topic,
        ranked: &[Item],
        sources: &[Source],
        now: DateTime<Utc>,
    ) -> Result<Summary, SummarizeError> {
        let picked = &ranked[..ranked.len().min(self.top_k)];
        let names: HashMap<&str, &str> = sources
            .iter()
            .map(|s| (s.name.as_str(), s.display_name.as_str()))
            .collect();

        let text = match &self.provider {
            None => extractive_digest(topic, picked, &names),
            Some(provider) => {
                let prompt = build_prompt(topic, picked, &names);
                tokio::time::timeout(self.timeout, self.complete_with_retry(provider, &prompt))
                    .await
                    .map_err(|_| SummarizeError::Timeout)??
            }
        };

        let mut sources_used: Vec<String> = Vec::new();
        for item in picked {
            if !sources_used.contains(&item.source) {
                sources_used.push(item.source.clone());
            }
        }

        Ok(Summary {
            topic: topic.name.clone(),
            text,
            generated_at: now,
            item_ids: picked.iter().map(|i| i.fingerprint.clone()).collect(),
            sources_used,
            provider: self.provider_name().to_string(),
            stale: false,
        })
    }

    async fn complete_with_retry(
        &self,
        provider: &DynProvider,
        prompt: &str,
    ) -> Result<String, SummarizeError> {
        let mut attempt = 1u32;
        loop {
            let result = provider.complete(prompt).await.and_then(|text| {
                let text = text.trim().to_string();
                if text.is_empty() {
                    Err(SummarizeError::InvalidResponse("empty summary".to_string()))
                } else {
                    Ok(text)
                }
            });
            let outcome = if result.is_ok() { "ok" } else { "error" };
            counter!("digest_summarize_attempts_total", "outcome" => outcome).increment(1);

            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let wait = self.backoff * (1u32 << (attempt - 1).min(16));
                    tracing::warn!(
                        target: "summarize",
                        provider = provider.name(),
                        attempt,
                        error = %e,
                        wait_ms = wait.as_millis() as u64,
                        "retrying summarization"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        target: "summarize",
                        provider = provider.name(),
                        attempt,
                        error = %e,
                        "summarization failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut.trim_end())
    }
}

fn display<'a>(names: &HashMap<&str, &'a str>, source: &'a str) -> &'a str {
    names.get(source).copied().unwrap_or(source)
}

/// Numbered item list plus instructions. Item bodies are truncated.
pub fn build_prompt(topic: &Topic, items: &[Item], names: &HashMap<&str, &str>) -> String {
    let mut out = format!(
        "Summarize the latest {} updates from the {} items below.\n\
         Write 2-4 short paragraphs in plain prose. Attribute key facts to their \
         source by name and merge items that report the same story.\n",
        topic.display_name,
        items.len()
    );
    if !topic.description.trim().is_empty() {
        out.push_str(&format!("Topic focus: {}\n", topic.description.trim()));
    }
    out.push('\n');
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!(
            "{}. [{}] {}\n",
            i + 1,
            display(names, &item.source),
            item.title
        ));
        if !item.body.is_empty() {
            out.push_str(&format!("   {}\n", truncate(&item.body, PROMPT_CONTENT_CHARS)));
        }
        if !item.url.is_empty() {
            out.push_str(&format!("   URL: {}\n", item.url));
        }
    }
    out
}

/// Markdown digest grouped by source, used when no AI provider is configured.
pub fn extractive_digest(topic: &Topic, items: &[Item], names: &HashMap<&str, &str>) -> String {
    let mut groups: Vec<(&str, Vec<&Item>)> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|(s, _)| *s == item.source) {
            Some((_, list)) => list.push(item),
            None => groups.push((item.source.as_str(), vec![item])),
        }
    }

    let mut out = format!(
        "## {}\n\n*{} items collected*\n",
        topic.display_name,
        items.len()
    );
    for (source, list) in groups {
        out.push_str(&format!("\n**From {}:**\n", display(names, source)));
        for item in list.into_iter().take(DIGEST_ITEMS_PER_SOURCE) {
            if item.url.is_empty() {
                out.push_str(&format!("- {}\n", item.title));
            } else {
                out.push_str(&format!("- [{}]({})\n", item.title, item.url));
            }
        }
    }
    out
}
