//! Optional LLM summarization with exponential backoff.
//!
//! The item processor only sees the [`Summarizer`] capability, so tests and
//! runs without a model never touch the network for it.
//!
//! # Architecture
//!
//! - [`Summarizer`]: core trait, `summarize(title, content) -> text`
//! - [`ChatCompletionsSummarizer`]: OpenAI-compatible chat-completions client
//!   (DeepSeek by default)
//! - [`RetrySummarizer`]: decorator that retries transient failures
//! - [`NoSummarizer`]: placeholder type for runs without a model
//!
//! # Retry Strategy
//!
//! Only [`SummarizeError::Transient`] failures are retried:
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use crate::config::{ConfigError, LlmSettings};
use rand::{Rng, rng};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum SummarizeError {
    /// Worth retrying: rate limits, 5xx, timeouts, dropped connections.
    #[error("transient: {0}")]
    Transient(String),
    /// Retrying will not help: bad credentials, malformed reply, disabled.
    #[error("{0}")]
    Fatal(String),
}

impl SummarizeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SummarizeError::Transient(_))
    }
}

/// Something that can turn article content into a short summary.
pub trait Summarizer {
    /// Summarize `content` for an article titled `title`.
    async fn summarize(&self, title: &str, content: &str) -> Result<String, SummarizeError>;
}

/// Stand-in type parameter for processors that have no summarizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSummarizer;

impl Summarizer for NoSummarizer {
    async fn summarize(&self, _title: &str, _content: &str) -> Result<String, SummarizeError> {
        Err(SummarizeError::Fatal("summarization disabled".to_string()))
    }
}

/// Wraps any [`Summarizer`] with exponential backoff on transient failures.
pub struct RetrySummarizer<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: Summarizer> RetrySummarizer<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetrySummarizer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrySummarizer")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: Summarizer> Summarizer for RetrySummarizer<T> {
    #[instrument(level = "info", skip_all)]
    async fn summarize(&self, title: &str, content: &str) -> Result<String, SummarizeError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.summarize(title, content).await {
                Ok(summary) => return Ok(summary),
                Err(e) => {
                    attempt += 1;
                    let elapsed_ms_attempt = attempt_t0.elapsed().as_millis();
                    let elapsed_ms_total = total_t0.elapsed().as_millis();

                    if !e.is_transient() || attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt,
                            elapsed_ms_total,
                            error = %e,
                            "summarize() giving up"
                        );
                        return Err(e);
                    }

                    let delay = self
                        .base_delay
                        .saturating_mul(1 << (attempt - 1).min(16))
                        .min(self.max_delay);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt,
                        elapsed_ms_total,
                        ?delay,
                        error = %e,
                        "summarize() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// OpenAI-compatible chat-completions summarizer.
pub struct ChatCompletionsSummarizer {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    words: u32,
    temperature: f32,
    max_tokens: u32,
}

impl fmt::Debug for ChatCompletionsSummarizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionsSummarizer")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("words", &self.words)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl ChatCompletionsSummarizer {
    /// Build from settings, reading the API key from the environment.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, ConfigError> {
        let api_key = settings.api_key()?;
        Ok(Self::new(settings, api_key))
    }

    pub fn new(settings: &LlmSettings, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key,
            model: settings.model.clone(),
            words: settings.words,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a concise cybersecurity news editor. Summarize faithfully, without hype.\n\
             - Aim for about {} words (150-200).\n\
             - Cover what happened, who is affected, the impact, and any concrete mitigation.\n\
             - Plain text only: no emojis, no headings, at most two short paragraphs.\n\
             - Never invent details; leave out anything uncertain.\n",
            self.words
        )
    }

    fn user_prompt(title: &str, content: &str) -> String {
        format!(
            "Title: {title}\n\n\
             Summarize the article below in plain text.\n\n\
             === BEGIN CONTENT ===\n{content}\n=== END CONTENT ==="
        )
    }
}

fn classify_status(status: StatusCode, body: &str) -> SummarizeError {
    let detail = format!("HTTP {status}: {}", crate::utils::truncate_for_log(body, 300));
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        SummarizeError::Transient(detail)
    } else {
        SummarizeError::Fatal(detail)
    }
}

impl Summarizer for ChatCompletionsSummarizer {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn summarize(&self, title: &str, content: &str) -> Result<String, SummarizeError> {
        let t0 = Instant::now();
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.system_prompt()},
                {"role": "user", "content": Self::user_prompt(title, content)},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SummarizeError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SummarizeError::Fatal(format!("malformed reply: {e}")))?;
        let summary = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SummarizeError::Fatal("reply had no content".to_string()))?;

        info!(
            elapsed_ms = t0.elapsed().as_millis(),
            chars = summary.chars().count(),
            "Summary generated"
        );
        Ok(summary)
    }
}
