//! Runtime settings loaded from an optional YAML file.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. Command-line flags are applied on top in `main`.
//!
//! ```yaml
//! feed: https://feeds.feedburner.com/TheHackersNews?format=xml
//! output_dir: ./THN
//! timezone: "+05:30"
//! hashtags: "#cybersecurity #infosec"
//! llm:
//!   provider: deepseek
//!   input: text
//! ```

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_FEED: &str = "https://feeds.feedburner.com/TheHackersNews?format=xml";
pub const DEFAULT_USER_AGENT: &str = "thn-post-kit/2.0 (+https://thehackernews.com)";
pub const DEFAULT_HASHTAGS: &str = "#cybersecurity #infosec #TheHackerNews";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid timezone offset `{0}` (expected e.g. +05:30)")]
    Timezone(String),
    #[error("LLM provider `{provider}` needs an API key in ${env}")]
    MissingApiKey { provider: LlmProvider, env: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Feed URL or local XML path.
    pub feed: String,
    pub output_dir: PathBuf,
    /// Fixed UTC offset used to decide which calendar day an entry belongs to.
    pub timezone: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub hashtags: String,
    pub summary_max_chars: usize,
    /// Hosts a feed URL may point at. Empty allows any host.
    pub allowed_feed_hosts: Vec<String>,
    pub llm: LlmSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            feed: DEFAULT_FEED.to_string(),
            output_dir: PathBuf::from("./THN"),
            timezone: "+05:30".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 45,
            hashtags: DEFAULT_HASHTAGS.to_string(),
            summary_max_chars: 900,
            allowed_feed_hosts: Vec::new(),
            llm: LlmSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(raw)?;
        settings.utc_offset()?;
        Ok(settings)
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.timezone
            .trim()
            .parse::<FixedOffset>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    None,
    Deepseek,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::None => f.write_str("none"),
            LlmProvider::Deepseek => f.write_str("deepseek"),
        }
    }
}

/// What the summarizer is fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LlmInput {
    /// Extracted article text.
    #[default]
    Text,
    /// Raw article HTML.
    Html,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    /// OpenAI-compatible chat-completions endpoint.
    pub endpoint: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub input: LlmInput,
    pub words: u32,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: usize,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::None,
            model: "deepseek-chat".to_string(),
            endpoint: "https://api.deepseek.com/chat/completions".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            input: LlmInput::Text,
            words: 180,
            temperature: 0.2,
            max_tokens: 600,
            max_retries: 2,
            timeout_secs: 90,
        }
    }
}

impl LlmSettings {
    pub fn enabled(&self) -> bool {
        self.provider != LlmProvider::None
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey {
                provider: self.provider,
                env: self.api_key_env.clone(),
            })
    }
}
