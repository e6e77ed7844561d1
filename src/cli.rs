//! Command-line interface definitions for THN Post Kit.
//!
//! Flags override values from the optional YAML config file. A few can also
//! come from environment variables.

use crate::config::{LlmInput, LlmProvider, Settings};
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Today's kits (in the configured timezone) into ./THN
/// thn_post_kit
///
/// # A specific day, at most five items, from a saved feed
/// thn_post_kit --date 2025-05-06 --max 5 --feed ./feed.xml
///
/// # LLM captions, JSON result on stdout
/// DEEPSEEK_API_KEY=... thn_post_kit --llm deepseek --json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, env = "THN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Feed URL or local XML file
    #[arg(short, long)]
    pub feed: Option<String>,

    /// Output root directory
    #[arg(short, long, env = "THN_OUT_DIR")]
    pub out: Option<PathBuf>,

    /// Target date (YYYY-MM-DD); defaults to today in the configured timezone
    #[arg(short, long)]
    pub date: Option<String>,

    /// Process at most this many entries (newest first); 0 means no cap
    #[arg(short, long)]
    pub max: Option<usize>,

    /// Overwrite existing files instead of writing `<slug>-N` siblings
    #[arg(long)]
    pub overwrite: bool,

    /// Generate captions with an LLM
    #[arg(long, value_enum)]
    pub llm: Option<LlmProvider>,

    /// LLM model name
    #[arg(long)]
    pub llm_model: Option<String>,

    /// What the LLM summarizes: extracted text or raw HTML
    #[arg(long, value_enum)]
    pub llm_input: Option<LlmInput>,

    /// Target summary length in words
    #[arg(long)]
    pub summary_words: Option<u32>,

    /// Print the run result as JSON instead of the text report
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Apply flags on top of file settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(feed) = &self.feed {
            settings.feed = feed.clone();
        }
        if let Some(out) = &self.out {
            settings.output_dir = out.clone();
        }
        if let Some(provider) = self.llm {
            settings.llm.provider = provider;
        }
        if let Some(model) = &self.llm_model {
            settings.llm.model = model.clone();
        }
        if let Some(input) = self.llm_input {
            settings.llm.input = input;
        }
        if let Some(words) = self.summary_words {
            settings.llm.words = words;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["thn_post_kit"]);
        assert!(cli.feed.is_none());
        assert!(cli.date.is_none());
        assert!(!cli.overwrite);
        assert!(!cli.json);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "thn_post_kit",
            "-f",
            "./feed.xml",
            "-o",
            "/tmp/kits",
            "-d",
            "2025-05-06",
            "-m",
            "3",
        ]);
        assert_eq!(cli.feed.as_deref(), Some("./feed.xml"));
        assert_eq!(cli.out, Some(PathBuf::from("/tmp/kits")));
        assert_eq!(cli.date.as_deref(), Some("2025-05-06"));
        assert_eq!(cli.max, Some(3));
    }

    #[test]
    fn test_cli_overrides_settings() {
        let cli = Cli::parse_from([
            "thn_post_kit",
            "--feed",
            "https://example.com/rss",
            "--llm",
            "deepseek",
            "--llm-input",
            "html",
            "--llm-model",
            "deepseek-reasoner",
            "--summary-words",
            "120",
        ]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.feed, "https://example.com/rss");
        assert_eq!(settings.llm.provider, LlmProvider::Deepseek);
        assert_eq!(settings.llm.input, LlmInput::Html);
        assert_eq!(settings.llm.model, "deepseek-reasoner");
        assert_eq!(settings.llm.words, 120);
    }

    #[test]
    fn test_cli_rejects_unknown_provider() {
        assert!(Cli::try_parse_from(["thn_post_kit", "--llm", "gpt"]).is_err());
    }
}
