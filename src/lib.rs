//! # THN Post Kit
//!
//! Turns a day's worth of news feed items into ready-to-post "kits" on disk:
//! the raw article HTML, the extracted article text, a cover image and a
//! social-media caption, laid out as `<root>/YYYY/MM/DD/<slug>.*`.
//!
//! ## Pipeline
//!
//! 1. **Feed**: load RSS/Atom from a URL or file ([`feed::load_feed`])
//! 2. **Selection**: keep entries published on the target day in a fixed
//!    timezone, newest first ([`runner::select_entries`])
//! 3. **Processing**: per entry, download, extract, fetch the image and write
//!    the caption, recording failures instead of aborting
//!    ([`processor::ItemProcessor`])
//! 4. **Report**: a [`RunResult`] that renders to the console or JSON
//!
//! ```ignore
//! let client = fetch::build_client(config::DEFAULT_USER_AGENT, Duration::from_secs(45))?;
//! let entries = feed::load_feed(config::DEFAULT_FEED, &client, &SourcePolicy::default()).await?;
//! let processor = ItemProcessor::new(client, ProcessOptions::default());
//! let result = runner::run(&entries, &params, &processor).await?;
//! println!("{}", report::render_report(&result, params.target_date));
//! ```

pub mod cli;
pub mod config;
pub mod extract;
pub mod feed;
pub mod fetch;
pub mod models;
pub mod processor;
pub mod report;
pub mod runner;
pub mod summarize;
pub mod utils;

pub use config::Settings;
pub use extract::{Extraction, Strategy, extract_article_text};
pub use feed::{SourcePolicy, load_feed, pick_image};
pub use models::{ArtifactKind, FeedEntry, ItemError, ItemErrorKind, ProcessingRecord, RunResult};
pub use processor::{DayLayout, ItemProcessor, ProcessOptions, build_caption};
pub use runner::{RunError, RunParams, parse_publish_time, run};
pub use summarize::{ChatCompletionsSummarizer, NoSummarizer, RetrySummarizer, Summarizer};
pub use utils::{slugify, strip_html};
