//! # THN Post Kit
//!
//! Builds a day's social-media post kits from a news feed.
//!
//! ## Usage
//!
//! ```sh
//! thn_post_kit --date 2025-05-06 --out ./THN
//! ```
//!
//! ## Flow
//!
//! 1. **Setup**: settings from YAML and flags, target date, optional LLM
//! 2. **Feed**: load and parse the feed (allow-list checked first)
//! 3. **Run**: filter to the target day and process each entry in order
//! 4. **Output**: text report or JSON on stdout

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use thn_post_kit::cli::Cli;
use thn_post_kit::config::Settings;
use thn_post_kit::feed::{SourcePolicy, load_feed};
use thn_post_kit::fetch::build_client;
use thn_post_kit::processor::{ItemProcessor, ProcessOptions};
use thn_post_kit::report::render_report;
use thn_post_kit::runner::{RunParams, parse_target_date, run, today_in};
use thn_post_kit::summarize::{ChatCompletionsSummarizer, RetrySummarizer};
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("thn_post_kit starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // ---- Settings and run parameters (no I/O past this point on failure) ----
    let mut settings = Settings::load(args.config.as_deref()).inspect_err(|e| {
        error!(error = %e, "Failed to load settings");
    })?;
    args.apply(&mut settings);

    let timezone = settings.utc_offset()?;
    let target_date = match args.date.as_deref() {
        Some(raw) => parse_target_date(raw).inspect_err(|e| error!(error = %e, "Bad --date"))?,
        None => today_in(timezone),
    };
    info!(%target_date, %timezone, feed = %settings.feed, "Run parameters resolved");

    let summarizer = if settings.llm.enabled() {
        let inner = ChatCompletionsSummarizer::from_settings(&settings.llm)
            .inspect_err(|e| error!(error = %e, "LLM summarizer unavailable"))?;
        info!(
            provider = %settings.llm.provider,
            model = %settings.llm.model,
            "LLM captions enabled"
        );
        Some(RetrySummarizer::new(
            inner,
            settings.llm.max_retries,
            Duration::from_secs(1),
        ))
    } else {
        None
    };

    // ---- Feed ----
    let client = build_client(&settings.user_agent, settings.request_timeout())?;
    let policy = SourcePolicy::new(&settings.allowed_feed_hosts);
    let entries = load_feed(&settings.feed, &client, &policy)
        .await
        .inspect_err(|e| error!(error = %e, "Failed to load feed"))?;

    // ---- Run ----
    let params = RunParams {
        target_date,
        output_root: settings.output_dir.clone(),
        max_items: args.max,
        timezone,
    };
    let options = ProcessOptions::from_settings(&settings, args.overwrite);
    let result = match summarizer {
        Some(summarizer) => {
            let processor = ItemProcessor::with_summarizer(client, options, summarizer);
            run(&entries, &params, &processor).await?
        }
        None => run(&entries, &params, &ItemProcessor::new(client, options)).await?,
    };

    // ---- Output ----
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_report(&result, target_date));
    }

    let failed = result
        .items()
        .iter()
        .filter(|r| !r.errors.is_empty())
        .count();
    info!(
        items = result.count(),
        with_errors = failed,
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "thn_post_kit finished"
    );
    Ok(())
}
