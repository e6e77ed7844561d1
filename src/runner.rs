//! Run aggregation: date filtering, ordering, and sequential processing.
//!
//! A run keeps only the entries published on the target calendar day (in a
//! fixed timezone), newest first, optionally capped, and hands each one to
//! the [`ItemProcessor`] in turn.

use crate::config::ConfigError;
use crate::feed::FeedError;
use crate::models::{FeedEntry, RunResult};
use crate::processor::{DayLayout, ItemProcessor};
use crate::summarize::Summarizer;
use crate::utils::ensure_writable_dir;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors that stop a run before any entry is processed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid target date `{0}` (expected YYYY-MM-DD)")]
    InvalidDate(String),
    #[error("cannot prepare output directory {}: {reason}", path.display())]
    OutputDir { path: PathBuf, reason: String },
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Parameters of a single run.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub target_date: NaiveDate,
    pub output_root: PathBuf,
    pub max_items: Option<usize>,
    pub timezone: FixedOffset,
}

/// Parse a `YYYY-MM-DD` target date.
pub fn parse_target_date(raw: &str) -> Result<NaiveDate, RunError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| RunError::InvalidDate(raw.to_string()))
}

/// Today's date in `timezone`.
pub fn today_in(timezone: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&timezone).date_naive()
}

/// Parse a feed timestamp.
///
/// Accepts RFC 2822 (RSS), RFC 3339 (Atom) and RFC 2822 without a zone,
/// which is read as UTC. Returns `None` for anything else.
pub fn parse_publish_time(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    ["%a, %d %b %Y %H:%M:%S", "%d %b %Y %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Keep entries published on `target_date` in `timezone`, newest first,
/// truncated to `max_items`. A cap of zero means no cap.
///
/// Entries without a parseable timestamp are dropped silently. Entries with
/// equal timestamps keep their feed order.
pub fn select_entries(
    entries: &[FeedEntry],
    target_date: NaiveDate,
    timezone: FixedOffset,
    max_items: Option<usize>,
) -> Vec<(DateTime<FixedOffset>, &FeedEntry)> {
    let mut selected: Vec<_> = entries
        .iter()
        .filter_map(|entry| {
            let published = entry.published.as_deref().and_then(parse_publish_time)?;
            let local = published.with_timezone(&timezone);
            (local.date_naive() == target_date).then_some((local, entry))
        })
        .collect();

    selected.sort_by(|a, b| b.0.cmp(&a.0));
    if let Some(max) = max_items.filter(|&m| m > 0) {
        selected.truncate(max);
    }
    selected
}

/// Run the pipeline over `entries` for one target day.
///
/// The day directory is created first, even when nothing matches. With no
/// matching entries the result is empty and no request is made.
///
/// # Errors
///
/// Only a failure to prepare the output directory is fatal; per-entry
/// failures are recorded on the entry's record.
#[instrument(level = "info", skip_all, fields(date = %params.target_date))]
pub async fn run<S: Summarizer>(
    entries: &[FeedEntry],
    params: &RunParams,
    processor: &ItemProcessor<S>,
) -> Result<RunResult, RunError> {
    let layout = DayLayout::new(&params.output_root, params.target_date);
    ensure_writable_dir(&layout.day_dir)
        .await
        .map_err(|e| RunError::OutputDir {
            path: layout.day_dir.clone(),
            reason: e.to_string(),
        })?;
    let dir = std::fs::canonicalize(&layout.day_dir).map_err(|e| RunError::OutputDir {
        path: layout.day_dir.clone(),
        reason: e.to_string(),
    })?;

    let selected = select_entries(entries, params.target_date, params.timezone, params.max_items);
    info!(
        total = entries.len(),
        selected = selected.len(),
        dir = %dir.display(),
        "Entries selected"
    );
    if selected.is_empty() {
        return Ok(RunResult::empty(dir));
    }

    let layout = &layout;
    let records = stream::iter(selected)
        .then(move |(published, entry)| {
            debug!(%published, title = %entry.title, "Queued entry");
            processor.process_entry(entry, published, layout)
        })
        .collect::<Vec<_>>()
        .await;

    Ok(RunResult::new(dir, records))
}
