//! Data models for feed entries and the records produced while processing them.
//!
//! This module defines the core data structures used throughout the crate:
//! - [`FeedEntry`]: One parsed RSS/Atom item, read-only input to a run
//! - [`ProcessingRecord`]: What happened to one entry (paths written, errors)
//! - [`RunResult`]: The ordered collection of records for a single run
//! - [`ItemError`]: A structured per-artifact failure
//!
//! Records and results serialize to JSON so a caller or UI can render them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A feed item as produced by the feed parser.
///
/// Only the fields the pipeline reads are kept. The publish timestamp stays
/// a raw string; parsing it is the run aggregator's job, and entries whose
/// timestamp cannot be parsed are dropped there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FeedEntry {
    /// The headline.
    pub title: String,
    /// Canonical article URL.
    pub link: String,
    /// Publish timestamp as found in the feed (RFC 2822 for RSS, RFC 3339 for Atom).
    pub published: Option<String>,
    /// Summary HTML fragment, if the feed carries one.
    pub summary: Option<String>,
    /// Description HTML fragment, used when `summary` is absent.
    pub description: Option<String>,
    /// `<enclosure>` elements attached to the item.
    pub enclosures: Vec<Enclosure>,
    /// `media:content` entries attached to the item.
    pub media_content: Vec<MediaContent>,
    /// Typed links attached to the item.
    pub links: Vec<FeedLink>,
}

impl FeedEntry {
    /// The text used for the caption summary: `summary`, else `description`.
    pub fn summary_source(&self) -> &str {
        self.summary
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or_default()
    }
}

/// An enclosure reference. Feeds disagree on whether the location lives in
/// `href` or `url`, so both are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Enclosure {
    pub href: Option<String>,
    pub url: Option<String>,
    pub mime_type: Option<String>,
}

/// A `media:content` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MediaContent {
    pub url: Option<String>,
    pub mime_type: Option<String>,
}

/// A link with an optional relation and declared type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FeedLink {
    pub href: String,
    pub rel: Option<String>,
    pub mime_type: Option<String>,
}

/// The four files a processed entry can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Raw article HTML (`<slug>.html`).
    Html,
    /// Extracted article text (`<slug>.md`).
    Md,
    /// Social-media caption (`<slug>.txt`).
    Txt,
    /// Cover image (`<slug>.jpg|jpeg|png|webp`).
    Image,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Html => "html",
            ArtifactKind::Md => "md",
            ArtifactKind::Txt => "txt",
            ArtifactKind::Image => "image",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which step of the per-entry pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorKind {
    HtmlDownload,
    Extraction,
    ImageDownload,
    Summary,
    CaptionWrite,
}

impl ItemErrorKind {
    /// Human-readable prefix used when the error is rendered.
    pub fn label(self) -> &'static str {
        match self {
            ItemErrorKind::HtmlDownload => "HTML download failed",
            ItemErrorKind::Extraction => "Extraction failed",
            ItemErrorKind::ImageDownload => "Image download failed",
            ItemErrorKind::Summary => "Summary generation failed",
            ItemErrorKind::CaptionWrite => "Caption write failed",
        }
    }
}

/// A per-entry failure: the step that failed and what went wrong.
///
/// Renders as `"<label>: <detail>"`, e.g. `"HTML download failed: HTTP status 500"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ItemError {
    pub kind: ItemErrorKind,
    pub detail: String,
}

impl ItemError {
    pub fn new(kind: ItemErrorKind, detail: impl fmt::Display) -> Self {
        Self {
            kind,
            detail: detail.to_string(),
        }
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.detail)
    }
}

/// The outcome of processing one feed entry.
///
/// A record only lists a path for an artifact that was actually written.
/// Errors are kept in the order they were encountered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProcessingRecord {
    pub title: String,
    pub link: String,
    /// Filesystem-safe identifier derived from the title.
    pub slug: String,
    /// Artifact kind to path, relative to the output root.
    pub paths: BTreeMap<ArtifactKind, String>,
    pub image_saved: bool,
    pub errors: Vec<ItemError>,
}

impl ProcessingRecord {
    pub fn new(title: impl Into<String>, link: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            slug: slug.into(),
            paths: BTreeMap::new(),
            image_saved: false,
            errors: Vec::new(),
        }
    }

    pub fn path(&self, kind: ArtifactKind) -> Option<&str> {
        self.paths.get(&kind).map(String::as_str)
    }

    /// Errors rendered as display strings, in order.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// The result of one run: where output went and what each entry produced.
///
/// The item count always equals the number of records; fields are private so
/// the two cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunResult {
    dir: PathBuf,
    items: Vec<ProcessingRecord>,
    count: usize,
}

impl RunResult {
    pub fn new(dir: PathBuf, items: Vec<ProcessingRecord>) -> Self {
        let count = items.len();
        Self { dir, items, count }
    }

    /// An empty result for a run where no entry matched.
    pub fn empty(dir: PathBuf) -> Self {
        Self::new(dir, Vec::new())
    }

    /// Absolute path of the date-partitioned output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn items(&self) -> &[ProcessingRecord] {
        &self.items
    }

    pub fn count(&self) -> usize {
        self.count
    }
}
