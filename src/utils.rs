//! Text normalization and file system helpers.
//!
//! This module provides helper functions used throughout the pipeline:
//! - Markup stripping and entity decoding for short feed fragments
//! - Slug derivation for output file names
//! - Character-safe truncation for captions and logs
//! - Unique-path resolution and output directory validation

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static SLUG_DROP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SLUG_COLLAPSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]+").unwrap());

/// Image extensions kept as-is when derived from a URL.
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Strip tags from a markup fragment and decode its character entities.
///
/// Works on malformed markup since no DOM is built: every `<...>` run is
/// removed, entities are decoded, and the result is trimmed.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(strip_html("<b>A &amp; B</b>"), "A & B");
/// assert_eq!(strip_html(""), "");
/// ```
pub fn strip_html(markup: &str) -> String {
    if markup.is_empty() {
        return String::new();
    }
    let text = TAG_RE.replace_all(markup, "");
    html_escape::decode_html_entities(&text).trim().to_string()
}

/// Convert a title to a filesystem-safe slug of at most `max_length` characters.
///
/// Lowercases, drops everything outside word characters, whitespace and
/// hyphens, collapses separator runs into one hyphen and trims hyphens from
/// both ends (again after truncation).
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("Big Breach: 10M Records Exposed!", 80), "big-breach-10m-records-exposed");
/// ```
pub fn slugify(title: &str, max_length: usize) -> String {
    let lowered = title.trim().to_lowercase();
    let kept = SLUG_DROP_RE.replace_all(&lowered, "");
    let collapsed = SLUG_COLLAPSE_RE.replace_all(&kept, "-");
    let trimmed = collapsed.trim_matches('-');
    let truncated: String = trimmed.chars().take(max_length).collect();
    truncated.trim_end_matches('-').to_string()
}

/// Truncate to `max_chars` characters, appending `…` when anything was cut.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &s[..byte_idx]),
        None => s.to_string(),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at the last character boundary within `max` bytes
/// and get an ellipsis plus the number of dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Return `path` if nothing exists there, otherwise the first free
/// `<stem>-N<ext>` sibling for N = 1, 2, ...
///
/// This is a check-then-act probe; it assumes a single writer per output root.
pub fn ensure_unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut i = 1usize;
    loop {
        let candidate = path.with_file_name(format!("{stem}-{i}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

/// Where an artifact should be written under the overwrite policy.
pub fn resolve_output_path(path: &Path, overwrite: bool) -> PathBuf {
    if overwrite || !path.exists() {
        path.to_path_buf()
    } else {
        ensure_unique_path(path)
    }
}

/// Derive an image file extension (with the dot) from a URL's path.
///
/// Keeps `.jpg`, `.jpeg`, `.png` and `.webp` (case preserved); anything else
/// becomes `.jpg`.
pub fn file_ext_from_url(raw_url: &str) -> String {
    let path = match url::Url::parse(raw_url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => raw_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let decoded = urlencoding::decode(&path)
        .map(|d| d.into_owned())
        .unwrap_or(path);

    match Path::new(&decoded).extension().and_then(|e| e.to_str()) {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => {
            format!(".{ext}")
        }
        _ => ".jpg".to_string(),
    }
}

/// Render `path` relative to `root` with forward slashes.
pub fn relative_display(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and removes a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            if let Err(e) = stdfs::remove_file(&probe_path) {
                warn!(path = %probe_path.display(), error = %e, "Could not remove probe file");
            }
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
