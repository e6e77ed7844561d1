//! Per-entry pipeline: HTML, extracted text, cover image, caption.
//!
//! [`ItemProcessor::process_entry`] never fails. Each step catches its own
//! errors, appends an [`ItemError`] to the record and lets the remaining
//! steps run. The caption is always attempted.

use crate::config::{LlmInput, Settings};
use crate::extract::extract_article_text;
use crate::feed::pick_image;
use crate::fetch::{download_html, download_to_file};
use crate::models::{ArtifactKind, FeedEntry, ItemError, ItemErrorKind, ProcessingRecord};
use crate::summarize::{NoSummarizer, Summarizer};
use crate::utils::{
    file_ext_from_url, relative_display, resolve_output_path, slugify, strip_html,
    truncate_with_ellipsis,
};
use chrono::{DateTime, FixedOffset, NaiveDate};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Maximum slug length in characters.
pub const SLUG_MAX_LEN: usize = 80;

/// Used when a title slugifies to nothing.
const FALLBACK_SLUG: &str = "untitled";

/// Knobs that shape what the processor writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOptions {
    /// Replace existing artifacts instead of writing `<slug>-N` siblings.
    pub overwrite: bool,
    /// Final line of every caption.
    pub hashtags: String,
    /// RSS summaries longer than this are cut and get an ellipsis.
    pub summary_max_chars: usize,
    /// What a configured summarizer is fed.
    pub llm_input: LlmInput,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), false)
    }
}

impl ProcessOptions {
    pub fn from_settings(settings: &Settings, overwrite: bool) -> Self {
        Self {
            overwrite,
            hashtags: settings.hashtags.clone(),
            summary_max_chars: settings.summary_max_chars,
            llm_input: settings.llm.input,
        }
    }
}

/// Where a run writes: the output root and the `YYYY/MM/DD` directory under it.
///
/// Record paths are reported relative to `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayLayout {
    pub root: PathBuf,
    pub day_dir: PathBuf,
}

impl DayLayout {
    pub fn new(root: impl Into<PathBuf>, date: NaiveDate) -> Self {
        let root = root.into();
        let day_dir = root.join(date.format("%Y/%m/%d").to_string());
        Self { root, day_dir }
    }

    fn artifact(&self, slug: &str, ext: &str) -> PathBuf {
        self.day_dir.join(format!("{slug}{ext}"))
    }
}

/// Build the caption text: title, summary, link and hashtags separated by
/// blank lines, with a trailing newline.
///
/// # Examples
///
/// ```ignore
/// let caption = build_caption("T", "S", "https://x", "#a");
/// assert_eq!(caption, "T\n\nS\n\nhttps://x\n\n#a\n");
/// ```
pub fn build_caption(title: &str, summary: &str, link: &str, hashtags: &str) -> String {
    format!("{title}\n\n{summary}\n\n{link}\n\n{hashtags}\n")
}

/// Runs the per-entry pipeline with a shared HTTP client.
pub struct ItemProcessor<S = NoSummarizer> {
    client: Client,
    options: ProcessOptions,
    summarizer: Option<S>,
}

impl ItemProcessor<NoSummarizer> {
    /// A processor whose captions always use the RSS summary.
    pub fn new(client: Client, options: ProcessOptions) -> Self {
        Self {
            client,
            options,
            summarizer: None,
        }
    }
}

impl<S: Summarizer> ItemProcessor<S> {
    /// A processor that asks `summarizer` for caption text first.
    pub fn with_summarizer(client: Client, options: ProcessOptions, summarizer: S) -> Self {
        Self {
            client,
            options,
            summarizer: Some(summarizer),
        }
    }

    /// Process one entry into up to four artifacts under `layout.day_dir`.
    ///
    /// # Arguments
    ///
    /// * `entry` - The feed entry to process
    /// * `published` - Its publish time in the run's timezone
    /// * `layout` - Output root and day directory (which must already exist)
    ///
    /// # Returns
    ///
    /// A record listing every artifact actually written (paths relative to
    /// the output root) and every failure, in the order encountered.
    #[instrument(level = "info", skip_all, fields(title = %entry.title.trim()))]
    pub async fn process_entry(
        &self,
        entry: &FeedEntry,
        published: DateTime<FixedOffset>,
        layout: &DayLayout,
    ) -> ProcessingRecord {
        let title = entry.title.trim();
        let link = entry.link.trim();
        let slug = match slugify(title, SLUG_MAX_LEN) {
            s if s.is_empty() => FALLBACK_SLUG.to_string(),
            s => s,
        };
        debug!(%slug, %published, "Processing entry");

        let mut record = ProcessingRecord::new(title, link, &slug);

        // HTML; a failed write still leaves the body for the later steps
        let raw_html = match download_html(&self.client, link).await {
            Ok(html) => {
                match self
                    .write_artifact(&layout.artifact(&slug, ".html"), &html, layout)
                    .await
                {
                    Ok(path) => {
                        record.paths.insert(ArtifactKind::Html, path);
                    }
                    Err(detail) => {
                        let e = ItemError::new(ItemErrorKind::HtmlDownload, detail);
                        warn!(error = %e, "HTML write failed");
                        record.errors.push(e);
                    }
                }
                Some(html)
            }
            Err(e) => {
                let e = ItemError::new(ItemErrorKind::HtmlDownload, e);
                warn!(error = %e, "HTML step failed");
                record.errors.push(e);
                None
            }
        };

        // Extracted text
        let mut extracted = None;
        if let Some(html) = raw_html.as_deref() {
            match self.save_extracted(html, link, &slug, layout).await {
                Ok((text, path)) => {
                    record.paths.insert(ArtifactKind::Md, path);
                    extracted = Some(text);
                }
                Err(e) => {
                    warn!(error = %e, "Extraction step failed");
                    record.errors.push(e);
                }
            }
        }

        // Image; no candidate URL is not an error
        if let Some(image_url) = pick_image(entry) {
            match self.save_image(&image_url, &slug, layout).await {
                Ok(path) => {
                    record.paths.insert(ArtifactKind::Image, path);
                    record.image_saved = true;
                }
                Err(e) => {
                    warn!(error = %e, %image_url, "Image step failed");
                    record.errors.push(e);
                }
            }
        } else {
            debug!("No image candidate");
        }

        // Caption
        let summary = match self
            .llm_summary(entry, title, link, raw_html.as_deref(), extracted.as_deref())
            .await
        {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                warn!(error = %e, "Summarizer failed; using feed summary");
                record.errors.push(e);
                self.feed_summary(entry)
            }
            None => self.feed_summary(entry),
        };
        let caption = build_caption(title, &summary, link, &self.options.hashtags);
        match self
            .write_artifact(&layout.artifact(&slug, ".txt"), &caption, layout)
            .await
        {
            Ok(path) => {
                record.paths.insert(ArtifactKind::Txt, path);
            }
            Err(detail) => {
                let e = ItemError::new(ItemErrorKind::CaptionWrite, detail);
                warn!(error = %e, "Caption step failed");
                record.errors.push(e);
            }
        }

        info!(
            %slug,
            artifacts = record.paths.len(),
            errors = record.errors.len(),
            "Entry processed"
        );
        record
    }

    async fn save_extracted(
        &self,
        html: &str,
        link: &str,
        slug: &str,
        layout: &DayLayout,
    ) -> Result<(String, String), ItemError> {
        let fail = |detail: String| ItemError::new(ItemErrorKind::Extraction, detail);
        let url = Some(link).filter(|l| !l.is_empty());
        let text = extract_article_text(html, url).map_err(|e| fail(e.to_string()))?;
        let path = self
            .write_artifact(&layout.artifact(slug, ".md"), &text, layout)
            .await
            .map_err(fail)?;
        Ok((text, path))
    }

    async fn save_image(
        &self,
        image_url: &str,
        slug: &str,
        layout: &DayLayout,
    ) -> Result<String, ItemError> {
        let ext = file_ext_from_url(image_url);
        let target = resolve_output_path(&layout.artifact(slug, &ext), self.options.overwrite);
        let bytes = download_to_file(&self.client, image_url, &target)
            .await
            .map_err(|e| ItemError::new(ItemErrorKind::ImageDownload, e))?;
        debug!(bytes, path = %target.display(), "Image saved");
        Ok(relative_display(&target, &layout.root))
    }

    /// Ask the summarizer, if one is configured.
    async fn llm_summary(
        &self,
        entry: &FeedEntry,
        title: &str,
        link: &str,
        raw_html: Option<&str>,
        extracted: Option<&str>,
    ) -> Option<Result<String, ItemError>> {
        let summarizer = self.summarizer.as_ref()?;
        let input = llm_input(entry, link, self.options.llm_input, raw_html, extracted);
        let result = summarizer
            .summarize(title, &input)
            .await
            .map_err(|e| ItemError::new(ItemErrorKind::Summary, e));
        Some(result)
    }

    fn feed_summary(&self, entry: &FeedEntry) -> String {
        truncate_with_ellipsis(
            &strip_html(entry.summary_source()),
            self.options.summary_max_chars,
        )
    }

    /// Write UTF-8 text under the overwrite policy and return the path
    /// relative to the output root.
    async fn write_artifact(
        &self,
        path: &Path,
        contents: &str,
        layout: &DayLayout,
    ) -> Result<String, String> {
        let target = resolve_output_path(path, self.options.overwrite);
        tokio::fs::write(&target, contents)
            .await
            .map_err(|e| format!("{}: {e}", target.display()))?;
        Ok(relative_display(&target, &layout.root))
    }
}

/// Pick the summarizer input: raw HTML in html mode, else extracted text,
/// else the stripped summary, description or finally the link.
fn llm_input(
    entry: &FeedEntry,
    link: &str,
    mode: LlmInput,
    raw_html: Option<&str>,
    extracted: Option<&str>,
) -> String {
    let non_empty = |s: &&str| !s.trim().is_empty();
    if mode == LlmInput::Html {
        if let Some(html) = raw_html.filter(non_empty) {
            return html.to_string();
        }
    }
    if let Some(text) = extracted.filter(non_empty) {
        return text.to_string();
    }
    [entry.summary.as_deref(), entry.description.as_deref()]
        .into_iter()
        .flatten()
        .map(strip_html)
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| link.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::build_client;
    use crate::models::Enclosure;
    use crate::summarize::SummarizeError;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> Client {
        build_client("thn-post-kit-test/1.0", Duration::from_secs(5)).unwrap()
    }

    fn published() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2025-05-06T10:00:00+05:30").unwrap()
    }

    fn layout(root: &Path) -> DayLayout {
        let layout = DayLayout::new(root, NaiveDate::from_ymd_opt(2025, 5, 6).unwrap());
        std::fs::create_dir_all(&layout.day_dir).unwrap();
        layout
    }

    struct Canned {
        reply: Result<String, ()>,
        seen: Mutex<Vec<String>>,
    }

    impl Summarizer for Canned {
        async fn summarize(&self, _title: &str, content: &str) -> Result<String, SummarizeError> {
            self.seen.lock().unwrap().push(content.to_string());
            self.reply
                .clone()
                .map_err(|_| SummarizeError::Fatal("model refused".into()))
        }
    }

    #[test]
    fn test_build_caption_layout() {
        assert_eq!(
            build_caption("Title", "Summary", "https://x", "#a #b"),
            "Title\n\nSummary\n\nhttps://x\n\n#a #b\n"
        );
    }

    #[test]
    fn test_day_layout() {
        let layout = DayLayout::new("/out", NaiveDate::from_ymd_opt(2025, 1, 9).unwrap());
        assert_eq!(layout.day_dir, PathBuf::from("/out/2025/01/09"));
        assert_eq!(
            layout.artifact("a-b", ".png"),
            PathBuf::from("/out/2025/01/09/a-b.png")
        );
    }

    #[test]
    fn test_llm_input_precedence() {
        let entry = FeedEntry {
            summary: Some("<p>rss summary</p>".into()),
            description: Some("desc".into()),
            ..Default::default()
        };
        let l = "https://x";
        assert_eq!(
            llm_input(&entry, l, LlmInput::Html, Some("<html/>"), Some("text")),
            "<html/>"
        );
        assert_eq!(
            llm_input(&entry, l, LlmInput::Text, Some("<html/>"), Some("text")),
            "text"
        );
        assert_eq!(llm_input(&entry, l, LlmInput::Html, None, None), "rss summary");
        let bare = FeedEntry {
            description: Some("<b>d</b>".into()),
            ..Default::default()
        };
        assert_eq!(llm_input(&bare, l, LlmInput::Text, None, Some("  ")), "d");
        assert_eq!(llm_input(&FeedEntry::default(), l, LlmInput::Text, None, None), l);
    }

    #[tokio::test]
    async fn test_untitled_slug_and_caption_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        let entry = FeedEntry {
            title: "!!!".into(),
            link: format!("{}/a", server.uri()),
            summary: Some("x".repeat(1000)),
            ..Default::default()
        };
        let processor = ItemProcessor::new(client(), ProcessOptions::default());
        let record = processor.process_entry(&entry, published(), &layout).await;

        assert_eq!(record.slug, "untitled");
        assert_eq!(record.path(ArtifactKind::Txt), Some("2025/05/06/untitled.txt"));
        assert!(record.path(ArtifactKind::Html).is_none());
        assert!(!record.image_saved);
        assert_eq!(record.errors.len(), 1);
        assert_eq!(record.errors[0].kind, ItemErrorKind::HtmlDownload);

        let caption = std::fs::read_to_string(layout.day_dir.join("untitled.txt")).unwrap();
        let summary = caption.split("\n\n").nth(1).unwrap();
        assert_eq!(summary.chars().count(), 901);
        assert!(summary.ends_with('…'));
    }

    #[tokio::test]
    async fn test_image_failure_recorded_after_html_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body><p>hi</p></body></html>"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cover.webp"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        let entry = FeedEntry {
            title: "Patch Now".into(),
            link: format!("{}/article", server.uri()),
            enclosures: vec![Enclosure {
                url: Some(format!("{}/cover.webp", server.uri())),
                mime_type: Some("image/webp".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let processor = ItemProcessor::new(client(), ProcessOptions::default());
        let record = processor.process_entry(&entry, published(), &layout).await;

        assert_eq!(record.path(ArtifactKind::Html), Some("2025/05/06/patch-now.html"));
        assert_eq!(record.path(ArtifactKind::Md), Some("2025/05/06/patch-now.md"));
        assert!(record.path(ArtifactKind::Image).is_none());
        assert!(!layout.day_dir.join("patch-now.webp").exists());
        assert_eq!(
            record.error_messages(),
            vec!["Image download failed: HTTP status 500 Internal Server Error".to_string()]
        );
        let md = std::fs::read_to_string(layout.day_dir.join("patch-now.md")).unwrap();
        assert_eq!(md, "hi");
    }

    #[tokio::test]
    async fn test_summarizer_output_used_for_caption() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        let entry = FeedEntry {
            title: "Zero Day".into(),
            link: format!("{}/z", server.uri()),
            summary: Some("<p>feed text</p>".into()),
            ..Default::default()
        };
        let summarizer = Canned {
            reply: Ok("model text".into()),
            seen: Mutex::new(Vec::new()),
        };
        let processor =
            ItemProcessor::with_summarizer(client(), ProcessOptions::default(), summarizer);
        let record = processor.process_entry(&entry, published(), &layout).await;

        let caption = std::fs::read_to_string(layout.day_dir.join("zero-day.txt")).unwrap();
        assert!(caption.starts_with("Zero Day\n\nmodel text\n\n"));
        assert_eq!(record.errors.len(), 1);
        assert_eq!(
            processor.summarizer.as_ref().unwrap().seen.lock().unwrap()[0],
            "feed text"
        );
    }

    #[tokio::test]
    async fn test_summarizer_failure_falls_back_to_feed_summary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        let entry = FeedEntry {
            title: "Zero Day".into(),
            link: format!("{}/z", server.uri()),
            summary: Some("<p>feed text</p>".into()),
            ..Default::default()
        };
        let summarizer = Canned {
            reply: Err(()),
            seen: Mutex::new(Vec::new()),
        };
        let processor =
            ItemProcessor::with_summarizer(client(), ProcessOptions::default(), summarizer);
        let record = processor.process_entry(&entry, published(), &layout).await;

        let caption = std::fs::read_to_string(layout.day_dir.join("zero-day.txt")).unwrap();
        assert!(caption.starts_with("Zero Day\n\nfeed text\n\n"));
        let kinds: Vec<_> = record.errors.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ItemErrorKind::HtmlDownload, ItemErrorKind::Summary]);
        assert_eq!(
            record.errors[1].to_string(),
            "Summary generation failed: model refused"
        );
    }

    #[tokio::test]
    async fn test_html_write_failure_still_extracts() {
        let server = MockServer::start().await;
        let body = "Threat actors exploited an unpatched gateway. ".repeat(14);
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<html><body><article><p>{body}</p></article></body></html>"
            )))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        std::fs::create_dir(layout.day_dir.join("story.html")).unwrap();
        let entry = FeedEntry {
            title: "Story".into(),
            link: format!("{}/story", server.uri()),
            ..Default::default()
        };
        let options = ProcessOptions {
            overwrite: true,
            ..Default::default()
        };
        let record = ItemProcessor::new(client(), options)
            .process_entry(&entry, published(), &layout)
            .await;

        assert!(record.path(ArtifactKind::Html).is_none());
        assert_eq!(record.path(ArtifactKind::Md), Some("2025/05/06/story.md"));
        assert_eq!(record.path(ArtifactKind::Txt), Some("2025/05/06/story.txt"));
        assert_eq!(record.errors.len(), 1);
        assert_eq!(record.errors[0].kind, ItemErrorKind::HtmlDownload);
        let md = std::fs::read_to_string(layout.day_dir.join("story.md")).unwrap();
        assert!(md.starts_with("Threat actors exploited"));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_existing_caption() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        std::fs::write(layout.day_dir.join("same.txt"), "old").unwrap();
        let entry = FeedEntry {
            title: "Same".into(),
            link: format!("{}/s", server.uri()),
            ..Default::default()
        };
        let options = ProcessOptions {
            overwrite: true,
            ..Default::default()
        };
        let record = ItemProcessor::new(client(), options)
            .process_entry(&entry, published(), &layout)
            .await;

        assert_eq!(record.path(ArtifactKind::Txt), Some("2025/05/06/same.txt"));
        assert!(!layout.day_dir.join("same-1.txt").exists());
        let caption = std::fs::read_to_string(layout.day_dir.join("same.txt")).unwrap();
        assert_eq!(
            caption,
            format!(
                "Same\n\n\n\n{}/s\n\n#cybersecurity #infosec #TheHackerNews\n",
                server.uri()
            )
        );
    }
}
