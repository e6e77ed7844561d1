//! Feed loading and mapping into [`FeedEntry`] values.
//!
//! A feed source is either a local XML file or an `http(s)` URL. URLs are
//! checked against the configured host allow-list before any request goes
//! out. The body is parsed as RSS 2.0 first and as Atom if that fails.

use crate::models::{Enclosure, FeedEntry, FeedLink, MediaContent};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed source `{0}` is neither an existing file nor an http(s) URL")]
    InvalidSource(String),
    #[error("feed host `{0}` is not in the allow-list")]
    DisallowedHost(String),
    #[error("failed to read feed file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch feed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("feed is neither RSS nor Atom: {0}")]
    Parse(String),
}

/// Where a feed comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    File(PathBuf),
    Remote(Url),
}

impl FeedSource {
    /// An existing path wins over URL interpretation.
    pub fn resolve(raw: &str) -> Result<Self, FeedError> {
        let raw = raw.trim();
        let path = Path::new(raw);
        if path.is_file() {
            return Ok(FeedSource::File(path.to_path_buf()));
        }
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(FeedSource::Remote(url)),
            _ => Err(FeedError::InvalidSource(raw.to_string())),
        }
    }
}

/// Which remote hosts a feed may be fetched from. Local files are always allowed.
#[derive(Debug, Clone, Default)]
pub struct SourcePolicy {
    allowed_hosts: Vec<String>,
}

impl SourcePolicy {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn check(&self, source: &FeedSource) -> Result<(), FeedError> {
        let FeedSource::Remote(url) = source else {
            return Ok(());
        };
        if self.allowed_hosts.is_empty() {
            return Ok(());
        }
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if self.allowed_hosts.iter().any(|allowed| *allowed == host) {
            Ok(())
        } else {
            Err(FeedError::DisallowedHost(host))
        }
    }
}

/// Resolve, vet, read and parse a feed.
#[instrument(level = "info", skip(client, policy))]
pub async fn load_feed(
    source: &str,
    client: &reqwest::Client,
    policy: &SourcePolicy,
) -> Result<Vec<FeedEntry>, FeedError> {
    let source = FeedSource::resolve(source)?;
    policy.check(&source)?;

    let bytes = match &source {
        FeedSource::File(path) => tokio::fs::read(path).await.map_err(|e| FeedError::Io {
            path: path.clone(),
            source: e,
        })?,
        FeedSource::Remote(url) => client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?
            .to_vec(),
    };

    let entries = parse_feed(&bytes)?;
    info!(count = entries.len(), "Loaded feed entries");
    Ok(entries)
}

/// Parse RSS or Atom bytes into entries.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedEntry>, FeedError> {
    let rss_err = match rss::Channel::read_from(bytes) {
        Ok(channel) => return Ok(channel.items().iter().map(rss_entry).collect()),
        Err(e) => e,
    };
    match atom_syndication::Feed::read_from(bytes) {
        Ok(feed) => Ok(feed.entries().iter().map(atom_entry).collect()),
        Err(atom_err) => {
            debug!(%rss_err, %atom_err, "Feed parse failed");
            Err(FeedError::Parse(format!("rss: {rss_err}; atom: {atom_err}")))
        }
    }
}

fn rss_entry(item: &rss::Item) -> FeedEntry {
    let link = item.link().unwrap_or_default().trim().to_string();
    let published = item
        .pub_date()
        .map(str::to_string)
        .or_else(|| item.dublin_core_ext().and_then(|dc| dc.dates().first().cloned()));

    let enclosures = item
        .enclosure()
        .map(|enc| Enclosure {
            href: None,
            url: Some(enc.url().to_string()),
            mime_type: Some(enc.mime_type().to_string()).filter(|t| !t.is_empty()),
        })
        .into_iter()
        .collect();

    let links = if link.is_empty() {
        Vec::new()
    } else {
        vec![FeedLink {
            href: link.clone(),
            rel: Some("alternate".to_string()),
            mime_type: None,
        }]
    };

    FeedEntry {
        title: item.title().unwrap_or_default().trim().to_string(),
        link,
        published,
        summary: item.description().map(str::to_string),
        description: None,
        enclosures,
        media_content: media_content(item.extensions()),
        links,
    }
}

fn atom_entry(entry: &atom_syndication::Entry) -> FeedEntry {
    let link = entry
        .links()
        .iter()
        .find(|l| l.rel() == "alternate")
        .or_else(|| entry.links().first())
        .map(|l| l.href().trim().to_string())
        .unwrap_or_default();

    let published = entry.published().unwrap_or(entry.updated()).to_rfc3339();

    let links: Vec<FeedLink> = entry
        .links()
        .iter()
        .map(|l| FeedLink {
            href: l.href().to_string(),
            rel: Some(l.rel().to_string()),
            mime_type: l.mime_type().map(str::to_string),
        })
        .collect();

    let enclosures = links
        .iter()
        .filter(|l| l.rel.as_deref() == Some("enclosure"))
        .map(|l| Enclosure {
            href: Some(l.href.clone()),
            url: None,
            mime_type: l.mime_type.clone(),
        })
        .collect();

    let content = entry.content().and_then(|c| c.value()).map(str::to_string);

    FeedEntry {
        title: entry.title().value.trim().to_string(),
        link,
        published: Some(published),
        summary: entry.summary().map(|s| s.value.clone()),
        description: content,
        enclosures,
        media_content: media_content(entry.extensions()),
        links,
    }
}

/// Collect `media:content` entries, including those nested in `media:group`.
///
/// RSS and Atom each ship their own extension type; both expose element
/// attributes and children the same way, so this reads them through a
/// small shim trait.
fn media_content<E: MediaExtension>(
    extensions: &BTreeMap<String, BTreeMap<String, Vec<E>>>,
) -> Vec<MediaContent> {
    let Some(media) = extensions.get("media") else {
        return Vec::new();
    };

    let direct = media.get("content").into_iter().flatten();
    let grouped = media
        .get("group")
        .into_iter()
        .flatten()
        .flat_map(|group| group.child("content").iter());

    direct
        .chain(grouped)
        .map(|ext| MediaContent {
            url: ext.attr("url").map(str::to_string),
            mime_type: ext.attr("type").map(str::to_string),
        })
        .collect()
}

trait MediaExtension: Sized {
    fn attr(&self, name: &str) -> Option<&str>;
    fn child(&self, name: &str) -> &[Self];
}

impl MediaExtension for rss::extension::Extension {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs().get(name).map(String::as_str)
    }

    fn child(&self, name: &str) -> &[Self] {
        self.children().get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

impl MediaExtension for atom_syndication::extension::Extension {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs().get(name).map(String::as_str)
    }

    fn child(&self, name: &str) -> &[Self] {
        self.children().get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Pick a cover image URL for an entry.
///
/// Precedence: the first enclosure typed `image/*` (its `href`, else `url`),
/// then the first `media:content` with a URL, then the first
/// `rel="enclosure"` link typed `image/*`. No candidate is not an error.
pub fn pick_image(entry: &FeedEntry) -> Option<String> {
    let is_image = |mime: &Option<String>| {
        mime.as_deref()
            .is_some_and(|t| t.starts_with("image/"))
    };

    if let Some(enc) = entry.enclosures.iter().find(|e| is_image(&e.mime_type)) {
        let url = enc.href.clone().or_else(|| enc.url.clone());
        if url.is_none() {
            warn!(title = %entry.title, "Image enclosure has no location");
        }
        return url;
    }

    if let Some(url) = entry.media_content.iter().find_map(|m| m.url.clone()) {
        return Some(url);
    }

    entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("enclosure") && is_image(&l.mime_type))
        .map(|l| l.href.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>The Hacker News</title>
    <link>https://thehackernews.com</link>
    <description>Security news</description>
    <item>
      <title> Big Breach: 10M Records Exposed! </title>
      <link>https://thehackernews.com/2025/05/big-breach.html</link>
      <pubDate>Tue, 06 May 2025 10:15:00 +0530</pubDate>
      <description><![CDATA[<p>Attackers stole data.</p>]]></description>
      <enclosure url="https://cdn.example.com/img/breach.png" length="1234" type="image/png"/>
    </item>
    <item>
      <title>No date here</title>
      <link>https://thehackernews.com/2025/05/undated.html</link>
      <media:content url="https://cdn.example.com/img/undated.webp" medium="image"/>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example</title>
  <id>urn:example</id>
  <updated>2025-05-06T09:00:00Z</updated>
  <entry>
    <title>Atom story</title>
    <id>urn:example:1</id>
    <link rel="alternate" href="https://example.com/story"/>
    <link rel="enclosure" type="image/jpeg" href="https://example.com/cover.jpg"/>
    <published>2025-05-06T08:30:00+00:00</published>
    <updated>2025-05-06T09:00:00+00:00</updated>
    <summary>Short &lt;b&gt;summary&lt;/b&gt;</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_items() {
        let entries = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.title, "Big Breach: 10M Records Exposed!");
        assert_eq!(first.link, "https://thehackernews.com/2025/05/big-breach.html");
        assert_eq!(first.published.as_deref(), Some("Tue, 06 May 2025 10:15:00 +0530"));
        assert_eq!(first.summary.as_deref(), Some("<p>Attackers stole data.</p>"));
        assert_eq!(
            pick_image(first).as_deref(),
            Some("https://cdn.example.com/img/breach.png")
        );

        let second = &entries[1];
        assert_eq!(second.published, None);
        assert_eq!(
            pick_image(second).as_deref(),
            Some("https://cdn.example.com/img/undated.webp")
        );
    }

    #[test]
    fn test_parse_atom_entries() {
        let entries = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.title, "Atom story");
        assert_eq!(entry.link, "https://example.com/story");
        assert_eq!(entry.published.as_deref(), Some("2025-05-06T08:30:00+00:00"));
        assert_eq!(
            pick_image(entry).as_deref(),
            Some("https://example.com/cover.jpg")
        );
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(matches!(
            parse_feed(b"this is not xml"),
            Err(FeedError::Parse(_))
        ));
    }

    #[test]
    fn test_pick_image_precedence() {
        let entry = FeedEntry {
            enclosures: vec![
                Enclosure {
                    url: Some("https://x/audio.mp3".into()),
                    mime_type: Some("audio/mpeg".into()),
                    ..Default::default()
                },
                Enclosure {
                    href: Some("https://x/href.png".into()),
                    url: Some("https://x/url.png".into()),
                    mime_type: Some("image/png".into()),
                },
            ],
            media_content: vec![MediaContent {
                url: Some("https://x/media.jpg".into()),
                mime_type: None,
            }],
            ..Default::default()
        };
        assert_eq!(pick_image(&entry).as_deref(), Some("https://x/href.png"));

        let entry = FeedEntry {
            media_content: vec![
                MediaContent::default(),
                MediaContent {
                    url: Some("https://x/media.jpg".into()),
                    mime_type: None,
                },
            ],
            links: vec![FeedLink {
                href: "https://x/link.png".into(),
                rel: Some("enclosure".into()),
                mime_type: Some("image/png".into()),
            }],
            ..Default::default()
        };
        assert_eq!(pick_image(&entry).as_deref(), Some("https://x/media.jpg"));

        let entry = FeedEntry {
            links: vec![
                FeedLink {
                    href: "https://x/page".into(),
                    rel: Some("alternate".into()),
                    mime_type: Some("text/html".into()),
                },
                FeedLink {
                    href: "https://x/link.png".into(),
                    rel: Some("enclosure".into()),
                    mime_type: Some("image/png".into()),
                },
            ],
            ..Default::default()
        };
        assert_eq!(pick_image(&entry).as_deref(), Some("https://x/link.png"));
        assert_eq!(pick_image(&FeedEntry::default()), None);
    }

    #[test]
    fn test_source_policy() {
        let policy = SourcePolicy::new(["feeds.feedburner.com"]);
        let ok = FeedSource::Remote(Url::parse("https://feeds.feedburner.com/x").unwrap());
        let bad = FeedSource::Remote(Url::parse("https://evil.example/x").unwrap());
        assert!(policy.check(&ok).is_ok());
        assert!(matches!(
            policy.check(&bad),
            Err(FeedError::DisallowedHost(h)) if h == "evil.example"
        ));
        assert!(policy.check(&FeedSource::File(PathBuf::from("feed.xml"))).is_ok());
        assert!(SourcePolicy::default().check(&bad).is_ok());
    }

    #[test]
    fn test_resolve_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("feed.xml");
        std::fs::write(&file, RSS).unwrap();

        assert_eq!(
            FeedSource::resolve(file.to_str().unwrap()).unwrap(),
            FeedSource::File(file.clone())
        );
        assert!(matches!(
            FeedSource::resolve("https://example.com/rss").unwrap(),
            FeedSource::Remote(_)
        ));
        assert!(matches!(
            FeedSource::resolve("ftp://example.com/rss"),
            Err(FeedError::InvalidSource(_))
        ));
    }

    #[tokio::test]
    async fn test_load_feed_from_file_and_disallowed_url() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("feed.xml");
        std::fs::write(&file, RSS).unwrap();
        let client = reqwest::Client::new();

        let entries = load_feed(file.to_str().unwrap(), &client, &SourcePolicy::default())
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);

        let policy = SourcePolicy::new(["feeds.feedburner.com"]);
        let err = load_feed("https://evil.example/rss", &client, &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::DisallowedHost(_)));
    }
}
