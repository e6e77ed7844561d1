//! Main-content extraction for arbitrary article HTML.
//!
//! No single heuristic isolates the article body on every site, so extraction
//! runs an ordered cascade of strategies. Each strategy is a plain function
//! from a parsed page to an optional [`Candidate`]; the evaluator accepts the
//! first candidate whose text is longer than that stage's threshold.
//!
//! | Stage | Strategy | Accepts when longer than |
//! |-------|----------|--------------------------|
//! | 1 | first `<article>` | 400 chars |
//! | 2 | first `div` whose id starts with `post-body` (any case) | 400 chars |
//! | 3 | first `div.post-body.entry-content` | 400 chars |
//! | 4 | longest `div`/`section`/`main`/`article`/`p` | 600 chars |
//! | 5 | readability (feature `readability`) | 200 chars |
//! | 6 | whole document | always |
//!
//! Specific selectors come first. A short match from them is more often an
//! empty placeholder than a genuinely short article, so it falls through to
//! the broader stages instead of being accepted.

use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use std::cmp::Reverse;
use std::fmt;
use thiserror::Error;
use tracing::{debug, instrument};

/// Elements whose text never counts as article content.
const NON_CONTENT_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector `{selector}`: {reason}")]
    Selector {
        selector: &'static str,
        reason: String,
    },
}

/// Which cascade stage produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    ArticleElement,
    PostBodyId,
    PostBodyEntryContent,
    LongestBlock,
    Readability,
    WholeDocument,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::ArticleElement => "article-element",
            Strategy::PostBodyId => "post-body-id",
            Strategy::PostBodyEntryContent => "post-body-entry-content",
            Strategy::LongestBlock => "longest-block",
            Strategy::Readability => "readability",
            Strategy::WholeDocument => "whole-document",
        };
        f.write_str(name)
    }
}

/// Flattened text of one subtree considered during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    /// Length of `text` in characters.
    pub len: usize,
}

impl Candidate {
    pub fn new(text: String) -> Self {
        let len = text.chars().count();
        Self { text, len }
    }

    fn from_element(el: ElementRef<'_>) -> Self {
        Self::new(flatten_text(el))
    }
}

/// The accepted text and the stage that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub strategy: Strategy,
    pub text: String,
}

/// A parsed page plus the inputs some strategies need verbatim.
pub struct Page<'a> {
    pub raw: &'a str,
    pub url: Option<&'a str>,
    pub dom: Html,
}

impl<'a> Page<'a> {
    pub fn parse(raw: &'a str, url: Option<&'a str>) -> Self {
        Self {
            raw,
            url,
            dom: Html::parse_document(raw),
        }
    }
}

type StageFn = fn(&Page<'_>) -> Result<Option<Candidate>, ExtractError>;

struct Stage {
    strategy: Strategy,
    /// Candidates must be strictly longer than this.
    min_len: usize,
    find: StageFn,
}

const CASCADE: [Stage; 5] = [
    Stage {
        strategy: Strategy::ArticleElement,
        min_len: 400,
        find: article_element,
    },
    Stage {
        strategy: Strategy::PostBodyId,
        min_len: 400,
        find: post_body_id,
    },
    Stage {
        strategy: Strategy::PostBodyEntryContent,
        min_len: 400,
        find: post_body_entry_content,
    },
    Stage {
        strategy: Strategy::LongestBlock,
        min_len: 600,
        find: longest_block,
    },
    Stage {
        strategy: Strategy::Readability,
        min_len: 200,
        find: readability,
    },
];

/// Extract the best-guess main article text from `html`.
///
/// Always yields some text when it succeeds: if no stage clears its
/// threshold, the flattened text of the whole document is returned.
///
/// # Errors
///
/// Returns [`ExtractError`] if a stage cannot run at all (e.g. a selector
/// fails to build). Readability failures are not errors; that stage is
/// simply skipped.
pub fn extract_article_text(html: &str, url: Option<&str>) -> Result<String, ExtractError> {
    extract_article(html, url).map(|e| e.text)
}

/// Like [`extract_article_text`] but also reports the winning strategy.
#[instrument(level = "debug", skip(html), fields(bytes = html.len()))]
pub fn extract_article(html: &str, url: Option<&str>) -> Result<Extraction, ExtractError> {
    let page = Page::parse(html, url);

    for stage in &CASCADE {
        match (stage.find)(&page)? {
            Some(candidate) if candidate.len > stage.min_len => {
                debug!(strategy = %stage.strategy, chars = candidate.len, "Accepted candidate");
                return Ok(Extraction {
                    strategy: stage.strategy,
                    text: candidate.text,
                });
            }
            Some(candidate) => {
                debug!(
                    strategy = %stage.strategy,
                    chars = candidate.len,
                    min = stage.min_len,
                    "Candidate too short; falling through"
                );
            }
            None => debug!(strategy = %stage.strategy, "No candidate"),
        }
    }

    let whole = whole_document(&page);
    debug!(strategy = %Strategy::WholeDocument, chars = whole.len, "Using whole document");
    Ok(Extraction {
        strategy: Strategy::WholeDocument,
        text: whole.text,
    })
}

/// Collapse all content text under `el` into single-space separated words.
pub fn flatten_text(el: ElementRef<'_>) -> String {
    el.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let inside_non_content = node
                .parent()
                .and_then(ElementRef::wrap)
                .is_some_and(|parent| NON_CONTENT_TAGS.contains(&parent.value().name()));
            (!inside_non_content).then_some(&**text)
        })
        .flat_map(str::split_whitespace)
        .join(" ")
}

fn selector(css: &'static str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        selector: css,
        reason: e.to_string(),
    })
}

fn first_match(page: &Page<'_>, css: &'static str) -> Result<Option<Candidate>, ExtractError> {
    let sel = selector(css)?;
    Ok(page.dom.select(&sel).next().map(Candidate::from_element))
}

pub fn article_element(page: &Page<'_>) -> Result<Option<Candidate>, ExtractError> {
    first_match(page, "article")
}

pub fn post_body_id(page: &Page<'_>) -> Result<Option<Candidate>, ExtractError> {
    let sel = selector("div[id]")?;
    Ok(page
        .dom
        .select(&sel)
        .find(|el| {
            el.value()
                .id()
                .is_some_and(|id| id.to_ascii_lowercase().starts_with("post-body"))
        })
        .map(Candidate::from_element))
}

pub fn post_body_entry_content(page: &Page<'_>) -> Result<Option<Candidate>, ExtractError> {
    first_match(page, "div.post-body.entry-content")
}

/// The longest block-level text in the page; the earliest wins a tie.
pub fn longest_block(page: &Page<'_>) -> Result<Option<Candidate>, ExtractError> {
    let sel = selector("div, section, main, article, p")?;
    Ok(page
        .dom
        .select(&sel)
        .map(Candidate::from_element)
        .min_by_key(|c| Reverse(c.len)))
}

#[cfg(feature = "readability")]
pub fn readability(page: &Page<'_>) -> Result<Option<Candidate>, ExtractError> {
    use dom_smoothie::{Config, Readability};

    let cfg = Config {
        max_elements_to_parse: 9000,
        ..Default::default()
    };
    let article = match Readability::new(page.raw, page.url, Some(cfg)).and_then(|mut r| r.parse())
    {
        Ok(article) => article,
        Err(e) => {
            debug!(error = %e, "Readability failed; skipping");
            return Ok(None);
        }
    };
    let fragment = Html::parse_fragment(&article.content);
    Ok(Some(Candidate::new(flatten_text(fragment.root_element()))))
}

#[cfg(not(feature = "readability"))]
pub fn readability(_page: &Page<'_>) -> Result<Option<Candidate>, ExtractError> {
    Ok(None)
}

pub fn whole_document(page: &Page<'_>) -> Candidate {
    Candidate::from_element(page.dom.root_element())
}
