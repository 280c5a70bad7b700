//! HTML extraction: title, markdown body and outbound links
//!
//! # Link Extraction Rules
//!
//! **Include:**
//! - `<a href="...">` anywhere in the document, relative hrefs resolved
//!   against the page URL
//!
//! **Exclude:**
//! - Empty and fragment-only hrefs
//! - `javascript:`, `mailto:`, `tel:` and `data:` hrefs
//! - `<a href="..." download>`
//! - Anything that is not http(s) after resolution
//!
//! `rel="nofollow"` links are followed.

use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

/// Containers tried in order for the main content
const MAIN_SELECTORS: [&str; 7] = [
    "main",
    "article",
    "[role='main']",
    "#content",
    "#main",
    ".post-content",
    ".entry-content",
];

/// Elements dropped before conversion
const BOILERPLATE_TAGS: [&str; 8] = [
    "script", "style", "nav", "header", "footer", "aside", "noscript", "iframe",
];

const SKIPPED_SCHEMES: [&str; 4] = ["javascript:", "mailto:", "tel:", "data:"];

/// Result of extracting a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// Page title, empty when the page has none
    pub title: String,
    pub markdown: String,
}

/// Why a page could not be turned into markdown
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Document is empty")]
    Empty,

    #[error("Markdown conversion failed: {0}")]
    Conversion(String),
}

/// Turns fetched HTML into an indexable document and a set of links
pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str) -> Result<Extracted, ExtractError>;

    /// Absolute http(s) URLs linked from the page, in document order
    fn discover_links(&self, base_url: &Url, html: &str) -> Vec<String>;
}

/// Default extractor built on `scraper` and `htmd`
#[derive(Debug, Clone, Default)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }

    fn title(document: &Html) -> String {
        for selector in ["title", "h1"] {
            let Ok(selector) = Selector::parse(selector) else {
                continue;
            };
            let title = document
                .select(&selector)
                .next()
                .map(|element| {
                    element
                        .text()
                        .collect::<String>()
                        .split_whitespace()
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default();
            if !title.is_empty() {
                return title;
            }
        }
        String::new()
    }

    fn main_content(document: &Html) -> String {
        for selector in MAIN_SELECTORS.iter().chain(std::iter::once(&"body")) {
            if let Ok(selector) = Selector::parse(selector) {
                if let Some(element) = document.select(&selector).next() {
                    return element.html();
                }
            }
        }
        document.html()
    }

    fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }

        let lower = href.to_ascii_lowercase();
        if SKIPPED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
            return None;
        }

        let absolute = base_url.join(href).ok()?;
        matches!(absolute.scheme(), "http" | "https").then(|| absolute.to_string())
    }
}

impl Extractor for HtmlExtractor {
    fn extract(&self, html: &str) -> Result<Extracted, ExtractError> {
        if html.trim().is_empty() {
            return Err(ExtractError::Empty);
        }

        let document = Html::parse_document(html);
        let title = Self::title(&document);
        let content = Self::main_content(&document);

        let converter = htmd::HtmlToMarkdown::builder()
            .skip_tags(BOILERPLATE_TAGS.to_vec())
            .build();
        let markdown = converter
            .convert(&content)
            .map_err(|e| ExtractError::Conversion(e.to_string()))?;
        let markdown = markdown.trim();
        if markdown.is_empty() {
            return Err(ExtractError::Empty);
        }

        Ok(Extracted {
            title,
            markdown: markdown.to_string(),
        })
    }

    fn discover_links(&self, base_url: &Url, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        document
            .select(&selector)
            .filter(|element| element.value().attr("download").is_none())
            .filter_map(|element| element.value().attr("href"))
            .filter_map(|href| Self::resolve_link(href, base_url))
            .collect()
    }
}
