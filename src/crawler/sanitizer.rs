//! Content sanitizer
//!
//! Turns a [`FetchedPage`] into caller-facing [`ScrapedContent`]. This is a
//! pure transformation: no network, no filesystem. Parsing is permissive, so
//! broken markup yields a best-effort extraction instead of an error; only
//! binary payloads that slipped through as HTML are rejected.

use crate::config::Config;
use crate::crawler::fetcher::FetchedPage;
use crate::GatewayError;
use chrono::{DateTime, Utc};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// How much of the body is scanned for NUL bytes
const BINARY_SNIFF_BYTES: usize = 8192;

/// Share of undecodable characters above which a body is treated as binary
const MAX_REPLACEMENT_RATIO: f64 = 0.3;

/// Elements whose text is never part of the visible content
const HIDDEN_TAGS: &[&str] = &["head", "script", "style", "noscript", "template", "svg", "iframe", "object"];

/// Elements dropped from the preview (code and styling, not prose)
const PREVIEW_SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Caller-facing content of one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedContent {
    /// Final URL of the page (after redirects)
    pub url: String,

    /// First `<title>`, or the first `<h1>` when there is no title
    pub title: String,

    /// `<meta>` name/property/http-equiv to content pairs
    pub meta: BTreeMap<String, String>,

    /// h1–h6 text in document order
    pub headings: Vec<String>,

    /// Visible text with markup removed and whitespace normalized
    pub main_text: String,

    /// Absolute http(s) links in document order, de-duplicated
    pub links: Vec<String>,

    /// Absolute http(s) image URLs in document order, de-duplicated
    pub images: Vec<String>,

    /// Fully de-fanged, length-capped text preview (display only)
    pub raw_html_preview: String,

    /// SHA-256 (hex) of `main_text`
    pub content_hash: String,

    pub fetched_at: DateTime<Utc>,
}

/// Extracts [`ScrapedContent`] from fetched pages
#[derive(Debug, Clone)]
pub struct Sanitizer {
    preview_chars: usize,
    max_links: usize,
}

impl Sanitizer {
    pub fn new(config: &Config) -> Self {
        Self {
            preview_chars: config.sanitizer.preview_chars,
            max_links: config.crawl.max_links_per_page,
        }
    }

    /// Sanitizes a fetched page
    ///
    /// # Extraction Rules
    ///
    /// **Links** (`<a href>`, `<area href>`) and **images** (`<img src>`) are
    /// resolved against `<base href>` (when it is http(s)) or the final URL.
    ///
    /// **Excluded:**
    /// - `javascript:`, `mailto:`, `tel:`, `data:` URLs
    /// - Fragment-only links (same page anchors)
    /// - `<a download>` links
    /// - Anything that is not http(s) after resolution
    ///
    /// # Errors
    ///
    /// * `ParseError` - the body is binary data, not markup
    pub fn sanitize(&self, page: FetchedPage) -> Result<ScrapedContent, GatewayError> {
        if looks_binary(&page.raw_bytes) {
            return Err(GatewayError::Parse {
                url: page.final_url.to_string(),
                message: format!("binary payload labelled {}", page.content_type),
            });
        }

        let html = String::from_utf8_lossy(&page.raw_bytes);
        let document = Html::parse_document(&html);
        let base_url = document_base(&document, &page.final_url);

        let main_text = normalize_whitespace(&collect_text(&document, HIDDEN_TAGS));
        let preview = truncate_preview(
            &escape_text(&normalize_whitespace(&collect_text(&document, PREVIEW_SKIPPED_TAGS))),
            self.preview_chars,
        );

        let mut hasher = Sha256::new();
        hasher.update(main_text.as_bytes());

        Ok(ScrapedContent {
            url: page.final_url.to_string(),
            title: extract_title(&document),
            meta: extract_meta(&document),
            headings: extract_headings(&document),
            links: extract_urls(&document, "a[href], area[href]", "href", &base_url, self.max_links),
            images: extract_urls(&document, "img[src]", "src", &base_url, self.max_links),
            raw_html_preview: preview,
            content_hash: hex::encode(hasher.finalize()),
            main_text,
            fetched_at: Utc::now(),
        })
    }
}

/// Removes every tag and attribute, leaving HTML-escaped text
///
/// Nothing survives as markup: the output is plain text in which `&`, `<` and
/// `>` are escaped, so it displays safely anywhere. Applying it to its own
/// output returns the same string.
///
/// # Examples
///
/// ```
/// use safe_fetch::crawler::strip_tags;
///
/// let once = strip_tags(r#"<p onclick="x()">a &lt; b</p><script>evil()</script>"#);
/// assert_eq!(once, "a &lt; b");
/// assert_eq!(strip_tags(&once), once);
/// ```
pub fn strip_tags(html: &str) -> String {
    let document = Html::parse_document(html);
    escape_text(&normalize_whitespace(&collect_text(&document, PREVIEW_SKIPPED_TAGS)))
}

/// Normalizes whitespace
///
/// CR/CRLF become LF, runs of spaces and tabs collapse to one space, lines are
/// trimmed, runs of 3+ newlines collapse to 2, and the result is trimmed.
pub fn normalize_whitespace(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut pending_newlines = 0usize;

    for line in unified.split('\n') {
        let collapsed = collapse_spaces(line);
        let trimmed = collapsed.trim();

        if trimmed.is_empty() {
            pending_newlines += 1;
            continue;
        }

        if !out.is_empty() {
            // One line break, or a single blank line for any longer gap
            out.push_str(if pending_newlines == 0 { "\n" } else { "\n\n" });
        }
        out.push_str(trimmed);
        pending_newlines = 0;
    }

    out
}

fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last_was_space = false;
    for c in line.chars() {
        if c == ' ' || c == '\t' || c == '\u{a0}' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Truncates to `max_chars` characters without cutting an entity in half
fn truncate_preview(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };

    let mut truncated = &text[..cut];
    if let Some(amp) = truncated.rfind('&') {
        if !truncated[amp..].contains(';') {
            truncated = &truncated[..amp];
        }
    }
    truncated.trim_end().to_string()
}

/// True for payloads that are binary data rather than markup
fn looks_binary(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    if head.contains(&0) {
        return true;
    }

    let decoded = String::from_utf8_lossy(bytes);
    let total = decoded.chars().count();
    if total == 0 {
        return false;
    }
    let replaced = decoded.chars().filter(|c| *c == char::REPLACEMENT_CHARACTER).count();
    (replaced as f64 / total as f64) > MAX_REPLACEMENT_RATIO
}

enum Visit<'a> {
    Enter(ElementRef<'a>),
    Text(&'a str),
    Leave(&'static str),
}

/// Collects text in document order, skipping `hidden` subtrees
///
/// Iterative on purpose: adversarial pages can nest elements deeper than the
/// task stack allows for recursion.
fn collect_text(document: &Html, hidden: &[&str]) -> String {
    let mut out = String::new();
    let mut stack = vec![Visit::Enter(document.root_element())];

    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Text(text) => push_inline(&mut out, text),
            Visit::Leave(separator) => out.push_str(separator),
            Visit::Enter(element) => {
                let tag = element.value().name();
                if hidden.contains(&tag) {
                    continue;
                }

                let separator = block_separator(tag);
                if let Some(separator) = separator {
                    out.push_str(separator);
                    stack.push(Visit::Leave(separator));
                }

                for child in element.children().rev() {
                    match child.value() {
                        Node::Text(text) => stack.push(Visit::Text(&text.text)),
                        Node::Element(_) => {
                            if let Some(child_element) = ElementRef::wrap(child) {
                                stack.push(Visit::Enter(child_element));
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    out
}

/// Appends a text node the way a browser lays out inline text
fn push_inline(out: &mut String, text: &str) {
    let mut words = text.split_whitespace().peekable();
    if words.peek().is_none() {
        if !text.is_empty() {
            out.push(' ');
        }
        return;
    }

    if text.starts_with(char::is_whitespace) {
        out.push(' ');
    }
    let joined: Vec<&str> = words.collect();
    out.push_str(&joined.join(" "));
    if text.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

fn block_separator(tag: &str) -> Option<&'static str> {
    match tag {
        "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "blockquote" | "pre" | "ul" | "ol"
        | "table" | "section" | "article" | "hr" => Some("\n\n"),
        "br" | "div" | "li" | "tr" | "header" | "footer" | "nav" | "aside" | "main" | "dl"
        | "dt" | "dd" | "form" | "figure" | "figcaption" | "address" | "title" => Some("\n"),
        "td" | "th" => Some(" "),
        _ => None,
    }
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .map(element_text)
        .find(|text| !text.is_empty())
}

/// Extracts the page title, falling back to the first `<h1>`
fn extract_title(document: &Html) -> String {
    first_text(document, "title")
        .or_else(|| first_text(document, "h1"))
        .unwrap_or_default()
}

fn extract_meta(document: &Html) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    let Ok(selector) = Selector::parse("meta[content]") else {
        return meta;
    };

    for element in document.select(&selector) {
        let attrs = element.value();
        let key = attrs
            .attr("name")
            .or_else(|| attrs.attr("property"))
            .or_else(|| attrs.attr("http-equiv"))
            .map(|k| k.trim().to_lowercase())
            .unwrap_or_default();
        if key.is_empty() {
            continue;
        }
        let content = attrs.attr("content").unwrap_or("");
        meta.entry(key)
            .or_insert_with(|| content.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    meta
}

fn extract_headings(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse("h1, h2, h3, h4, h5, h6") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect()
}

/// Honours `<base href>` when it resolves to an http(s) URL
fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|base| base.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .filter(|base| matches!(base.scheme(), "http" | "https"))
        .unwrap_or_else(|| page_url.clone())
}

fn extract_urls(document: &Html, selector: &str, attr: &str, base_url: &Url, limit: usize) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for element in document.select(&selector) {
        if urls.len() >= limit {
            tracing::debug!("URL limit of {} reached on {}", limit, base_url);
            break;
        }
        if element.value().attr("download").is_some() {
            continue;
        }
        let Some(value) = element.value().attr(attr) else {
            continue;
        };
        if let Some(absolute) = resolve_link(value, base_url) {
            if seen.insert(absolute.clone()) {
                urls.push(absolute);
            }
        }
    }

    urls
}

/// Resolves an href to an absolute http(s) URL without its fragment
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel:, data: schemes
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute.to_string())
}
