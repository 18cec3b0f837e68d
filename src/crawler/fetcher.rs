//! HTTP fetcher implementation
//!
//! This module handles every outbound HTTP request, including:
//! - Building clients pinned to the validated addresses (no second DNS lookup)
//! - Manual redirect handling with re-validation of every hop
//! - Content-Type allow-listing before the body is touched
//! - Streaming body reads under a per-page and crawl-wide byte budget
//! - Bounded retries for transport failures inside one time budget

use crate::config::{Config, FetchConfig};
use crate::url::{ValidatedUrl, Validator};
use crate::GatewayError;
use futures::{Stream, StreamExt};
use reqwest::{header, redirect::Policy, Client};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use url::Url;

/// Media types the fetcher accepts
///
/// Matching is on the media type essence (parameters such as `charset` are
/// ignored). Any type ending in `+xml` is accepted as well.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "text/html",
    "application/xhtml+xml",
    "text/xml",
    "application/xml",
    "application/rss+xml",
    "application/atom+xml",
];

/// Returns true if a `Content-Type` header value is on the allow-list
///
/// # Examples
///
/// ```
/// use safe_fetch::crawler::is_allowed_content_type;
///
/// assert!(is_allowed_content_type("text/html; charset=utf-8"));
/// assert!(is_allowed_content_type("image/svg+xml"));
/// assert!(!is_allowed_content_type("application/pdf"));
/// ```
pub fn is_allowed_content_type(header_value: &str) -> bool {
    let essence = header_value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if essence.is_empty() {
        return false;
    }

    ALLOWED_CONTENT_TYPES.contains(&essence.as_str())
        || (essence.ends_with("+xml") && essence.contains('/'))
}

/// A successfully fetched response
///
/// Owned by the fetch pipeline for one request; the sanitizer consumes it.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: Url,

    /// HTTP status code of the final response
    pub status_code: u16,

    /// Content-Type header value
    pub content_type: String,

    /// Response body, never larger than the byte budget
    pub raw_bytes: Vec<u8>,

    /// Response headers (lowercased names, repeated values joined by ", ")
    pub headers: BTreeMap<String, String>,
}

/// Crawl-wide byte counter shared by concurrent fetches
#[derive(Debug)]
pub struct AggregateBytes {
    used: AtomicU64,
    cap: u64,
    tripped: AtomicBool,
}

impl AggregateBytes {
    pub fn new(cap: u64) -> Self {
        Self {
            used: AtomicU64::new(0),
            cap,
            tripped: AtomicBool::new(false),
        }
    }

    /// Bytes consumed so far
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }

    /// True once the cap is reached or any fetch was refused for crossing it
    pub fn is_exhausted(&self) -> bool {
        self.tripped.load(Ordering::Acquire) || self.used() >= self.cap
    }

    /// Atomically reserves `n` bytes; fails without consuming if the cap would be crossed
    pub fn try_consume(&self, n: u64) -> bool {
        let consumed = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(n).filter(|total| *total <= self.cap)
            })
            .is_ok();
        if !consumed {
            self.trip();
        }
        consumed
    }

    fn trip(&self) {
        self.tripped.store(true, Ordering::Release);
    }
}

/// Byte limits applied to one fetch
///
/// The per-page limit covers every attempt of the fetch. When an aggregate
/// counter is attached, every chunk is also charged against it, so concurrent
/// fetches of one crawl can never together exceed the crawl-wide cap.
#[derive(Debug, Clone)]
pub struct ByteBudget {
    per_page: u64,
    aggregate: Option<Arc<AggregateBytes>>,
}

impl ByteBudget {
    /// A standalone budget with only a per-page limit
    pub fn per_page(limit: u64) -> Self {
        Self {
            per_page: limit,
            aggregate: None,
        }
    }

    /// A per-page budget that also draws from a shared crawl-wide counter
    pub fn shared(limit: u64, aggregate: Arc<AggregateBytes>) -> Self {
        Self {
            per_page: limit,
            aggregate: Some(aggregate),
        }
    }

    pub fn per_page_limit(&self) -> u64 {
        self.per_page
    }

    /// Bytes this fetch may still read, given what it has already spent
    pub fn remaining(&self, spent: u64) -> u64 {
        let page_left = self.per_page.saturating_sub(spent);
        match &self.aggregate {
            Some(aggregate) => page_left.min(aggregate.cap().saturating_sub(aggregate.used())),
            None => page_left,
        }
    }

    /// Checks a declared body size; returns the limit it would cross
    fn check_declared(&self, spent: u64, declared: u64) -> Result<(), u64> {
        if spent.saturating_add(declared) > self.per_page {
            return Err(self.per_page);
        }
        if let Some(aggregate) = &self.aggregate {
            if aggregate.used().saturating_add(declared) > aggregate.cap() {
                aggregate.trip();
                return Err(aggregate.cap());
            }
        }
        Ok(())
    }

    /// Charges `n` bytes; returns the limit that would be crossed on failure
    fn charge(&self, spent: &mut u64, n: u64) -> Result<(), u64> {
        if spent.saturating_add(n) > self.per_page {
            return Err(self.per_page);
        }
        if let Some(aggregate) = &self.aggregate {
            if !aggregate.try_consume(n) {
                return Err(aggregate.cap());
            }
        }
        *spent += n;
        Ok(())
    }
}

/// Failure of a capped body read
#[derive(Debug)]
pub enum CappedReadError<E> {
    /// The next chunk would have crossed this limit
    TooLarge { limit: u64 },
    /// The underlying stream failed
    Stream(E),
}

/// Reads a chunked body, stopping at the first chunk that would cross the budget
///
/// The stream is never polled again once the budget is exceeded, so an
/// oversized body is never buffered in full. `spent` carries the bytes already
/// charged by earlier attempts of the same fetch.
pub async fn read_capped<S, B, E>(
    stream: S,
    budget: &ByteBudget,
    spent: &mut u64,
) -> Result<Vec<u8>, CappedReadError<E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    futures::pin_mut!(stream);
    let mut body = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(CappedReadError::Stream)?;
        let bytes = chunk.as_ref();
        budget
            .charge(spent, bytes.len() as u64)
            .map_err(|limit| CappedReadError::TooLarge { limit })?;
        body.extend_from_slice(bytes);
    }

    Ok(body)
}

/// Outcome of one attempt, split by whether a retry may help
enum AttemptError {
    Retryable(GatewayError),
    Fatal(GatewayError),
}

impl From<GatewayError> for AttemptError {
    fn from(err: GatewayError) -> Self {
        Self::Fatal(err)
    }
}

/// Performs HTTP(S) fetches for validated URLs
#[derive(Clone)]
pub struct Fetcher {
    config: FetchConfig,
    validator: Validator,
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates a fetcher; `validator` re-checks every redirect target
    pub fn new(config: &Config, validator: Validator) -> Self {
        Self {
            config: config.fetch.clone(),
            validator,
        }
    }

    /// Default budget for a standalone fetch
    pub fn default_budget(&self) -> ByteBudget {
        ByteBudget::per_page(self.config.max_html_bytes)
    }

    /// Fetches a validated URL
    ///
    /// # Request Flow
    ///
    /// 1. Connect only to the addresses recorded in `validated`
    /// 2. Follow redirects manually; each target is validated again and pinned
    /// 3. Reject non-2xx statuses and disallowed content types before reading
    /// 4. Stream the body under `budget`
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Connection / stream failure | Retry up to `retries` times |
    /// | Time budget exhausted | Immediate → Timeout |
    /// | Body over budget | Immediate → TooLarge |
    /// | Content type not allowed | Immediate → UnsupportedContentType |
    /// | Non-2xx, bad redirect | Immediate → UpstreamError |
    /// | Redirect to blocked address | Immediate → SSRFBlocked |
    ///
    /// All attempts and hops share one deadline and one byte budget.
    pub async fn fetch(
        &self,
        validated: &ValidatedUrl,
        budget: &ByteBudget,
    ) -> Result<FetchedPage, GatewayError> {
        let deadline = Instant::now() + self.config.timeout();
        let mut spent = 0u64;
        let mut attempt = 0u32;

        loop {
            tracing::debug!("Fetching {} (attempt {})", validated.url(), attempt + 1);

            let result = timeout_at(deadline, self.fetch_once(validated, budget, &mut spent)).await;

            match result {
                Err(_) => {
                    return Err(GatewayError::Timeout {
                        url: validated.url().to_string(),
                    })
                }
                Ok(Ok(page)) => return Ok(page),
                Ok(Err(AttemptError::Retryable(err))) if attempt < self.config.retries => {
                    tracing::warn!("Retrying {} after transport failure: {}", validated.url(), err);
                    attempt += 1;
                }
                Ok(Err(AttemptError::Retryable(err))) | Ok(Err(AttemptError::Fatal(err))) => {
                    return Err(err)
                }
            }
        }
    }

    async fn fetch_once(
        &self,
        validated: &ValidatedUrl,
        budget: &ByteBudget,
        spent: &mut u64,
    ) -> Result<FetchedPage, AttemptError> {
        let mut current = validated.clone();
        let mut hops = 0u32;

        loop {
            let client = self.pinned_client(&current)?;
            let url = current.url().clone();

            let response = client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| classify_send_error(&url, e))?;

            let status = response.status();

            if status.is_redirection() {
                if hops >= self.config.max_redirects {
                    return Err(upstream(&url, Some(status.as_u16()), "too many redirects").into());
                }

                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| upstream(&url, Some(status.as_u16()), "redirect without location"))?;

                let next = url.join(location).map_err(|e| GatewayError::InvalidUrl {
                    url: location.to_string(),
                    reason: e.to_string(),
                })?;

                tracing::debug!("Redirect {} -> {}", url, next);
                current = self.validator.validate_url(&next).await?;
                hops += 1;
                continue;
            }

            if !status.is_success() {
                return Err(upstream(&url, Some(status.as_u16()), &format!("HTTP {}", status.as_u16())).into());
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            if !is_allowed_content_type(&content_type) {
                return Err(GatewayError::UnsupportedContentType {
                    url: url.to_string(),
                    content_type,
                }
                .into());
            }

            if let Some(declared) = response.content_length() {
                if let Err(limit) = budget.check_declared(*spent, declared) {
                    tracing::debug!("{} declares {} bytes, over budget", url, declared);
                    return Err(GatewayError::TooLarge {
                        url: url.to_string(),
                        limit,
                    }
                    .into());
                }
            }

            let headers = collect_headers(response.headers());

            let raw_bytes = read_capped(response.bytes_stream(), budget, spent)
                .await
                .map_err(|e| match e {
                    CappedReadError::TooLarge { limit } => AttemptError::Fatal(GatewayError::TooLarge {
                        url: url.to_string(),
                        limit,
                    }),
                    CappedReadError::Stream(err) => classify_send_error(&url, err),
                })?;

            tracing::debug!("Fetched {} ({} bytes)", url, raw_bytes.len());

            return Ok(FetchedPage {
                final_url: url,
                status_code: status.as_u16(),
                content_type,
                raw_bytes,
                headers,
            });
        }
    }

    /// Builds a client that can only reach the addresses in `target`
    fn pinned_client(&self, target: &ValidatedUrl) -> Result<Client, GatewayError> {
        let mut builder = Client::builder()
            .user_agent(self.config.user_agent.as_str())
            .connect_timeout(self.config.timeout())
            .redirect(Policy::none()) // Handle redirects manually
            .no_proxy()
            .gzip(true)
            .brotli(true);

        if target.has_domain_host() {
            builder = builder.resolve_to_addrs(target.hostname(), &target.socket_addrs());
        }

        builder
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))
    }
}

fn classify_send_error(url: &Url, err: reqwest::Error) -> AttemptError {
    if err.is_timeout() {
        AttemptError::Fatal(GatewayError::Timeout {
            url: url.to_string(),
        })
    } else if err.is_builder() {
        AttemptError::Fatal(GatewayError::Client(err.to_string()))
    } else {
        AttemptError::Retryable(upstream(url, None, &err.to_string()))
    }
}

fn upstream(url: &Url, status: Option<u16>, message: &str) -> GatewayError {
    GatewayError::Upstream {
        url: url.to_string(),
        status,
        message: message.to_string(),
    }
}

fn collect_headers(headers: &header::HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}
