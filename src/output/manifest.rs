//! Crawl result and manifest types
//!
//! [`AggregatedResult`] is what a crawl hands back: the pages in discovery
//! order plus a manifest of every URL that failed or was skipped, with a
//! reason. Failure messages are the generic public text of the error kind;
//! internal detail only goes to the logs.

use crate::crawler::ScrapedContent;
use crate::output::stats::CrawlStats;
use crate::{ErrorKind, GatewayError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a crawl stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Nothing left to crawl within the requested depth
    FrontierExhausted,
    /// `max_pages` pages were collected
    PageLimit,
    /// The crawl-wide byte cap was reached
    ByteLimit,
    /// The overall crawl deadline passed; results are partial
    Deadline,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrontierExhausted => "frontier_exhausted",
            Self::PageLimit => "page_limit",
            Self::ByteLimit => "byte_limit",
            Self::Deadline => "deadline",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a discovered URL was never fetched to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Host differs from the seed and `same_domain_only` is set
    OffDomain,
    /// Fetch was still in flight when the crawl deadline passed
    Deadline,
}

/// A URL that failed, with its caller-safe error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub url: String,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl FailureRecord {
    pub fn from_error(url: impl Into<String>, err: &GatewayError) -> Self {
        Self {
            url: url.into(),
            error_kind: err.kind(),
            message: err.kind().public_message().to_string(),
        }
    }
}

/// A URL that was deliberately not fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub url: String,
    pub reason: SkipReason,
}

/// One page of the result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawledPage {
    /// Link hops from the seed (0 for the seed itself)
    pub depth: u32,

    pub status_code: u16,

    #[serde(flatten)]
    pub content: ScrapedContent,
}

/// Complete outcome of one crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// The seed URL as requested
    pub seed: String,

    /// Pages in breadth-first discovery order, seed first
    pub pages: Vec<CrawledPage>,

    pub failures: Vec<FailureRecord>,

    pub skipped: Vec<SkipRecord>,

    pub stats: CrawlStats,

    pub stop_reason: StopReason,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,
}

impl AggregatedResult {
    /// Final URLs of the result pages, in order
    pub fn page_urls(&self) -> Vec<&str> {
        self.pages.iter().map(|p| p.content.url.as_str()).collect()
    }

    /// True when the crawl stopped before running out of links
    pub fn is_partial(&self) -> bool {
        self.stop_reason != StopReason::FrontierExhausted
    }

    pub fn failure_for(&self, url: &str) -> Option<&FailureRecord> {
        self.failures.iter().find(|f| f.url == url)
    }
}
