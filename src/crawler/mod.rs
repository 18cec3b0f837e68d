//! Crawler module for fetching and processing untrusted pages
//!
//! This module contains the core pipeline, including:
//! - SSRF-pinned HTTP fetching under time, type and byte budgets
//! - HTML sanitizing and link extraction
//! - Crawl requests and breadth-first coordination

mod coordinator;
mod fetcher;
mod request;
mod sanitizer;

pub use coordinator::{run_crawl, Coordinator};
pub use fetcher::{
    is_allowed_content_type, read_capped, AggregateBytes, ByteBudget, CappedReadError, FetchedPage,
    Fetcher, ALLOWED_CONTENT_TYPES,
};
pub use request::CrawlRequest;
pub use sanitizer::{normalize_whitespace, strip_tags, Sanitizer, ScrapedContent};
