//! Output module for crawl results and reports
//!
//! This module handles:
//! - The result and manifest types returned by a crawl
//! - Crawl statistics and the plain-text summary
//! - Markdown reports

mod manifest;
mod markdown;
pub mod stats;

pub use manifest::{AggregatedResult, CrawledPage, FailureRecord, SkipReason, SkipRecord, StopReason};
pub use markdown::{format_markdown_report, write_markdown_report};
pub use stats::{print_summary, write_summary, CrawlStats};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Serializes a crawl result as JSON
pub fn to_json(result: &AggregatedResult, pretty: bool) -> OutputResult<String> {
    let json = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    Ok(json)
}
