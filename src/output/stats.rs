//! Crawl statistics
//!
//! Counters gathered while a crawl runs, and a plain-text printer for them.

use crate::output::manifest::AggregatedResult;
use crate::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    /// Pages in the result
    pub pages_fetched: usize,

    /// Failed URLs, seed excluded
    pub failures: usize,

    /// Skipped URLs, including ones beyond the manifest cap
    pub skipped: usize,

    /// Failure count per error kind
    pub failures_by_kind: BTreeMap<ErrorKind, usize>,

    /// Body bytes read across all fetches, failed ones included
    pub total_bytes: u64,

    /// Deepest layer that produced a page
    pub max_depth_reached: u32,

    /// Links dropped as duplicates of an already seen URL
    pub duplicate_links: usize,

    pub duration_ms: u64,
}

impl CrawlStats {
    pub fn record_failure(&mut self, kind: ErrorKind) {
        self.failures += 1;
        *self.failures_by_kind.entry(kind).or_insert(0) += 1;
    }

    /// Share of attempted pages that made it into the result
    pub fn success_rate(&self) -> f64 {
        let attempted = self.pages_fetched + self.failures;
        if attempted == 0 {
            0.0
        } else {
            (self.pages_fetched as f64 / attempted as f64) * 100.0
        }
    }
}

/// Prints a human-readable crawl summary to stderr
pub fn print_summary(result: &AggregatedResult) {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    // A closed stderr is not worth failing the crawl over
    let _ = write_summary(&mut out, result);
}

/// Writes the human-readable crawl summary
pub fn write_summary<W: Write>(out: &mut W, result: &AggregatedResult) -> io::Result<()> {
    let stats = &result.stats;

    writeln!(out, "=== Crawl Summary ===\n")?;

    writeln!(out, "Overview:")?;
    writeln!(out, "  Seed: {}", result.seed)?;
    writeln!(out, "  Stop reason: {}", result.stop_reason)?;
    writeln!(out, "  Pages fetched: {}", stats.pages_fetched)?;
    writeln!(out, "  Failures: {}", stats.failures)?;
    writeln!(out, "  Skipped: {}", stats.skipped)?;
    writeln!(out, "  Success rate: {:.1}%", stats.success_rate())?;
    writeln!(out, "  Bytes read: {}", stats.total_bytes)?;
    writeln!(out, "  Deepest layer: {}", stats.max_depth_reached)?;
    writeln!(out, "  Duration: {:.2}s", stats.duration_ms as f64 / 1000.0)?;
    writeln!(out)?;

    if !stats.failures_by_kind.is_empty() {
        writeln!(out, "Failures by Kind:")?;
        // Most frequent first
        let mut kinds: Vec<_> = stats.failures_by_kind.iter().collect();
        kinds.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (kind, count) in kinds {
            writeln!(out, "  {}: {}", kind, count)?;
        }
        writeln!(out)?;
    }

    writeln!(out, "Pages:")?;
    for page in &result.pages {
        let title = if page.content.title.is_empty() {
            "(untitled)"
        } else {
            page.content.title.as_str()
        };
        writeln!(out, "  [{}] {} - {}", page.depth, page.content.url, title)?;
    }

    Ok(())
}
