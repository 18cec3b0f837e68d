//! Markdown report generation
//!
//! Renders an [`AggregatedResult`] as a human-readable markdown document:
//! run metadata, statistics, the page list and the failure/skip manifest.

use crate::output::manifest::{AggregatedResult, SkipReason};
use crate::output::OutputResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Most manifest rows listed per section
const MAX_MANIFEST_ROWS: usize = 100;

/// Writes the markdown report for `result` to `output_path`
pub fn write_markdown_report(result: &AggregatedResult, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(result);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl result as markdown
pub fn format_markdown_report(result: &AggregatedResult) -> String {
    let stats = &result.stats;
    let mut md = String::new();

    md.push_str("# Safe-Fetch Crawl Report\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Seed**: {}\n", escape_cell(&result.seed)));
    md.push_str(&format!("- **Started**: {}\n", result.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", result.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.2} seconds\n",
        stats.duration_ms as f64 / 1000.0
    ));
    md.push_str(&format!("- **Stop Reason**: {}\n\n", result.stop_reason));

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Pages Fetched**: {}\n", stats.pages_fetched));
    md.push_str(&format!("- **Failures**: {}\n", stats.failures));
    md.push_str(&format!("- **Skipped**: {}\n", stats.skipped));
    md.push_str(&format!("- **Duplicate Links**: {}\n", stats.duplicate_links));
    md.push_str(&format!("- **Bytes Read**: {}\n", stats.total_bytes));
    md.push_str(&format!("- **Success Rate**: {:.2}%\n\n", stats.success_rate()));

    // Pages
    md.push_str("## Pages\n\n");
    if result.pages.is_empty() {
        md.push_str("No pages.\n\n");
    } else {
        md.push_str("| Depth | Status | URL | Title |\n");
        md.push_str("|-------|--------|-----|-------|\n");
        for page in &result.pages {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                page.depth,
                page.status_code,
                escape_cell(&page.content.url),
                escape_cell(&page.content.title)
            ));
        }
        md.push('\n');
    }

    // Failures
    if !stats.failures_by_kind.is_empty() {
        md.push_str("## Failures by Kind\n\n");
        md.push_str("| Kind | Count |\n");
        md.push_str("|------|-------|\n");
        for (kind, count) in &stats.failures_by_kind {
            md.push_str(&format!("| {} | {} |\n", kind, count));
        }
        md.push('\n');
    }

    if !result.failures.is_empty() {
        md.push_str("## Failed URLs\n\n");
        md.push_str("| URL | Kind | Message |\n");
        md.push_str("|-----|------|---------|\n");
        for failure in result.failures.iter().take(MAX_MANIFEST_ROWS) {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                escape_cell(&failure.url),
                failure.error_kind,
                failure.message
            ));
        }
        if result.failures.len() > MAX_MANIFEST_ROWS {
            md.push_str(&format!(
                "\n... and {} more\n",
                result.failures.len() - MAX_MANIFEST_ROWS
            ));
        }
        md.push('\n');
    }

    if !result.skipped.is_empty() {
        md.push_str("## Skipped URLs\n\n");
        for skip in result.skipped.iter().take(MAX_MANIFEST_ROWS) {
            let reason = match skip.reason {
                SkipReason::OffDomain => "off domain",
                SkipReason::Deadline => "deadline",
            };
            md.push_str(&format!("- {} ({})\n", escape_cell(&skip.url), reason));
        }
        if stats.skipped > MAX_MANIFEST_ROWS {
            md.push_str(&format!("\n... and {} more\n", stats.skipped - MAX_MANIFEST_ROWS));
        }
        md.push('\n');
    }

    md
}

/// Keeps untrusted text from breaking the table layout or injecting markup
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', " ")
}
