//! safe-fetch main entry point
//!
//! This is the command-line interface for the safe-fetch gateway.

use anyhow::Context;
use clap::Parser;
use safe_fetch::config::{compute_config_hash, load_config_from_env, Config};
use safe_fetch::output::{print_summary, to_json, write_markdown_report};
use safe_fetch::{run_crawl, CrawlRequest, GatewayError};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// safe-fetch: an SSRF-guarded fetch and crawl gateway
///
/// Fetches an untrusted URL, optionally follows its links breadth-first, and
/// prints sanitized page content plus a manifest of failed and skipped URLs
/// as JSON on stdout.
#[derive(Parser, Debug)]
#[command(name = "safe-fetch")]
#[command(version)]
#[command(about = "An SSRF-guarded fetch and crawl gateway", long_about = None)]
struct Cli {
    /// Seed URL to fetch
    #[arg(value_name = "URL", required_unless_present = "request")]
    url: Option<String>,

    /// Link hops to follow from the seed
    #[arg(long, default_value_t = 0)]
    depth: u32,

    /// Maximum number of pages to return, seed included
    #[arg(long, default_value_t = 5)]
    max_pages: u32,

    /// Follow links to other hosts too
    #[arg(long)]
    allow_off_domain: bool,

    /// Read the crawl request from a JSON file instead of the flags
    #[arg(long, value_name = "FILE", conflicts_with = "url")]
    request: Option<PathBuf>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print a human-readable summary to stderr
    #[arg(long)]
    summary: bool,

    /// Also write a markdown report to this file
    #[arg(long, value_name = "FILE")]
    markdown: Option<PathBuf>,

    /// Pretty-print the JSON result
    #[arg(long)]
    pretty: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load_configuration(&cli)?;

    let request = match build_request(&cli) {
        Ok(request) => request,
        Err(err) => return Ok(report_failure(&err, cli.pretty)),
    };

    handle_crawl(config, request, &cli).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr; stdout carries only the JSON result.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("safe_fetch=info,warn"),
            1 => EnvFilter::new("safe_fetch=debug,info"),
            2 => EnvFilter::new("safe_fetch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the optional config file, then applies environment overrides
fn load_configuration(cli: &Cli) -> anyhow::Result<Config> {
    let config = load_config_from_env(cli.config.as_deref()).context("Failed to load configuration")?;

    match &cli.config {
        Some(path) => {
            let hash = compute_config_hash(path)?;
            tracing::info!("Configuration loaded from {} (hash: {})", path.display(), hash);
        }
        None => tracing::info!("Using default configuration"),
    }

    Ok(config)
}

/// Builds the crawl request from `--request` or the command-line flags
fn build_request(cli: &Cli) -> Result<CrawlRequest, GatewayError> {
    if let Some(path) = &cli.request {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::InvalidRequest(format!("cannot read {}: {}", path.display(), e)))?;
        return serde_json::from_str(&content)
            .map_err(|e| GatewayError::InvalidRequest(format!("malformed request: {}", e)));
    }

    let url = cli
        .url
        .clone()
        .ok_or_else(|| GatewayError::InvalidRequest("a URL is required".to_string()))?;

    Ok(CrawlRequest::new(url)
        .with_depth(cli.depth)
        .with_max_pages(cli.max_pages)
        .with_same_domain_only(!cli.allow_off_domain))
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, request: CrawlRequest, cli: &Cli) -> anyhow::Result<ExitCode> {
    let result = match run_crawl(config, &request).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!("Crawl failed: {}", err);
            return Ok(report_failure(&err, cli.pretty));
        }
    };

    println!("{}", to_json(&result, cli.pretty)?);

    if cli.summary {
        print_summary(&result);
    }

    if let Some(path) = &cli.markdown {
        write_markdown_report(&result, path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!("Markdown report written to {}", path.display());
    }

    Ok(ExitCode::SUCCESS)
}

/// Prints only the error kind and its public message
fn report_failure(err: &GatewayError, pretty: bool) -> ExitCode {
    let body = json!({
        "error_kind": err.kind(),
        "message": err.public_message(),
    });
    let rendered = if pretty {
        serde_json::to_string_pretty(&body)
    } else {
        serde_json::to_string(&body)
    };
    match rendered {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", err.kind()),
    }
    ExitCode::from(2)
}
