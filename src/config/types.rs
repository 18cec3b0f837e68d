use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the gateway
///
/// Every section falls back to its defaults, so an empty TOML file is a valid
/// configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub crawl: CrawlConfig,
    pub sanitizer: SanitizerConfig,
    pub security: SecurityConfig,
}

/// Per-request fetch limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum body size of a single page (bytes)
    #[serde(rename = "max-html-bytes")]
    pub max_html_bytes: u64,

    /// Total time budget for one fetch, including retries and redirects
    #[serde(rename = "timeout-seconds")]
    pub timeout_seconds: u64,

    /// Retries after a transport-level failure
    pub retries: u32,

    /// Maximum redirect hops followed per fetch
    #[serde(rename = "max-redirects")]
    pub max_redirects: u32,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_html_bytes: 2_500_000,
            timeout_seconds: 15,
            retries: 1,
            max_redirects: 5,
            user_agent: format!("safe-fetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Crawl-wide limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Aggregate byte cap across all pages of one crawl
    #[serde(rename = "max-total-bytes")]
    pub max_total_bytes: u64,

    /// Maximum number of in-flight fetches within one depth layer
    pub concurrency: u32,

    /// Hard ceiling for a request's `depth`
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Hard ceiling for a request's `max_pages`
    #[serde(rename = "max-pages-ceiling")]
    pub max_pages_ceiling: u32,

    /// Overall crawl deadline; reaching it stops the crawl gracefully
    #[serde(rename = "deadline-seconds")]
    pub deadline_seconds: u64,

    /// Maximum links and images kept from a single page
    #[serde(rename = "max-links-per-page")]
    pub max_links_per_page: usize,
}

impl CrawlConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_total_bytes: 10_000_000,
            concurrency: 5,
            max_depth: 2,
            max_pages_ceiling: 50,
            deadline_seconds: 90,
            max_links_per_page: 1000,
        }
    }
}

/// Sanitizer output limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Character cap of the de-fanged preview
    #[serde(rename = "preview-chars")]
    pub preview_chars: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            preview_chars: 4000,
        }
    }
}

/// Address policy switches
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Exempts 127.0.0.0/8 and ::1 from the blocklist (local development only)
    #[serde(rename = "allow-loopback")]
    pub allow_loopback: bool,
}
