use crate::config::CrawlConfig;
use crate::GatewayError;
use serde::{Deserialize, Serialize};

/// A caller's crawl request
///
/// Deserializes from JSON with defaults for every field except `url`:
///
/// ```
/// use safe_fetch::CrawlRequest;
///
/// let request: CrawlRequest = serde_json::from_str(r#"{"url": "https://example.com"}"#).unwrap();
/// assert_eq!(request.depth, 0);
/// assert!(request.same_domain_only);
/// assert_eq!(request.max_pages, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRequest {
    /// Seed URL, untrusted
    pub url: String,

    /// Link hops to follow from the seed
    #[serde(default)]
    pub depth: u32,

    /// Only follow links whose host matches the seed's
    #[serde(default = "default_same_domain_only")]
    pub same_domain_only: bool,

    /// Maximum number of pages in the result, seed included
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_same_domain_only() -> bool {
    true
}

fn default_max_pages() -> u32 {
    5
}

impl CrawlRequest {
    /// Creates a request for `url` with default limits
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: 0,
            same_domain_only: default_same_domain_only(),
            max_pages: default_max_pages(),
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_same_domain_only(mut self, same_domain_only: bool) -> Self {
        self.same_domain_only = same_domain_only;
        self
    }

    /// Checks the request against the configured ceilings
    ///
    /// Out-of-range values are rejected, never clamped.
    pub fn validate(&self, limits: &CrawlConfig) -> Result<(), GatewayError> {
        if self.url.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("url must not be empty".to_string()));
        }

        if self.depth > limits.max_depth {
            return Err(GatewayError::InvalidRequest(format!(
                "depth must be between 0 and {}, got {}",
                limits.max_depth, self.depth
            )));
        }

        if self.max_pages == 0 || self.max_pages > limits.max_pages_ceiling {
            return Err(GatewayError::InvalidRequest(format!(
                "max_pages must be between 1 and {}, got {}",
                limits.max_pages_ceiling, self.max_pages
            )));
        }

        Ok(())
    }
}
