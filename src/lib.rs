//! safe-fetch: an SSRF-guarded fetch and crawl gateway
//!
//! This crate takes an untrusted, user-supplied URL plus a crawl request and
//! produces sanitized, size-bounded page content, refusing anything that would
//! reach internal network resources or return unexpected payloads.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod url;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for gateway operations
///
/// The `Display` text carries internal detail (hosts, addresses, upstream
/// error text) and is meant for logs. Anything shown to a caller goes through
/// [`GatewayError::kind`] and [`ErrorKind::public_message`] instead.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("SSRF blocked: {host} resolves to disallowed address {ip}")]
    SsrfBlocked { host: String, ip: std::net::IpAddr },

    #[error("DNS resolution failed for {host}: {message}")]
    DnsResolutionFailed { host: String, message: String },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Response from {url} exceeds byte budget of {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    #[error("Unsupported content type '{content_type}' from {url}")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("Upstream error for {url}: {message}")]
    Upstream {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Content parse error for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Invalid crawl request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl GatewayError {
    /// Returns the caller-facing error category
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::SsrfBlocked { .. } => ErrorKind::SsrfBlocked,
            Self::DnsResolutionFailed { .. } => ErrorKind::DnsResolutionFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::TooLarge { .. } => ErrorKind::TooLarge,
            Self::UnsupportedContentType { .. } => ErrorKind::UnsupportedContentType,
            Self::Upstream { .. } => ErrorKind::UpstreamError,
            Self::Parse { .. } => ErrorKind::ParseError,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Config(_) | Self::Client(_) => ErrorKind::Internal,
        }
    }

    /// Returns the sanitized message that is safe to hand back to callers
    pub fn public_message(&self) -> String {
        match self {
            // Request validation messages only echo the caller's own input
            Self::InvalidRequest(reason) => reason.clone(),
            other => other.kind().public_message().to_string(),
        }
    }
}

/// Error categories exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "InvalidURL")]
    InvalidUrl,
    #[serde(rename = "SSRFBlocked")]
    SsrfBlocked,
    #[serde(rename = "DNSResolutionFailed")]
    DnsResolutionFailed,
    Timeout,
    TooLarge,
    UnsupportedContentType,
    UpstreamError,
    ParseError,
    InvalidRequest,
    Internal,
}

impl ErrorKind {
    /// Returns the wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "InvalidURL",
            Self::SsrfBlocked => "SSRFBlocked",
            Self::DnsResolutionFailed => "DNSResolutionFailed",
            Self::Timeout => "Timeout",
            Self::TooLarge => "TooLarge",
            Self::UnsupportedContentType => "UnsupportedContentType",
            Self::UpstreamError => "UpstreamError",
            Self::ParseError => "ParseError",
            Self::InvalidRequest => "InvalidRequest",
            Self::Internal => "Internal",
        }
    }

    /// Generic description with no network topology or implementation detail
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "The URL is malformed or uses an unsupported scheme",
            Self::SsrfBlocked => "The URL points to a restricted network address",
            Self::DnsResolutionFailed => "The hostname could not be resolved",
            Self::Timeout => "The remote server did not respond in time",
            Self::TooLarge => "The response exceeded the allowed size",
            Self::UnsupportedContentType => "The response content type is not supported",
            Self::UpstreamError => "The remote server returned an error",
            Self::ParseError => "The response content could not be processed",
            Self::InvalidRequest => "The crawl request parameters are invalid",
            Self::Internal => "An internal error occurred",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_crawl, CrawlRequest, Coordinator, FetchedPage, Fetcher, ScrapedContent};
pub use output::{AggregatedResult, FailureRecord, StopReason};
pub use url::{normalize_url, ValidatedUrl, Validator};
