//! Configuration module for the gateway
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, plus the environment-style overrides (`MAX_HTML_BYTES`, ...).
//! The resulting [`Config`] is constructed once and handed to each component.
//!
//! # Example
//!
//! ```no_run
//! use safe_fetch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("safe-fetch.toml")).unwrap();
//! println!("Per-page cap: {} bytes", config.fetch.max_html_bytes);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlConfig, FetchConfig, SanitizerConfig, SecurityConfig};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_from_env, ENV_KEYS,
};
pub use validation::validate;
