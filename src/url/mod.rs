//! URL handling module
//!
//! This module provides SSRF-safe URL validation, the blocked address table,
//! the DNS resolver seam, host extraction for same-domain checks, and the
//! normalization used to deduplicate crawl frontier entries.

mod domain;
mod normalize;
mod ranges;
mod resolver;
mod validator;

// Re-export main types and functions
pub use domain::{extract_host, same_host};
pub use normalize::{dedup_key, normalize_url};
pub use ranges::{blocked_range, is_public, BLOCKED_V4, BLOCKED_V6};
pub use resolver::{Resolver, StaticResolver, SystemResolver};
pub use validator::{is_valid_hostname, Scheme, ValidatedUrl, Validator};
