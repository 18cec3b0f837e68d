use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::str::FromStr;

/// Environment keys recognized by [`apply_env_overrides`]
pub const ENV_KEYS: &[&str] = &[
    "MAX_HTML_BYTES",
    "MAX_TOTAL_BYTES",
    "FETCH_TIMEOUT_SECONDS",
    "FETCH_CONCURRENCY",
    "MAX_DEPTH",
    "MAX_PAGES_CEILING",
    "CRAWL_DEADLINE_SECONDS",
    "FETCH_RETRIES",
];

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so a crawl result can be tied back to the limits it ran
/// under.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Applies environment-style overrides on top of a configuration
///
/// Only the keys in [`ENV_KEYS`] are consulted; anything else in `vars` is
/// ignored. The result is validated again, since overrides can break the
/// cross-field invariants (e.g. per-page cap above the aggregate cap).
///
/// # Example
///
/// ```
/// use safe_fetch::config::{apply_env_overrides, Config};
///
/// let vars = vec![("MAX_HTML_BYTES".to_string(), "1000".to_string())];
/// let config = apply_env_overrides(Config::default(), vars).unwrap();
/// assert_eq!(config.fetch.max_html_bytes, 1000);
/// ```
pub fn apply_env_overrides<I>(mut config: Config, vars: I) -> Result<Config, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        match key.as_str() {
            "MAX_HTML_BYTES" => config.fetch.max_html_bytes = parse_env(&key, &value)?,
            "MAX_TOTAL_BYTES" => config.crawl.max_total_bytes = parse_env(&key, &value)?,
            "FETCH_TIMEOUT_SECONDS" => config.fetch.timeout_seconds = parse_env(&key, &value)?,
            "FETCH_CONCURRENCY" => config.crawl.concurrency = parse_env(&key, &value)?,
            "MAX_DEPTH" => config.crawl.max_depth = parse_env(&key, &value)?,
            "MAX_PAGES_CEILING" => config.crawl.max_pages_ceiling = parse_env(&key, &value)?,
            "CRAWL_DEADLINE_SECONDS" => config.crawl.deadline_seconds = parse_env(&key, &value)?,
            "FETCH_RETRIES" => config.fetch.retries = parse_env(&key, &value)?,
            _ => {}
        }
    }

    validate(&config)?;
    Ok(config)
}

/// Builds the process configuration: optional file, then process environment
pub fn load_config_from_env(path: Option<&Path>) -> Result<Config, ConfigError> {
    let base = match path {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    apply_env_overrides(base, std::env::vars())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
