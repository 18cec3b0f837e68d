use crate::config::types::{Config, CrawlConfig, FetchConfig, SanitizerConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_crawl_config(&config.crawl)?;
    validate_sanitizer_config(&config.sanitizer)?;

    if config.fetch.max_html_bytes > config.crawl.max_total_bytes {
        return Err(ConfigError::Validation(format!(
            "max_html_bytes ({}) cannot exceed max_total_bytes ({})",
            config.fetch.max_html_bytes, config.crawl.max_total_bytes
        )));
    }

    Ok(())
}

/// Validates fetch limits
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_html_bytes == 0 {
        return Err(ConfigError::Validation(
            "max_html_bytes must be greater than 0".to_string(),
        ));
    }

    if config.timeout_seconds < 1 || config.timeout_seconds > 300 {
        return Err(ConfigError::Validation(format!(
            "timeout_seconds must be between 1 and 300, got {}",
            config.timeout_seconds
        )));
    }

    if config.retries > 5 {
        return Err(ConfigError::Validation(format!(
            "retries must be at most 5, got {}",
            config.retries
        )));
    }

    if config.max_redirects > 20 {
        return Err(ConfigError::Validation(format!(
            "max_redirects must be at most 20, got {}",
            config.max_redirects
        )));
    }

    validate_user_agent(&config.user_agent)?;

    Ok(())
}

/// Validates crawl limits
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.max_total_bytes == 0 {
        return Err(ConfigError::Validation(
            "max_total_bytes must be greater than 0".to_string(),
        ));
    }

    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.max_depth > 10 {
        return Err(ConfigError::Validation(format!(
            "max_depth must be at most 10, got {}",
            config.max_depth
        )));
    }

    if config.max_pages_ceiling < 1 || config.max_pages_ceiling > 1000 {
        return Err(ConfigError::Validation(format!(
            "max_pages_ceiling must be between 1 and 1000, got {}",
            config.max_pages_ceiling
        )));
    }

    if config.deadline_seconds < 1 {
        return Err(ConfigError::Validation(
            "deadline_seconds must be >= 1".to_string(),
        ));
    }

    if config.max_links_per_page < 1 {
        return Err(ConfigError::Validation(
            "max_links_per_page must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_sanitizer_config(config: &SanitizerConfig) -> Result<(), ConfigError> {
    if config.preview_chars < 1 {
        return Err(ConfigError::Validation(
            "preview_chars must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// Header values must be visible ASCII; reqwest rejects anything else at request time
fn validate_user_agent(user_agent: &str) -> Result<(), ConfigError> {
    if user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if !user_agent.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        return Err(ConfigError::Validation(format!(
            "user_agent must be printable ASCII, got '{}'",
            user_agent
        )));
    }

    Ok(())
}
