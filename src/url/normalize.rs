use crate::UrlError;
use url::Url;

/// Normalizes a URL into its crawl deduplication form
///
/// The normalized URL is only a key for the visited set; the crawler still
/// fetches links exactly as discovered (minus the fragment), since servers may
/// treat `/docs` and `/docs/` differently.
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require `http` or `https`
/// 3. Lowercase the host and drop a trailing dot (the parser already drops
///    default ports and resolves dot segments)
/// 4. Remove the trailing slash (except for the root `/`)
/// 5. Remove the fragment
///
/// The query is kept exactly as written.
///
/// # Examples
///
/// ```
/// use safe_fetch::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM:80/page/#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?;
    if host.is_empty() {
        return Err(UrlError::MissingHost);
    }
    let lowered = host.to_lowercase();
    let trimmed = lowered.trim_end_matches('.');
    if trimmed != host {
        url.set_host(Some(trimmed))
            .map_err(|e| UrlError::Parse(e.to_string()))?;
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
        if url.path().is_empty() {
            url.set_path("/");
        }
    }

    url.set_fragment(None);

    Ok(url)
}

/// Returns the deduplication key for an already parsed URL
///
/// Falls back to the URL with only its fragment removed when normalization
/// fails, so every URL still gets a stable key.
pub fn dedup_key(url: &Url) -> String {
    match normalize_url(url.as_str()) {
        Ok(normalized) => normalized.into(),
        Err(_) => {
            let mut stripped = url.clone();
            stripped.set_fragment(None);
            stripped.into()
        }
    }
}
