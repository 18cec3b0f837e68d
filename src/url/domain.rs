use url::Url;

/// Extracts the host from a URL for same-domain comparisons
///
/// The host is lowercased and a trailing root dot is dropped, so
/// `https://Example.COM./` and `https://example.com/` compare equal. Ports are
/// ignored.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use safe_fetch::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM:8080/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_end_matches('.').to_lowercase())
        .filter(|h| !h.is_empty())
}

/// Returns true if both URLs share the same hostname
pub fn same_host(a: &Url, b: &Url) -> bool {
    match (extract_host(a), extract_host(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
