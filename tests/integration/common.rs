//! Shared fixtures for the integration tests
//!
//! Every test host resolves through a static table. Hosts that should be
//! reachable map to the mock server's loopback address (the test config turns
//! on `allow-loopback`); adversarial hosts map to private and link-local
//! addresses, which stay blocked.

use safe_fetch::config::Config;
use safe_fetch::url::StaticResolver;
use safe_fetch::Coordinator;
use std::net::IpAddr;
use std::sync::Arc;
use wiremock::{MockServer, ResponseTemplate};

/// Seed site
pub const SITE: &str = "example.test";

/// A second public-looking site
pub const OTHER: &str = "other.test";

/// Resolves into RFC 1918 space
pub const EVIL: &str = "evil-internal.test";

/// Resolves to the cloud metadata address
pub const METADATA: &str = "metadata.test";

/// Configuration suitable for talking to a local mock server
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.security.allow_loopback = true;
    config.fetch.timeout_seconds = 5;
    config.fetch.user_agent = "safe-fetch-tests/1.0".to_string();
    config.crawl.deadline_seconds = 30;
    config
}

pub fn resolver() -> StaticResolver {
    let loopback: IpAddr = "127.0.0.1".parse().unwrap();
    StaticResolver::new()
        .with_host(SITE, vec![loopback])
        .with_host(&format!("www.{}", SITE), vec![loopback])
        .with_host(OTHER, vec![loopback])
        .with_host(EVIL, vec!["10.0.0.5".parse().unwrap()])
        .with_host(METADATA, vec!["169.254.169.254".parse().unwrap()])
        .with_host("split.test", vec![loopback, "192.168.1.10".parse().unwrap()])
}

pub fn coordinator(config: Config) -> Coordinator {
    Coordinator::with_resolver(config, Arc::new(resolver()))
}

/// URL of `path` on the mock server, addressed through `host`
pub fn url_on(server: &MockServer, host: &str, path: &str) -> String {
    format!("http://{}:{}{}", host, server.address().port(), path)
}

/// An HTML page response
pub fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into().into_bytes(), "text/html")
}

/// A redirect to `location`
pub fn redirect(status: u16, location: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).insert_header("location", location)
}

/// Pads `body` with trailing spaces to exactly `len` bytes
pub fn padded(mut body: String, len: usize) -> String {
    assert!(body.len() <= len, "body already longer than {}", len);
    while body.len() < len {
        body.push(' ');
    }
    body
}

/// A minimal HTML document with a title and the given links
pub fn page_with_links(title: &str, links: &[String]) -> String {
    let anchors: String = links
        .iter()
        .map(|link| format!(r#"<a href="{}">{}</a>"#, link, link))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "<html><head><title>{}</title></head><body><h1>{}</h1>\n{}\n</body></html>",
        title, title, anchors
    )
}

/// Number of requests the server saw for `path`
pub async fn hits(server: &MockServer, path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == path)
        .count()
}
