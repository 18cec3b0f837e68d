//! Fetcher tests against a mock server

use crate::common::*;
use safe_fetch::config::Config;
use safe_fetch::crawler::ByteBudget;
use safe_fetch::{ErrorKind, Fetcher, GatewayError, Validator};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pipeline(config: &Config) -> (Validator, Fetcher) {
    let validator = Validator::with_resolver(config, Arc::new(resolver()));
    let fetcher = Fetcher::new(config, validator.clone());
    (validator, fetcher)
}

async fn fetch(config: &Config, url: &str) -> Result<safe_fetch::FetchedPage, GatewayError> {
    let (validator, fetcher) = pipeline(config);
    let validated = validator.validate(url).await?;
    fetcher.fetch(&validated, &fetcher.default_budget()).await
}

#[tokio::test]
async fn test_fetch_html_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html("<p>hello</p>").insert_header("x-served-by", "mock"))
        .mount(&server)
        .await;

    let page = fetch(&test_config(), &url_on(&server, SITE, "/page")).await.unwrap();

    assert_eq!(page.status_code, 200);
    assert_eq!(page.final_url.as_str(), url_on(&server, SITE, "/page"));
    assert!(page.content_type.starts_with("text/html"));
    assert_eq!(page.raw_bytes, b"<p>hello</p>");
    assert_eq!(page.headers.get("x-served-by").map(String::as_str), Some("mock"));
}

#[tokio::test]
async fn test_sends_configured_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ua"))
        .and(wiremock::matchers::header("user-agent", "safe-fetch-tests/1.0"))
        .respond_with(html("ok"))
        .expect(1)
        .mount(&server)
        .await;

    fetch(&test_config(), &url_on(&server, SITE, "/ua")).await.unwrap();
}

#[tokio::test]
async fn test_follows_redirect_chain() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r1"))
        .respond_with(redirect(301, "/r2"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r2"))
        .respond_with(redirect(307, &url_on(&server, OTHER, "/final")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/final"))
        .respond_with(html("<p>done</p>"))
        .mount(&server)
        .await;

    let page = fetch(&test_config(), &url_on(&server, SITE, "/r1")).await.unwrap();
    assert_eq!(page.final_url.as_str(), url_on(&server, OTHER, "/final"));
}

#[tokio::test]
async fn test_redirect_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(redirect(302, "/loop"))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.fetch.max_redirects = 2;

    let err = fetch(&config, &url_on(&server, SITE, "/loop")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamError);
    // One initial request plus two followed hops
    assert_eq!(hits(&server, "/loop").await, 3);
}

#[tokio::test]
async fn test_redirect_to_link_local_is_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hop"))
        .respond_with(redirect(302, "http://169.254.169.254/latest/meta-data/iam"))
        .mount(&server)
        .await;

    let err = fetch(&test_config(), &url_on(&server, SITE, "/hop")).await.unwrap_err();
    assert!(matches!(err, GatewayError::SsrfBlocked { .. }));
}

#[tokio::test]
async fn test_redirect_with_bad_scheme_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ftp"))
        .respond_with(redirect(302, "ftp://example.test/file"))
        .mount(&server)
        .await;

    let err = fetch(&test_config(), &url_on(&server, SITE, "/ftp")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidUrl);
}

#[tokio::test]
async fn test_non_success_status_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = fetch(&test_config(), &url_on(&server, SITE, "/missing")).await.unwrap_err();
    match err {
        GatewayError::Upstream { status, .. } => assert_eq!(status, Some(404)),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_content_type_allow_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"<rss/>".to_vec(), "application/rss+xml"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"{}".to_vec(), "application/json"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/image"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .mount(&server)
        .await;

    let config = test_config();
    assert!(fetch(&config, &url_on(&server, SITE, "/feed")).await.is_ok());

    for route in ["/data", "/image"] {
        let err = fetch(&config, &url_on(&server, SITE, route)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedContentType, "{}", route);
    }
}

#[tokio::test]
async fn test_body_over_budget_is_too_large() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(html("x".repeat(10_000)))
        .mount(&server)
        .await;

    let config = test_config();
    let (validator, fetcher) = pipeline(&config);
    let validated = validator.validate(&url_on(&server, SITE, "/huge")).await.unwrap();

    let err = fetcher
        .fetch(&validated, &ByteBudget::per_page(1_000))
        .await
        .unwrap_err();
    match err {
        GatewayError::TooLarge { limit, .. } => assert_eq!(limit, 1_000),
        other => panic!("unexpected error: {:?}", other),
    }

    // Exactly at the limit is fine
    let page = fetcher
        .fetch(&validated, &ByteBudget::per_page(10_000))
        .await
        .unwrap();
    assert_eq!(page.raw_bytes.len(), 10_000);
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("late").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.fetch.timeout_seconds = 1;

    let err = fetch(&config, &url_on(&server, SITE, "/slow")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn test_pinned_connection_ignores_later_dns_answers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pinned"))
        .respond_with(html("pinned"))
        .mount(&server)
        .await;

    let config = test_config();
    let (validator, _) = pipeline(&config);
    let validated = validator.validate(&url_on(&server, SITE, "/pinned")).await.unwrap();
    assert_eq!(validated.resolved_ips().len(), 1);

    // A fetcher whose own validator would now answer with a blocked address
    // still connects to the address recorded at validation time
    let rebinding = safe_fetch::url::StaticResolver::new()
        .with_host(SITE, vec!["10.9.9.9".parse().unwrap()]);
    let fetcher = Fetcher::new(&config, Validator::with_resolver(&config, Arc::new(rebinding)));

    let page = fetcher.fetch(&validated, &fetcher.default_budget()).await.unwrap();
    assert_eq!(page.raw_bytes, b"pinned");
}
