//! End-to-end crawl tests against a mock server

use crate::common::*;
use async_trait::async_trait;
use safe_fetch::output::{SkipReason, StopReason};
use safe_fetch::url::{Resolver, StaticResolver};
use safe_fetch::{Coordinator, CrawlRequest, ErrorKind};
use std::collections::HashSet;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_page(server: &MockServer, route: &str, title: &str, links: &[String]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(page_with_links(title, links)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_filters_ssrf_and_off_domain_links() {
    let server = MockServer::start().await;

    mount_page(
        &server,
        "/",
        "Home",
        &[
            "/a".to_string(),
            url_on(&server, EVIL, "/"),
            "/b".to_string(),
            url_on(&server, OTHER, "/c"),
        ],
    )
    .await;
    mount_page(&server, "/a", "Page A", &[]).await;
    mount_page(&server, "/b", "Page B", &[]).await;

    let request = CrawlRequest::new(url_on(&server, SITE, "/"))
        .with_depth(1)
        .with_max_pages(3);
    let result = coordinator(test_config()).crawl(&request).await.unwrap();

    assert_eq!(
        result.page_urls(),
        vec![
            url_on(&server, SITE, "/"),
            url_on(&server, SITE, "/a"),
            url_on(&server, SITE, "/b"),
        ]
    );
    assert_eq!(result.pages[0].depth, 0);
    assert_eq!(result.pages[1].depth, 1);
    assert_eq!(result.pages[1].content.title, "Page A");

    let evil = result
        .failure_for(&url_on(&server, EVIL, "/"))
        .expect("SSRF link must be in the manifest");
    assert_eq!(evil.error_kind, ErrorKind::SsrfBlocked);
    assert!(!evil.message.contains("10.0.0.5"));

    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].url, url_on(&server, OTHER, "/c"));
    assert_eq!(result.skipped[0].reason, SkipReason::OffDomain);

    // The off-domain page was never requested
    assert_eq!(hits(&server, "/c").await, 0);
    assert_eq!(result.stop_reason, StopReason::FrontierExhausted);
}

#[tokio::test]
async fn test_unsupported_sibling_is_recorded_and_crawl_continues() {
    let server = MockServer::start().await;

    mount_page(&server, "/", "Home", &["/doc.pdf".to_string(), "/next".to_string()]).await;
    Mock::given(method("GET"))
        .and(path("/doc.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.7 binary".to_vec(), "application/pdf"))
        .mount(&server)
        .await;
    mount_page(&server, "/next", "Next", &[]).await;

    let request = CrawlRequest::new(url_on(&server, SITE, "/")).with_depth(1);
    let result = coordinator(test_config()).crawl(&request).await.unwrap();

    assert_eq!(result.pages.len(), 2);
    assert_eq!(result.pages[1].content.title, "Next");

    let pdf = result.failure_for(&url_on(&server, SITE, "/doc.pdf")).unwrap();
    assert_eq!(pdf.error_kind, ErrorKind::UnsupportedContentType);
    assert_eq!(result.stats.failures, 1);
}

#[tokio::test]
async fn test_failed_page_frees_its_slot() {
    let server = MockServer::start().await;

    mount_page(&server, "/", "Home", &["/broken".to_string(), "/good".to_string()]).await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_page(&server, "/good", "Good", &[]).await;

    let request = CrawlRequest::new(url_on(&server, SITE, "/"))
        .with_depth(1)
        .with_max_pages(2);
    let result = coordinator(test_config()).crawl(&request).await.unwrap();

    assert_eq!(
        result.page_urls(),
        vec![url_on(&server, SITE, "/"), url_on(&server, SITE, "/good")]
    );
    assert_eq!(
        result.failure_for(&url_on(&server, SITE, "/broken")).unwrap().error_kind,
        ErrorKind::UpstreamError
    );
}

#[tokio::test]
async fn test_cyclic_link_farm_is_bounded() {
    let server = MockServer::start().await;

    let links: Vec<String> = std::iter::once("/".to_string())
        .chain((0..10_000).map(|i| format!("/p{}", i)))
        .collect();
    let farm = page_with_links("Farm", &links);

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(farm.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d+$"))
        .respond_with(html(farm))
        .mount(&server)
        .await;

    let request = CrawlRequest::new(url_on(&server, SITE, "/"))
        .with_depth(2)
        .with_max_pages(10);
    let result = coordinator(test_config()).crawl(&request).await.unwrap();

    assert_eq!(result.pages.len(), 10);
    let unique: HashSet<&str> = result.page_urls().into_iter().collect();
    assert_eq!(unique.len(), 10);
    assert_eq!(result.stop_reason, StopReason::PageLimit);

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.len() <= 10, "made {} requests", requests.len());
}

#[tokio::test]
async fn test_same_domain_only_can_be_disabled() {
    let server = MockServer::start().await;

    mount_page(&server, "/", "Home", &[url_on(&server, OTHER, "/elsewhere")]).await;
    mount_page(&server, "/elsewhere", "Elsewhere", &[]).await;

    let seed = url_on(&server, SITE, "/");

    let restricted = coordinator(test_config())
        .crawl(&CrawlRequest::new(seed.clone()).with_depth(1))
        .await
        .unwrap();
    assert_eq!(restricted.pages.len(), 1);
    assert_eq!(restricted.skipped[0].reason, SkipReason::OffDomain);

    let open = coordinator(test_config())
        .crawl(&CrawlRequest::new(seed).with_depth(1).with_same_domain_only(false))
        .await
        .unwrap();
    assert_eq!(open.pages.len(), 2);
    assert_eq!(open.pages[1].content.url, url_on(&server, OTHER, "/elsewhere"));
    assert!(open.skipped.is_empty());
}

#[tokio::test]
async fn test_redirected_seed_host_counts_as_same_domain() {
    let server = MockServer::start().await;
    let www = format!("www.{}", SITE);

    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(redirect(301, &url_on(&server, &www, "/home")))
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/home",
        "Home",
        &[url_on(&server, SITE, "/a"), url_on(&server, &www, "/b")],
    )
    .await;
    mount_page(&server, "/a", "A", &[]).await;
    mount_page(&server, "/b", "B", &[]).await;

    let request = CrawlRequest::new(url_on(&server, SITE, "/start")).with_depth(1);
    let result = coordinator(test_config()).crawl(&request).await.unwrap();

    assert_eq!(result.pages[0].content.url, url_on(&server, &www, "/home"));
    assert_eq!(result.pages.len(), 3);
    assert!(result.skipped.is_empty());
}

#[tokio::test]
async fn test_oversized_page_never_enters_results() {
    let server = MockServer::start().await;
    let mut config = test_config();
    config.fetch.max_html_bytes = 2_000;

    mount_page(&server, "/", "Home", &["/big".to_string(), "/small".to_string()]).await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(html(padded("<html><body>big</body></html>".to_string(), 50_000)))
        .mount(&server)
        .await;
    mount_page(&server, "/small", "Small", &[]).await;

    let request = CrawlRequest::new(url_on(&server, SITE, "/")).with_depth(1);
    let result = coordinator(config).crawl(&request).await.unwrap();

    assert_eq!(result.pages.len(), 2);
    assert_eq!(
        result.failure_for(&url_on(&server, SITE, "/big")).unwrap().error_kind,
        ErrorKind::TooLarge
    );
    assert!(result.stats.total_bytes <= 10_000_000);
    for page in &result.pages {
        assert!(page.content.main_text.len() <= 2_000);
    }
}

#[tokio::test]
async fn test_aggregate_byte_cap_stops_crawl() {
    let server = MockServer::start().await;
    let mut config = test_config();
    config.fetch.max_html_bytes = 2_000;
    config.crawl.max_total_bytes = 3_000;
    config.crawl.concurrency = 1;

    let children = ["/c1".to_string(), "/c2".to_string(), "/c3".to_string()];
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(padded(page_with_links("Home", &children), 1_500)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/c\d$"))
        .respond_with(html(padded(page_with_links("Child", &[]), 1_500)))
        .mount(&server)
        .await;

    let request = CrawlRequest::new(url_on(&server, SITE, "/")).with_depth(1);
    let result = coordinator(config).crawl(&request).await.unwrap();

    assert_eq!(result.pages.len(), 2);
    assert_eq!(result.stop_reason, StopReason::ByteLimit);
    assert!(result.stats.total_bytes <= 3_000);
    assert_eq!(hits(&server, "/c2").await, 0);
}

#[tokio::test]
async fn test_redirect_to_private_address_is_blocked() {
    let server = MockServer::start().await;

    mount_page(&server, "/", "Home", &["/go".to_string()]).await;
    Mock::given(method("GET"))
        .and(path("/go"))
        .respond_with(redirect(302, &url_on(&server, METADATA, "/latest/meta-data/")))
        .mount(&server)
        .await;

    let request = CrawlRequest::new(url_on(&server, SITE, "/")).with_depth(1);
    let result = coordinator(test_config()).crawl(&request).await.unwrap();

    assert_eq!(result.pages.len(), 1);
    assert_eq!(
        result.failure_for(&url_on(&server, SITE, "/go")).unwrap().error_kind,
        ErrorKind::SsrfBlocked
    );
    assert_eq!(hits(&server, "/latest/meta-data/").await, 0);
}

#[tokio::test]
async fn test_seed_failures_are_hard_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/error"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/binary"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 64], "application/octet-stream"))
        .mount(&server)
        .await;

    let coordinator = coordinator(test_config());
    let cases = [
        (url_on(&server, SITE, "/error"), ErrorKind::UpstreamError),
        (url_on(&server, SITE, "/binary"), ErrorKind::UnsupportedContentType),
        (url_on(&server, EVIL, "/"), ErrorKind::SsrfBlocked),
        (url_on(&server, "split.test", "/"), ErrorKind::SsrfBlocked),
        ("http://169.254.169.254/latest/meta-data/".to_string(), ErrorKind::SsrfBlocked),
        ("http://nowhere.test/".to_string(), ErrorKind::DnsResolutionFailed),
        ("file:///etc/passwd".to_string(), ErrorKind::InvalidUrl),
        ("not a url".to_string(), ErrorKind::InvalidUrl),
    ];

    for (seed, expected) in cases {
        let err = coordinator.crawl(&CrawlRequest::new(seed.clone())).await.unwrap_err();
        assert_eq!(err.kind(), expected, "seed {}", seed);
    }
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_any_fetch() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Home", &[]).await;

    let coordinator = coordinator(test_config());
    let seed = url_on(&server, SITE, "/");

    for request in [
        CrawlRequest::new(seed.clone()).with_depth(3),
        CrawlRequest::new(seed.clone()).with_max_pages(0),
        CrawlRequest::new(seed.clone()).with_max_pages(51),
    ] {
        let err = coordinator.crawl(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    assert_eq!(hits(&server, "/").await, 0);
}

#[tokio::test]
async fn test_deadline_returns_partial_results() {
    let server = MockServer::start().await;
    let mut config = test_config();
    config.crawl.deadline_seconds = 1;
    config.fetch.timeout_seconds = 10;

    mount_page(&server, "/", "Home", &["/slow1".to_string(), "/slow2".to_string()]).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/slow\d$"))
        .respond_with(html("<p>late</p>").set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let started = Instant::now();
    let request = CrawlRequest::new(url_on(&server, SITE, "/")).with_depth(1);
    let result = coordinator(config).crawl(&request).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(result.stop_reason, StopReason::Deadline);
    assert_eq!(result.pages.len(), 1);
    assert_eq!(result.skipped.len(), 2);
    assert!(result.skipped.iter().all(|s| s.reason == SkipReason::Deadline));
    assert!(result.is_partial());
}

#[tokio::test]
async fn test_depth_zero_fetches_only_the_seed() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Home", &["/a".to_string()]).await;
    mount_page(&server, "/a", "A", &[]).await;

    let result = coordinator(test_config())
        .crawl(&CrawlRequest::new(url_on(&server, SITE, "/")))
        .await
        .unwrap();

    assert_eq!(result.pages.len(), 1);
    assert_eq!(result.pages[0].content.links, vec![url_on(&server, SITE, "/a")]);
    assert_eq!(hits(&server, "/a").await, 0);
    assert_eq!(result.stop_reason, StopReason::FrontierExhausted);
}

#[tokio::test]
async fn test_result_serializes_with_flattened_content() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Home", &[]).await;

    let result = coordinator(test_config())
        .crawl(&CrawlRequest::new(url_on(&server, SITE, "/")))
        .await
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["pages"][0]["title"], "Home");
    assert_eq!(json["pages"][0]["depth"], 0);
    assert_eq!(json["pages"][0]["status_code"], 200);
    assert_eq!(json["stop_reason"], "frontier_exhausted");
    assert!(json["pages"][0]["raw_html_preview"].is_string());
}

#[tokio::test]
async fn test_same_domain_link_redirecting_off_domain_is_skipped() {
    let server = MockServer::start().await;

    mount_page(&server, "/", "Home", &["/a".to_string(), "/b".to_string()]).await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(redirect(302, &url_on(&server, OTHER, "/offsite")))
        .mount(&server)
        .await;
    mount_page(&server, "/offsite", "Offsite", &[]).await;
    mount_page(&server, "/b", "B", &[]).await;

    let request = CrawlRequest::new(url_on(&server, SITE, "/")).with_depth(1);
    let result = coordinator(test_config()).crawl(&request).await.unwrap();

    assert_eq!(
        result.page_urls(),
        vec![url_on(&server, SITE, "/"), url_on(&server, SITE, "/b")]
    );
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].url, url_on(&server, OTHER, "/offsite"));
    assert_eq!(result.skipped[0].reason, SkipReason::OffDomain);
    assert!(result.failures.is_empty());
}

#[tokio::test]
async fn test_layer_keeps_discovery_order_when_fetches_finish_out_of_order() {
    let server = MockServer::start().await;

    mount_page(&server, "/", "Home", &["/slow".to_string(), "/fast".to_string()]).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html(page_with_links("Slow", &[])).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;
    mount_page(&server, "/fast", "Fast", &[]).await;

    let request = CrawlRequest::new(url_on(&server, SITE, "/")).with_depth(1);
    let result = coordinator(test_config()).crawl(&request).await.unwrap();

    assert_eq!(
        result.page_urls(),
        vec![
            url_on(&server, SITE, "/"),
            url_on(&server, SITE, "/slow"),
            url_on(&server, SITE, "/fast"),
        ]
    );
}

#[tokio::test]
async fn test_in_flight_fetches_never_exceed_concurrency() {
    let server = MockServer::start().await;

    let links: Vec<String> = (0..6).map(|i| format!("/p{}", i)).collect();
    mount_page(&server, "/", "Home", &links).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d+$"))
        .respond_with(html(page_with_links("Leaf", &[])).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.crawl.concurrency = 2;

    let request = CrawlRequest::new(url_on(&server, SITE, "/"))
        .with_depth(1)
        .with_max_pages(10);
    let started = Instant::now();
    let result = coordinator(config).crawl(&request).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.pages.len(), 7);
    // Six delayed fetches, two at a time, take at least three delays
    assert!(elapsed >= Duration::from_millis(1400), "took {:?}", elapsed);
    // but still overlap
    assert!(elapsed < Duration::from_millis(2800), "took {:?}", elapsed);
}

/// Never answers for one host; delegates everything else
struct StallingResolver {
    stalled: &'static str,
    inner: StaticResolver,
}

#[async_trait]
impl Resolver for StallingResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        if host.eq_ignore_ascii_case(self.stalled) {
            std::future::pending::<()>().await;
        }
        self.inner.resolve(host, port).await
    }
}

#[tokio::test]
async fn test_stalled_dns_lookup_times_out_per_link() {
    let server = MockServer::start().await;
    let stalled = "stalled-dns.test";

    mount_page(
        &server,
        "/",
        "Home",
        &[url_on(&server, stalled, "/"), "/a".to_string()],
    )
    .await;
    mount_page(&server, "/a", "A", &[]).await;

    let mut config = test_config();
    config.fetch.timeout_seconds = 1;
    config.crawl.deadline_seconds = 30;
    let resolver = StallingResolver {
        stalled,
        inner: resolver(),
    };
    let coordinator = Coordinator::with_resolver(config, Arc::new(resolver));

    let request = CrawlRequest::new(url_on(&server, SITE, "/")).with_depth(1);
    let started = Instant::now();
    let result = coordinator.crawl(&request).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.pages.len(), 2);
    assert_eq!(
        result.failure_for(&url_on(&server, stalled, "/")).unwrap().error_kind,
        ErrorKind::Timeout
    );
    assert_eq!(result.stop_reason, StopReason::FrontierExhausted);
}
