//! Crawler coordinator - breadth-first crawl orchestration
//!
//! This module contains the crawl loop that ties the pieces together:
//! - Validating the request and the seed
//! - Expanding the frontier one layer at a time, in link-discovery order
//! - Running bounded concurrent fetch tasks under a shared byte budget
//! - Sanitizing results on the coordinator task
//! - Building the result manifest and enforcing the stop conditions

use crate::config::Config;
use crate::crawler::fetcher::{AggregateBytes, ByteBudget, FetchedPage, Fetcher};
use crate::crawler::request::CrawlRequest;
use crate::crawler::sanitizer::Sanitizer;
use crate::output::{
    AggregatedResult, CrawlStats, CrawledPage, FailureRecord, SkipReason, SkipRecord, StopReason,
};
use crate::state::{CrawlState, FrontierEntry, PageStage};
use crate::url::{dedup_key, extract_host, Resolver, SystemResolver, ValidatedUrl, Validator};
use crate::GatewayError;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};
use url::Url;

/// Most entries kept in each manifest list; the stats keep the full counts
const MAX_MANIFEST_RECORDS: usize = 1000;

/// Result of one spawned task
enum TaskOutcome {
    /// A same-domain page: validated and fetched
    Fetched(Result<FetchedPage, GatewayError>),
    /// An off-domain link: validated only
    Checked(Result<ValidatedUrl, GatewayError>),
}

/// Main crawler coordinator structure
///
/// Holds the configured validator, fetcher and sanitizer. One coordinator can
/// serve any number of crawls; all per-crawl state lives inside
/// [`Coordinator::crawl`].
pub struct Coordinator {
    config: Arc<Config>,
    validator: Validator,
    fetcher: Fetcher,
    sanitizer: Sanitizer,
}

impl Coordinator {
    /// Creates a coordinator that resolves hostnames with the system resolver
    pub fn new(config: Config) -> Self {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    /// Creates a coordinator with a custom DNS resolver
    pub fn with_resolver(config: Config, resolver: Arc<dyn Resolver>) -> Self {
        let validator = Validator::with_resolver(&config, resolver);
        let fetcher = Fetcher::new(&config, validator.clone());
        let sanitizer = Sanitizer::new(&config);

        Self {
            config: Arc::new(config),
            validator,
            fetcher,
            sanitizer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one crawl
    ///
    /// # Errors
    ///
    /// * `InvalidRequest` - the request is out of bounds; nothing was fetched
    /// * any validation, fetch or sanitize error of the seed itself
    ///
    /// Failures of every other URL are recorded in the result's manifest. The
    /// overall deadline is a graceful stop: the pages collected so far are
    /// returned with `stop_reason = deadline`.
    pub async fn crawl(&self, request: &CrawlRequest) -> Result<AggregatedResult, GatewayError> {
        request.validate(&self.config.crawl)?;

        let started_at = Utc::now();
        let clock = Instant::now();
        let deadline = clock + self.config.crawl.deadline();
        let bytes = Arc::new(AggregateBytes::new(self.config.crawl.max_total_bytes));
        let budget = ByteBudget::shared(self.config.fetch.max_html_bytes, bytes.clone());

        tracing::info!(
            "Starting crawl of {} (depth {}, max {} pages, same domain only: {})",
            request.url,
            request.depth,
            request.max_pages,
            request.same_domain_only
        );

        let mut run = CrawlRun::new(request, CrawlState::new(request.max_pages as usize, bytes));

        // Seed failures are fatal; there is nothing to crawl without it
        let seed = match timeout_at(deadline, self.fetch_seed(&request.url, &budget)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(GatewayError::Timeout {
                    url: request.url.clone(),
                })
            }
        };
        run.accept_seed(seed);

        let mut stop = None;
        while run.state.has_pending() {
            if Instant::now() >= deadline {
                stop = Some(StopReason::Deadline);
                break;
            }
            if run.state.page_limit_reached() {
                stop = Some(StopReason::PageLimit);
                break;
            }
            if run.state.byte_limit_reached() {
                stop = Some(StopReason::ByteLimit);
                break;
            }

            let layer = run.state.drain_pending();
            if let Some(reason) = self.run_layer(&mut run, layer, &budget, deadline).await {
                stop = Some(reason);
                break;
            }
        }

        let stop_reason = stop.unwrap_or(StopReason::FrontierExhausted);
        let result = run.finish(stop_reason, started_at, clock.elapsed().as_millis() as u64);

        tracing::info!(
            "Crawl of {} finished: {} pages, {} failures, {} skipped, {} bytes ({})",
            result.seed,
            result.stats.pages_fetched,
            result.stats.failures,
            result.stats.skipped,
            result.stats.total_bytes,
            result.stop_reason
        );

        Ok(result)
    }

    /// Validates, fetches and sanitizes the seed
    async fn fetch_seed(&self, raw: &str, budget: &ByteBudget) -> Result<SeedPage, GatewayError> {
        let validated = timeout(self.config.fetch.timeout(), self.validator.validate(raw))
            .await
            .map_err(|_| GatewayError::Timeout { url: raw.to_string() })??;
        let page = self.fetcher.fetch(&validated, budget).await?;
        let status_code = page.status_code;
        let final_url = page.final_url.clone();
        let content = self.sanitizer.sanitize(page)?;

        Ok(SeedPage {
            requested: validated.url().clone(),
            final_url,
            page: CrawledPage {
                depth: 0,
                status_code,
                content,
            },
        })
    }

    /// Processes one breadth-first layer
    ///
    /// Entries are dispatched in discovery order, at most `concurrency` at a
    /// time. Each same-domain page claims a slot against `max_pages` when it is
    /// dispatched and gives it back if it fails, so the pages kept are the
    /// first successful ones in discovery order. Returns a stop reason when the
    /// crawl must end before the frontier runs dry.
    async fn run_layer(
        &self,
        run: &mut CrawlRun,
        layer: Vec<FrontierEntry>,
        budget: &ByteBudget,
        deadline: Instant,
    ) -> Option<StopReason> {
        let concurrency = self.config.crawl.concurrency.max(1) as usize;
        let validate_limit = self.config.fetch.timeout();
        let mut tasks: JoinSet<(usize, TaskOutcome)> = JoinSet::new();
        let mut in_flight: HashSet<usize> = HashSet::new();
        let mut pages: Vec<(usize, CrawledPage)> = Vec::new();
        let mut failures: Vec<(usize, FailureRecord)> = Vec::new();
        let mut next = 0;
        let mut stop = None;

        tracing::debug!("Processing layer of {} URLs", layer.len());

        loop {
            while stop.is_none() && next < layer.len() && tasks.len() < concurrency {
                if Instant::now() >= deadline {
                    stop = Some(StopReason::Deadline);
                    break;
                }
                if run.state.byte_limit_reached() {
                    stop = Some(StopReason::ByteLimit);
                    break;
                }

                let entry = &layer[next];
                if entry.off_domain {
                    run.state.begin_check(&entry.key);
                    let validator = self.validator.clone();
                    let url = entry.url.clone();
                    let index = next;
                    tasks.spawn(async move {
                        let checked = validate_within(&validator, &url, validate_limit).await;
                        (index, TaskOutcome::Checked(checked))
                    });
                } else {
                    if !run.state.can_dispatch() {
                        break;
                    }
                    run.state.reserve(&entry.key);
                    let validator = self.validator.clone();
                    let fetcher = self.fetcher.clone();
                    let budget = budget.clone();
                    let url = entry.url.clone();
                    let index = next;
                    tasks.spawn(async move {
                        let result = match validate_within(&validator, &url, validate_limit).await {
                            Ok(validated) => fetcher.fetch(&validated, &budget).await,
                            Err(err) => Err(err),
                        };
                        (index, TaskOutcome::Fetched(result))
                    });
                }
                in_flight.insert(next);
                next += 1;
            }

            if tasks.is_empty() {
                break;
            }

            let next_done = timeout_at(deadline, tasks.join_next()).await;
            let joined = match next_done {
                Ok(Some(joined)) => joined,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("Crawl deadline reached with {} fetches in flight", tasks.len());
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}

                    let mut abandoned: Vec<usize> = in_flight.drain().collect();
                    abandoned.sort_unstable();
                    for index in abandoned {
                        let entry = &layer[index];
                        if entry.off_domain {
                            run.state.finish_check(&entry.key, PageStage::Skipped);
                        } else {
                            run.state.release(&entry.key, PageStage::Skipped);
                        }
                        run.record_skip(entry.url.as_str(), SkipReason::Deadline);
                    }
                    stop = Some(StopReason::Deadline);
                    break;
                }
            };

            let (index, outcome) = match joined {
                Ok(joined) => joined,
                Err(err) => {
                    // Tasks never panic in practice; the slot is settled below
                    tracing::error!("Fetch task failed: {}", err);
                    continue;
                }
            };
            in_flight.remove(&index);
            let entry = &layer[index];

            match outcome {
                TaskOutcome::Checked(Ok(_)) => {
                    tracing::trace!("Skipping off-domain link {}", entry.url);
                    run.state.finish_check(&entry.key, PageStage::Skipped);
                    run.record_skip(entry.url.as_str(), SkipReason::OffDomain);
                }
                TaskOutcome::Checked(Err(err)) | TaskOutcome::Fetched(Err(err)) => {
                    tracing::warn!("Failed {}: {}", entry.url, err);
                    if entry.off_domain {
                        run.state.finish_check(&entry.key, PageStage::Failed);
                    } else {
                        run.state.release(&entry.key, PageStage::Failed);
                    }
                    failures.push((index, FailureRecord::from_error(entry.url.as_str(), &err)));
                }
                TaskOutcome::Fetched(Ok(page)) => {
                    self.sanitize_page(run, entry, page, index, &mut pages, &mut failures);
                }
            }
        }

        // Tasks that died without reporting back
        let mut lost: Vec<usize> = in_flight.drain().collect();
        lost.sort_unstable();
        for index in lost {
            let entry = &layer[index];
            let err = GatewayError::Client("fetch task aborted".to_string());
            if entry.off_domain {
                run.state.finish_check(&entry.key, PageStage::Failed);
            } else {
                run.state.release(&entry.key, PageStage::Failed);
            }
            failures.push((index, FailureRecord::from_error(entry.url.as_str(), &err)));
        }

        pages.sort_by_key(|(index, _)| *index);
        failures.sort_by_key(|(index, _)| *index);
        for (_, failure) in failures {
            run.record_failure(failure);
        }
        for (_, page) in pages {
            run.accept_page(page);
        }

        if stop.is_none() && next < layer.len() {
            // Entries left undispatched: the page or byte cap ended the layer
            stop = Some(if run.state.byte_limit_reached() {
                StopReason::ByteLimit
            } else {
                StopReason::PageLimit
            });
        }

        stop
    }

    /// Sanitizes a fetched page on the coordinator task
    fn sanitize_page(
        &self,
        run: &mut CrawlRun,
        entry: &FrontierEntry,
        page: FetchedPage,
        index: usize,
        pages: &mut Vec<(usize, CrawledPage)>,
        failures: &mut Vec<(usize, FailureRecord)>,
    ) {
        if !run.is_on_domain(&page.final_url) {
            tracing::debug!("{} redirected off domain to {}", entry.url, page.final_url);
            run.state.release(&entry.key, PageStage::Skipped);
            run.record_skip(page.final_url.as_str(), SkipReason::OffDomain);
            return;
        }

        // A redirect onto a URL this crawl already covers adds nothing new
        if dedup_key(&page.final_url) != entry.key && !run.state.mark_visited(&page.final_url) {
            tracing::debug!("{} redirected to already visited {}", entry.url, page.final_url);
            run.state.release(&entry.key, PageStage::Skipped);
            run.stats.duplicate_links += 1;
            return;
        }

        run.state.begin_sanitize(&entry.key);
        let status_code = page.status_code;

        match self.sanitizer.sanitize(page) {
            Ok(content) => {
                tracing::debug!("Crawled {} ({} links)", content.url, content.links.len());
                run.state.complete(&entry.key);
                pages.push((
                    index,
                    CrawledPage {
                        depth: entry.depth,
                        status_code,
                        content,
                    },
                ));
            }
            Err(err) => {
                tracing::warn!("Failed to sanitize {}: {}", entry.url, err);
                run.state.release(&entry.key, PageStage::Failed);
                failures.push((index, FailureRecord::from_error(entry.url.as_str(), &err)));
            }
        }
    }
}

/// The seed page plus the URLs it answered under
struct SeedPage {
    requested: Url,
    final_url: Url,
    page: CrawledPage,
}

/// Everything one crawl accumulates
struct CrawlRun {
    seed: String,
    max_depth: u32,
    same_domain_only: bool,
    allowed_hosts: HashSet<String>,
    state: CrawlState,
    pages: Vec<CrawledPage>,
    failures: Vec<FailureRecord>,
    skipped: Vec<SkipRecord>,
    stats: CrawlStats,
}

impl CrawlRun {
    fn new(request: &CrawlRequest, state: CrawlState) -> Self {
        Self {
            seed: request.url.clone(),
            max_depth: request.depth,
            same_domain_only: request.same_domain_only,
            allowed_hosts: HashSet::new(),
            state,
            pages: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            stats: CrawlStats::default(),
        }
    }

    fn accept_seed(&mut self, seed: SeedPage) {
        // The seed counts as on-domain under both the requested and the redirected host
        self.allowed_hosts.extend(extract_host(&seed.requested));
        self.allowed_hosts.extend(extract_host(&seed.final_url));

        self.state.admit(seed.requested.clone(), 0, false);
        let key = dedup_key(&seed.requested);
        self.state.drain_pending();
        self.state.reserve(&key);
        self.state.begin_sanitize(&key);
        self.state.complete(&key);
        self.state.mark_visited(&seed.final_url);

        tracing::debug!("Seed {} fetched", seed.final_url);
        self.accept_page(seed.page);
    }

    /// Adds a finished page and queues its links for the next layer
    fn accept_page(&mut self, page: CrawledPage) {
        if page.depth < self.max_depth {
            self.enqueue_links(&page.content.links, page.depth + 1);
        }
        self.stats.max_depth_reached = self.stats.max_depth_reached.max(page.depth);
        self.pages.push(page);
    }

    fn enqueue_links(&mut self, links: &[String], depth: u32) {
        for link in links {
            let Ok(url) = Url::parse(link) else {
                continue;
            };

            let off_domain = !self.is_on_domain(&url);

            if self.state.admit(url, depth, off_domain) {
                tracing::trace!("Queued {} at depth {} (off domain: {})", link, depth, off_domain);
            } else {
                self.stats.duplicate_links += 1;
            }
        }
    }

    /// False only for hosts outside the seed's when the crawl is domain-bound
    fn is_on_domain(&self, url: &Url) -> bool {
        !self.same_domain_only
            || extract_host(url)
                .map(|host| self.allowed_hosts.contains(&host))
                .unwrap_or(false)
    }

    fn record_failure(&mut self, failure: FailureRecord) {
        self.stats.record_failure(failure.error_kind);
        if self.failures.len() < MAX_MANIFEST_RECORDS {
            self.failures.push(failure);
        }
    }

    fn record_skip(&mut self, url: &str, reason: SkipReason) {
        self.stats.skipped += 1;
        if self.skipped.len() < MAX_MANIFEST_RECORDS {
            self.skipped.push(SkipRecord {
                url: url.to_string(),
                reason,
            });
        }
    }

    fn finish(mut self, stop_reason: StopReason, started_at: chrono::DateTime<Utc>, duration_ms: u64) -> AggregatedResult {
        self.stats.pages_fetched = self.pages.len();
        self.stats.total_bytes = self.state.total_bytes_fetched();
        self.stats.duration_ms = duration_ms;

        AggregatedResult {
            seed: self.seed,
            pages: self.pages,
            failures: self.failures,
            skipped: self.skipped,
            stats: self.stats,
            stop_reason,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Validates `url`, giving up after `limit`
async fn validate_within(
    validator: &Validator,
    url: &Url,
    limit: Duration,
) -> Result<ValidatedUrl, GatewayError> {
    match timeout(limit, validator.validate_url(url)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout {
            url: url.to_string(),
        }),
    }
}

/// Runs a crawl with the system resolver
///
/// This is the main entry point for one-shot crawls; long-lived callers
/// should keep a [`Coordinator`] instead.
pub async fn run_crawl(config: Config, request: &CrawlRequest) -> Result<AggregatedResult, GatewayError> {
    Coordinator::new(config).crawl(request).await
}
