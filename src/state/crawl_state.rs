use crate::crawler::AggregateBytes;
use crate::state::PageStage;
use crate::url::dedup_key;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use url::Url;

/// A URL waiting in the crawl frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: Url,

    /// Deduplication key of `url`
    pub key: String,

    /// Link hops from the seed
    pub depth: u32,

    /// Host differs from the seed; only checked, never fetched
    pub off_domain: bool,
}

/// Mutable progress of one crawl
///
/// Owned by the coordinator task alone. Tracks which URLs were seen, the
/// pending frontier, the stage of every admitted page, and the page slots
/// handed out against `max_pages`. Bytes are counted by the shared
/// [`AggregateBytes`] so concurrent fetches are charged as they stream.
#[derive(Debug)]
pub struct CrawlState {
    max_pages: usize,
    visited: HashSet<String>,
    pending: VecDeque<FrontierEntry>,
    stages: HashMap<String, PageStage>,
    pages_fetched: usize,
    reserved: usize,
    bytes: Arc<AggregateBytes>,
}

impl CrawlState {
    pub fn new(max_pages: usize, bytes: Arc<AggregateBytes>) -> Self {
        Self {
            max_pages,
            visited: HashSet::new(),
            pending: VecDeque::new(),
            stages: HashMap::new(),
            pages_fetched: 0,
            reserved: 0,
            bytes,
        }
    }

    /// Adds a URL to the frontier unless it was already seen
    ///
    /// Returns false for duplicates.
    pub fn admit(&mut self, url: Url, depth: u32, off_domain: bool) -> bool {
        let key = dedup_key(&url);
        if !self.visited.insert(key.clone()) {
            return false;
        }
        self.stages.insert(key.clone(), PageStage::Pending);
        self.pending.push_back(FrontierEntry {
            url,
            key,
            depth,
            off_domain,
        });
        true
    }

    /// Records a URL as seen without queueing it (e.g. a redirect target)
    ///
    /// Returns false if it was already seen.
    pub fn mark_visited(&mut self, url: &Url) -> bool {
        self.visited.insert(dedup_key(url))
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(&dedup_key(url))
    }

    /// Takes every pending entry, in admission order
    pub fn drain_pending(&mut self) -> Vec<FrontierEntry> {
        self.pending.drain(..).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// True while another page may be dispatched without risking `max_pages`
    pub fn can_dispatch(&self) -> bool {
        self.pages_fetched + self.reserved < self.max_pages
    }

    /// Claims a page slot and moves the page to `Fetching`
    pub fn reserve(&mut self, key: &str) {
        self.advance(key, PageStage::Fetching);
        self.reserved += 1;
    }

    /// Starts an address check that holds no page slot
    pub fn begin_check(&mut self, key: &str) {
        self.advance(key, PageStage::Fetching);
    }

    /// Ends an address check with `Skipped` or `Failed`
    pub fn finish_check(&mut self, key: &str, outcome: PageStage) {
        self.advance(key, outcome);
    }

    /// Moves a fetched page to `Sanitizing`; it keeps its slot
    pub fn begin_sanitize(&mut self, key: &str) {
        self.advance(key, PageStage::Sanitizing);
    }

    /// Turns a reserved slot into a result page
    pub fn complete(&mut self, key: &str) {
        self.advance(key, PageStage::Done);
        self.reserved = self.reserved.saturating_sub(1);
        self.pages_fetched += 1;
    }

    /// Gives a reserved slot back after the page failed or was abandoned
    pub fn release(&mut self, key: &str, outcome: PageStage) {
        self.advance(key, outcome);
        self.reserved = self.reserved.saturating_sub(1);
    }

    pub fn stage(&self, key: &str) -> Option<PageStage> {
        self.stages.get(key).copied()
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn page_limit_reached(&self) -> bool {
        self.pages_fetched >= self.max_pages
    }

    pub fn total_bytes_fetched(&self) -> u64 {
        self.bytes.used()
    }

    pub fn byte_limit_reached(&self) -> bool {
        self.bytes.is_exhausted()
    }

    fn advance(&mut self, key: &str, next: PageStage) {
        match self.stages.get_mut(key) {
            Some(stage) if stage.can_transition_to(next) => {
                tracing::trace!("{}: {} -> {}", key, stage, next);
                *stage = next;
            }
            Some(stage) => {
                tracing::warn!("Ignoring invalid stage change for {}: {} -> {}", key, stage, next);
            }
            None => {
                tracing::warn!("Stage change for unknown page {}", key);
            }
        }
    }
}
