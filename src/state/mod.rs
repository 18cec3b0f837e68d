//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PageStage`: Tracks the stage of individual pages (pending, fetching, sanitizing, done, ...)
//! - `CrawlState`: Frontier, visited set, page slots and byte counter of one crawl

mod crawl_state;
mod page_stage;

// Re-export main types
pub use crawl_state::{CrawlState, FrontierEntry};
pub use page_stage::PageStage;
