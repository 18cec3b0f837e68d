//! Integration tests for the gateway
//!
//! These tests use wiremock to create mock HTTP servers and exercise the
//! fetch and crawl pipeline end-to-end.

mod common;
mod crawl_tests;
mod fetch_tests;
