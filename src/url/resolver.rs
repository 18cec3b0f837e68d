//! DNS resolution seam
//!
//! The validator never resolves names itself; it asks a [`Resolver`]. The
//! default [`SystemResolver`] uses the OS resolver through tokio, while
//! [`StaticResolver`] answers from a fixed table (tests, pinned deployments).

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;

/// Resolves a hostname to every address it currently maps to
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Returns all A/AAAA answers for `host`
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo` via tokio)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Resolver that answers from an in-memory table
///
/// Unknown hosts fail with `NotFound`, like NXDOMAIN.
///
/// # Example
///
/// ```
/// use safe_fetch::url::StaticResolver;
///
/// let resolver = StaticResolver::new()
///     .with_host("example.com", vec!["93.184.216.34".parse().unwrap()]);
/// assert!(resolver.contains("EXAMPLE.com"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the answers for a host
    pub fn with_host(mut self, host: &str, ips: Vec<IpAddr>) -> Self {
        self.entries.insert(host.to_lowercase(), ips);
        self
    }

    pub fn contains(&self, host: &str) -> bool {
        self.entries.contains_key(&host.to_lowercase())
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        self.entries
            .get(&host.to_lowercase())
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such host: {}", host)))
    }
}
