//! URL validation and SSRF prevention
//!
//! Every URL the gateway is about to fetch goes through [`Validator::validate`]:
//! the seed, every redirect hop, and every link discovered mid-crawl. The
//! resulting [`ValidatedUrl`] records the exact addresses the decision was made
//! on, and the fetcher connects only to those addresses.

use crate::config::Config;
use crate::url::ranges::blocked_range;
use crate::url::resolver::{Resolver, SystemResolver};
use crate::GatewayError;
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use url::{Host, Url};

/// Maximum length of a DNS name (without the trailing dot)
const MAX_HOSTNAME_LEN: usize = 253;

/// Maximum length of a single DNS label
const MAX_LABEL_LEN: usize = 63;

/// Schemes the gateway will fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A URL that passed syntax and address checks
///
/// Only [`Validator`] constructs these, and the fields are read-only. A value is
/// good for one fetch attempt; redirect targets and discovered links get a
/// fresh validation because DNS answers can change between calls.
#[derive(Debug, Clone)]
pub struct ValidatedUrl {
    url: Url,
    raw: String,
    scheme: Scheme,
    hostname: String,
    resolved_ips: BTreeSet<IpAddr>,
    is_public: bool,
}

impl ValidatedUrl {
    /// The input string as supplied by the caller
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The parsed URL (fragment removed)
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Lowercased hostname, or the literal address for IP hosts
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The address set the validation decision was made on
    pub fn resolved_ips(&self) -> &BTreeSet<IpAddr> {
        &self.resolved_ips
    }

    /// False only when loopback addresses were admitted by `allow-loopback`
    pub fn is_public(&self) -> bool {
        self.is_public
    }

    /// Effective port (explicit or scheme default)
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(match self.scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        })
    }

    /// Socket addresses the fetcher is allowed to connect to
    pub fn socket_addrs(&self) -> Vec<SocketAddr> {
        let port = self.port();
        self.resolved_ips
            .iter()
            .map(|ip| SocketAddr::new(*ip, port))
            .collect()
    }

    /// True when the host is a domain name rather than an IP literal
    pub fn has_domain_host(&self) -> bool {
        matches!(self.url.host(), Some(Host::Domain(_)))
    }
}

/// Validates URLs and resolves their hosts through a [`Resolver`]
#[derive(Clone)]
pub struct Validator {
    resolver: Arc<dyn Resolver>,
    allow_loopback: bool,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("allow_loopback", &self.allow_loopback)
            .finish_non_exhaustive()
    }
}

impl Validator {
    /// Creates a validator that uses the system resolver
    pub fn new(config: &Config) -> Self {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    /// Creates a validator with a custom resolver
    pub fn with_resolver(config: &Config, resolver: Arc<dyn Resolver>) -> Self {
        if config.security.allow_loopback {
            tracing::warn!("allow-loopback is enabled: loopback addresses will not be blocked");
        }
        Self {
            resolver,
            allow_loopback: config.security.allow_loopback,
        }
    }

    /// Validates a URL string
    ///
    /// # Steps
    ///
    /// 1. Parse; require `http`/`https`, a well-formed host and no credentials
    /// 2. Resolve the host to all of its addresses (IP literals skip DNS)
    /// 3. Reject if ANY address is in a blocked range
    /// 4. Return the validated URL with the address set used for the decision
    ///
    /// # Errors
    ///
    /// * `InvalidUrl` - malformed URL, unsupported scheme, bad hostname
    /// * `DnsResolutionFailed` - lookup error or no answers
    /// * `SsrfBlocked` - at least one answer is a restricted address
    pub async fn validate(&self, raw: &str) -> Result<ValidatedUrl, GatewayError> {
        let url = Url::parse(raw.trim()).map_err(|e| invalid(raw, &e.to_string()))?;
        self.validate_parsed(raw, url).await
    }

    /// Validates an already parsed URL
    pub async fn validate_url(&self, url: &Url) -> Result<ValidatedUrl, GatewayError> {
        self.validate_parsed(url.as_str(), url.clone()).await
    }

    async fn validate_parsed(&self, raw: &str, mut url: Url) -> Result<ValidatedUrl, GatewayError> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(invalid(raw, &format!("unsupported scheme '{}'", other))),
        };

        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid(raw, "credentials in URL are not allowed"));
        }

        url.set_fragment(None);

        let port = url.port_or_known_default().unwrap_or(match scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        });

        let (hostname, ips) = match url.host().map(|h| h.to_owned()) {
            None => return Err(invalid(raw, "missing host")),
            Some(Host::Ipv4(v4)) => (v4.to_string(), vec![IpAddr::V4(v4)]),
            Some(Host::Ipv6(v6)) => (v6.to_string(), vec![IpAddr::V6(v6)]),
            Some(Host::Domain(domain)) => {
                let hostname = domain.trim_end_matches('.').to_lowercase();
                if !is_valid_hostname(&hostname) {
                    return Err(invalid(raw, "malformed hostname"));
                }
                // The fetcher pins connections by host string, so the URL must
                // carry exactly the name that was resolved
                if hostname != domain {
                    url.set_host(Some(&hostname))
                        .map_err(|e| invalid(raw, &e.to_string()))?;
                }
                let ips = self.resolve(&hostname, port).await?;
                (hostname, ips)
            }
        };

        let mut is_public = true;
        for ip in &ips {
            if let Some(range) = blocked_range(*ip, self.allow_loopback) {
                tracing::warn!("Blocked {}: {} resolves to {} ({})", raw, hostname, ip, range);
                return Err(GatewayError::SsrfBlocked {
                    host: hostname,
                    ip: *ip,
                });
            }
            if blocked_range(*ip, false).is_some() {
                is_public = false;
            }
        }

        tracing::trace!("Validated {} -> {:?}", url, ips);

        Ok(ValidatedUrl {
            url,
            raw: raw.to_string(),
            scheme,
            hostname,
            resolved_ips: ips.into_iter().collect(),
            is_public,
        })
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<IpAddr>, GatewayError> {
        let ips = self
            .resolver
            .resolve(host, port)
            .await
            .map_err(|e| GatewayError::DnsResolutionFailed {
                host: host.to_string(),
                message: e.to_string(),
            })?;

        if ips.is_empty() {
            return Err(GatewayError::DnsResolutionFailed {
                host: host.to_string(),
                message: "no addresses returned".to_string(),
            });
        }

        Ok(ips)
    }
}

/// Checks a lowercased hostname against the strict DNS name pattern
///
/// Labels are `[a-z0-9-]{1,63}` without leading or trailing hyphens, and the
/// whole name is at most 253 characters. Internationalized names arrive here
/// already in punycode form.
pub fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOSTNAME_LEN {
        return false;
    }

    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    })
}

fn invalid(url: &str, reason: &str) -> GatewayError {
    GatewayError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
