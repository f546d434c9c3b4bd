//! Validation of caller-supplied URLs before the server fetches them.
//!
//! Checks run cheapest first; DNS resolution is the last step. The fetch
//! itself resolves the host again when it connects, so a DNS answer that
//! changes between the two lookups is not caught here.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::{Host, Url};

/// Longest raw URL accepted, in characters
pub const MAX_URL_LENGTH: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("url is longer than {MAX_URL_LENGTH} characters")]
    TooLong,
    #[error("url is malformed: {0}")]
    Malformed(String),
    #[error("scheme {0:?} is not allowed")]
    SchemeNotAllowed(String),
    #[error("port {0} is not allowed")]
    PortNotAllowed(u16),
    #[error("host {0:?} is not allowed")]
    HostNotAllowed(String),
}

/// A URL that passed validation, consumed by the outbound client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub url: Url,
}

/// How hostnames are turned into addresses
pub enum Resolver {
    /// System resolver via `tokio::net::lookup_host`
    System,
    /// Fixed table (tests, offline operation). Unknown names fail to resolve.
    Static(HashMap<String, Vec<IpAddr>>),
}

impl Resolver {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<IpAddr>, FetchError> {
        match self {
            Resolver::System => {
                let addrs = tokio::net::lookup_host((host, port))
                    .await
                    .map_err(|e| FetchError::Malformed(format!("cannot resolve {host}: {e}")))?;
                Ok(addrs.map(|a| a.ip()).collect())
            }
            Resolver::Static(table) => table
                .get(host)
                .cloned()
                .ok_or_else(|| FetchError::Malformed(format!("cannot resolve {host}"))),
        }
    }
}

/// SSRF gate for outbound fetches
pub struct FetchGuard {
    resolver: Resolver,
}

impl FetchGuard {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }

    /// Validate `raw` and describe where the fetch will go
    pub async fn validate(&self, raw: &str) -> Result<FetchTarget, FetchError> {
        if raw.chars().count() > MAX_URL_LENGTH {
            return Err(FetchError::TooLong);
        }

        // Url::parse rejects relative references, which covers non-absolute input
        let url = Url::parse(raw).map_err(|e| FetchError::Malformed(e.to_string()))?;

        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(FetchError::SchemeNotAllowed(scheme.to_string()));
        }

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(FetchError::Malformed("missing host".to_string())),
        };

        // Bare names (localhost, intranet hosts, bracketed IPv6) are refused outright
        if !host.contains('.') {
            return Err(FetchError::HostNotAllowed(host));
        }

        if let Some(port) = url.port() {
            if port != 80 && port != 443 {
                return Err(FetchError::PortNotAllowed(port));
            }
        }
        let port = url
            .port_or_known_default()
            .ok_or_else(|| FetchError::Malformed("missing port".to_string()))?;

        let addrs = match url.host() {
            Some(Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
            Some(Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
            _ => self.resolver.resolve(&host, port).await?,
        };
        if addrs.is_empty() {
            return Err(FetchError::Malformed(format!("{host} has no addresses")));
        }
        if let Some(ip) = addrs.iter().find(|ip| is_forbidden(ip)) {
            tracing::debug!(host = %host, %ip, "Host resolves to a forbidden address");
            return Err(FetchError::HostNotAllowed(host));
        }

        Ok(FetchTarget {
            scheme: scheme.to_string(),
            host,
            port,
            url,
        })
    }
}

/// Loopback, link-local (unicast or multicast), private or unspecified
pub fn is_forbidden(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_forbidden_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_forbidden_v4(&v4),
            None => is_forbidden_v6(v6),
        },
    }
}

fn is_forbidden_v4(ip: &Ipv4Addr) -> bool {
    let link_local_multicast = ip.octets()[..3] == [224, 0, 0];
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || link_local_multicast
        || ip.is_unspecified()
}

fn is_forbidden_v6(ip: &Ipv6Addr) -> bool {
    let segments = ip.segments();
    let unique_local = (segments[0] & 0xfe00) == 0xfc00;
    let link_local_unicast = (segments[0] & 0xffc0) == 0xfe80;
    let link_local_multicast = (segments[0] & 0xff0f) == 0xff02;
    ip.is_loopback() || ip.is_unspecified() || unique_local || link_local_unicast || link_local_multicast
}
