//! Client address resolution.
//!
//! The client address is the first available of:
//!
//! 1. a proxy header (`X-Forwarded-For`, first entry, then `X-Real-IP`), only
//!    when `TRUST_PROXY` is enabled and the peer is inside `TRUSTED_PROXIES`
//!    (any peer when that list is empty)
//! 2. the transport peer address from Axum's `ConnectInfo`
//! 3. the literal [`UNKNOWN_IP`]
//!
//! # IP Spoofing
//!
//! Proxy headers are client controlled. Enabling `TRUST_PROXY` on a service that
//! is reachable without going through the proxy lets a client pick its own rate
//! limit bucket. Restrict `TRUSTED_PROXIES` to the proxy's network in production.
//!
//! All requests without an identifiable address share the `"unknown"` bucket.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use thiserror::Error;
use tracing::debug;

/// Fallback value when no client address can be determined.
pub const UNKNOWN_IP: &str = "unknown";

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

// =============================================================================
// CIDR Matching
// =============================================================================

/// Parsed CIDR network range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

/// Error returned for a malformed CIDR string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not an IP address or CIDR range")]
pub struct InvalidCidr(String);

impl FromStr for CidrRange {
    type Err = InvalidCidr;

    /// Parse `"10.0.0.0/8"`, `"::1/128"` or a bare address (implicit /32 or /128).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidCidr(s.to_string());
        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s.trim(), None),
        };

        let network: IpAddr = addr.parse().map_err(|_| invalid())?;
        let max_prefix = Self::max_prefix(&network);
        let prefix_len = match prefix {
            Some(p) => p.parse::<u8>().map_err(|_| invalid())?,
            None => max_prefix,
        };

        if prefix_len > max_prefix {
            return Err(invalid());
        }

        Ok(Self {
            network,
            prefix_len,
        })
    }
}

impl CidrRange {
    fn max_prefix(ip: &IpAddr) -> u8 {
        match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    /// Check if an IP address is contained within this range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves the client address of a request according to the proxy settings.
#[derive(Debug, Clone, Default)]
pub struct ClientAddressResolver {
    trust_proxy: bool,
    trusted_proxies: Vec<CidrRange>,
}

impl ClientAddressResolver {
    pub fn new(trust_proxy: bool, trusted_proxies: Vec<CidrRange>) -> Self {
        Self {
            trust_proxy,
            trusted_proxies,
        }
    }

    /// Resolve the client address of `req`.
    ///
    /// Returns a borrowed [`UNKNOWN_IP`] when nothing is available.
    pub fn resolve<B>(&self, req: &Request<B>) -> Cow<'static, str> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        if self.trust_proxy {
            if self.peer_is_trusted(peer) {
                if let Some(forwarded) = forwarded_address(req) {
                    return Cow::Owned(forwarded.to_string());
                }
            } else {
                debug!(
                    peer = ?peer,
                    "Ignoring proxy headers from peer outside TRUSTED_PROXIES"
                );
            }
        }

        match peer {
            Some(ip) => Cow::Owned(ip.to_string()),
            None => Cow::Borrowed(UNKNOWN_IP),
        }
    }

    fn peer_is_trusted(&self, peer: Option<IpAddr>) -> bool {
        if self.trusted_proxies.is_empty() {
            return true;
        }
        peer.is_some_and(|ip| self.trusted_proxies.iter().any(|range| range.contains(&ip)))
    }
}

/// First non-empty address from `X-Forwarded-For`, then `X-Real-IP`.
fn forwarded_address<B>(req: &Request<B>) -> Option<&str> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    };

    header(FORWARDED_FOR)
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header(REAL_IP).filter(|ip| !ip.is_empty()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_from(peer: Option<&str>, headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            req.extensions_mut().insert(ConnectInfo(addr));
        }
        req
    }

    #[test]
    fn test_cidr_parse() {
        let v4: CidrRange = "10.0.0.0/8".parse().unwrap();
        assert_eq!(v4.prefix_len, 8);

        let v6: CidrRange = "::1/128".parse().unwrap();
        assert_eq!(v6.prefix_len, 128);

        let single: CidrRange = "192.168.1.1".parse().unwrap();
        assert_eq!(single.prefix_len, 32);
    }

    #[test]
    fn test_cidr_parse_invalid() {
        assert!("not-an-ip".parse::<CidrRange>().is_err());
        assert!("10.0.0.0/33".parse::<CidrRange>().is_err());
        assert!("10.0.0.0/abc".parse::<CidrRange>().is_err());

        let err = "10.0.0.0/33".parse::<CidrRange>().unwrap_err();
        assert_eq!(err.to_string(), "'10.0.0.0/33' is not an IP address or CIDR range");
    }

    #[test]
    fn test_cidr_contains() {
        let range: CidrRange = "192.168.1.0/24".parse().unwrap();
        assert!(range.contains(&"192.168.1.254".parse().unwrap()));
        assert!(!range.contains(&"192.168.2.1".parse().unwrap()));
        assert!(!range.contains(&"::1".parse().unwrap()));

        let everything: CidrRange = "0.0.0.0/0".parse().unwrap();
        assert!(everything.contains(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_peer_address_used_by_default() {
        let resolver = ClientAddressResolver::default();
        let req = request_from(Some("203.0.113.7:5000"), &[("x-forwarded-for", "1.2.3.4")]);

        assert_eq!(resolver.resolve(&req), "203.0.113.7");
    }

    #[test]
    fn test_unknown_without_peer() {
        let resolver = ClientAddressResolver::default();
        let req = request_from(None, &[]);

        let ip = resolver.resolve(&req);
        assert_eq!(ip, UNKNOWN_IP);
        assert!(matches!(ip, Cow::Borrowed(_)));
    }

    #[test]
    fn test_forwarded_for_when_proxy_trusted() {
        let resolver = ClientAddressResolver::new(true, vec![]);
        let req = request_from(
            Some("10.0.0.2:443"),
            &[("x-forwarded-for", "  198.51.100.4 , 10.0.0.1")],
        );

        assert_eq!(resolver.resolve(&req), "198.51.100.4");
    }

    #[test]
    fn test_real_ip_fallback() {
        let resolver = ClientAddressResolver::new(true, vec![]);
        let req = request_from(None, &[("x-real-ip", "2001:db8::1")]);

        assert_eq!(resolver.resolve(&req), "2001:db8::1");
    }

    #[test]
    fn test_empty_forwarded_for_falls_through() {
        let resolver = ClientAddressResolver::new(true, vec![]);
        let req = request_from(Some("127.0.0.1:1"), &[("x-forwarded-for", "   ")]);

        assert_eq!(resolver.resolve(&req), "127.0.0.1");
    }

    #[test]
    fn test_untrusted_peer_headers_ignored() {
        let resolver = ClientAddressResolver::new(true, vec!["10.0.0.0/8".parse().unwrap()]);

        let spoofed = request_from(Some("192.168.1.9:80"), &[("x-forwarded-for", "1.1.1.1")]);
        assert_eq!(resolver.resolve(&spoofed), "192.168.1.9");

        let proxied = request_from(Some("10.1.2.3:80"), &[("x-forwarded-for", "1.1.1.1")]);
        assert_eq!(resolver.resolve(&proxied), "1.1.1.1");
    }

    #[test]
    fn test_trusted_list_without_peer_is_untrusted() {
        let resolver = ClientAddressResolver::new(true, vec!["10.0.0.0/8".parse().unwrap()]);
        let req = request_from(None, &[("x-forwarded-for", "1.1.1.1")]);

        assert_eq!(resolver.resolve(&req), UNKNOWN_IP);
    }
}
