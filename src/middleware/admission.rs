//! Admission gate
//!
//! Source-address allow-list placed in front of the execution and listing
//! endpoints. The client address is taken from the forwarding header only when
//! the immediate peer is a configured trusted proxy.

use axum::extract::{ConnectInfo, OriginalUri, Request, State};
use axum::http::{HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use log::{debug, warn};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::config::AdmissionConfig;
use crate::error::{AdmissionError, ServerError};

/// Allow-list and proxy trust settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    allowed: HashSet<IpAddr>,
    trusted_proxies: HashSet<IpAddr>,
    forwarded_header: HeaderName,
}

impl AdmissionPolicy {
    pub fn new<A, P>(allowed: A, trusted_proxies: P, forwarded_header: HeaderName) -> Self
    where
        A: IntoIterator<Item = IpAddr>,
        P: IntoIterator<Item = IpAddr>,
    {
        Self {
            allowed: allowed.into_iter().map(|ip| ip.to_canonical()).collect(),
            trusted_proxies: trusted_proxies
                .into_iter()
                .map(|ip| ip.to_canonical())
                .collect(),
            forwarded_header,
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Result<Self, config::ConfigError> {
        let parse = |values: &[String]| -> Result<Vec<IpAddr>, config::ConfigError> {
            values
                .iter()
                .map(|value| {
                    value.trim().parse::<IpAddr>().map_err(|e| {
                        config::ConfigError::Message(format!("Invalid IP address {value}: {e}"))
                    })
                })
                .collect()
        };

        let header = HeaderName::from_bytes(config.forwarded_header.as_bytes()).map_err(|e| {
            config::ConfigError::Message(format!(
                "Invalid forwarded header {}: {e}",
                config.forwarded_header
            ))
        })?;

        Ok(Self::new(
            parse(&config.allowed_ips)?,
            parse(&config.trusted_proxies)?,
            header,
        ))
    }

    /// Determines the originating client address of a request.
    ///
    /// Behind a trusted proxy this is the right-most forwarded entry that is not
    /// itself a trusted proxy. A missing or unparseable header falls back to the
    /// peer address.
    pub fn client_ip(&self, peer: IpAddr, headers: &HeaderMap) -> IpAddr {
        let peer = peer.to_canonical();
        if !self.trusted_proxies.contains(&peer) {
            return peer;
        }

        let mut hops = Vec::new();
        for value in headers.get_all(&self.forwarded_header) {
            let Ok(text) = value.to_str() else {
                debug!("Ignoring non-ASCII {} header", self.forwarded_header);
                return peer;
            };
            for hop in text.split(',') {
                match parse_hop(hop) {
                    Some(ip) => hops.push(ip),
                    None => {
                        debug!("Ignoring unparseable {} entry {:?}", self.forwarded_header, hop);
                        return peer;
                    }
                }
            }
        }

        hops.iter()
            .rev()
            .find(|ip| !self.trusted_proxies.contains(ip))
            .or_else(|| hops.first())
            .copied()
            .unwrap_or(peer)
    }

    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        self.allowed.contains(&ip.to_canonical())
    }

    /// Admits or denies one request. A denial emits exactly one structured record.
    pub fn check(&self, peer: IpAddr, headers: &HeaderMap, path: &str) -> Result<IpAddr, AdmissionError> {
        let client = self.client_ip(peer, headers);
        if self.is_allowed(client) {
            return Ok(client);
        }

        warn!(
            target: "rax::admission",
            client_ip:% = client,
            peer:% = peer,
            path = path;
            "Access denied for {} to {}",
            client,
            path
        );
        Err(AdmissionError::Denied(client))
    }
}

fn parse_hop(hop: &str) -> Option<IpAddr> {
    let hop = hop.trim();
    hop.parse::<IpAddr>()
        .ok()
        .or_else(|| hop.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
        .map(|ip| ip.to_canonical())
}

/// Middleware rejecting requests whose client address is not allow-listed.
pub async fn admission_gate(
    State(policy): State<Arc<AdmissionPolicy>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    // Nested routers see a stripped URI; deny records carry the full path.
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    match policy.check(peer.ip(), request.headers(), &path) {
        Ok(_) => next.run(request).await,
        Err(e) => ServerError::from(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::net::Ipv6Addr;

    fn ip(text: &str) -> IpAddr {
        text.parse().unwrap()
    }

    fn policy(allowed: &[&str], proxies: &[&str]) -> AdmissionPolicy {
        AdmissionPolicy::new(
            allowed.iter().map(|a| ip(a)),
            proxies.iter().map(|p| ip(p)),
            HeaderName::from_static("x-forwarded-for"),
        )
    }

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_untrusted_peer_header_ignored() {
        let policy = policy(&["127.0.0.1"], &[]);
        let client = policy.client_ip(ip("203.0.113.9"), &forwarded("127.0.0.1"));
        assert_eq!(client, ip("203.0.113.9"));
        assert!(policy.check(ip("203.0.113.9"), &forwarded("127.0.0.1"), "/x").is_err());
    }

    #[test]
    fn test_trusted_proxy_uses_rightmost_untrusted_hop() {
        let policy = policy(&["198.51.100.7"], &["10.0.0.1", "10.0.0.2"]);
        let headers = forwarded("1.2.3.4, 198.51.100.7, 10.0.0.2");
        assert_eq!(policy.client_ip(ip("10.0.0.1"), &headers), ip("198.51.100.7"));
        assert!(policy.check(ip("10.0.0.1"), &headers, "/x").is_ok());
    }

    #[test]
    fn test_trusted_proxy_without_header_uses_peer() {
        let policy = policy(&["10.0.0.1"], &["10.0.0.1"]);
        assert_eq!(policy.client_ip(ip("10.0.0.1"), &HeaderMap::new()), ip("10.0.0.1"));
        assert_eq!(
            policy.client_ip(ip("10.0.0.1"), &forwarded("not-an-ip")),
            ip("10.0.0.1")
        );
    }

    #[test]
    fn test_mapped_ipv6_is_canonicalized() {
        let policy = policy(&["127.0.0.1"], &[]);
        let mapped = IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0x7f00, 0x0001));
        assert!(policy.check(mapped, &HeaderMap::new(), "/x").is_ok());
    }

    #[test]
    fn test_exact_match_only() {
        let policy = policy(&["127.0.0.1"], &[]);
        assert!(policy.is_allowed(ip("127.0.0.1")));
        assert!(!policy.is_allowed(ip("127.0.0.2")));
        assert!(!policy.is_allowed(ip("::1")));
    }

    #[test]
    fn test_from_config() {
        let config = AdmissionConfig {
            allowed_ips: vec!["127.0.0.1".into(), " ::1 ".into()],
            trusted_proxies: vec![],
            forwarded_header: "X-Real-IP".into(),
        };
        let policy = AdmissionPolicy::from_config(&config).unwrap();
        assert!(policy.is_allowed(ip("::1")));

        let bad = AdmissionConfig {
            allowed_ips: vec!["localhost".into()],
            ..config
        };
        assert!(AdmissionPolicy::from_config(&bad).is_err());
    }
}
