use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{request::Parts, HeaderMap, HeaderName};
use ipnetwork::IpNetwork;

use crate::error::AppError;
use crate::state::AppState;

/// Resolves the client address, honouring a forwarded-IP header only when the
/// immediate peer is an approved reverse proxy.
#[derive(Clone, Debug)]
pub struct ClientIpResolver {
    proxy_ranges: Vec<IpNetwork>,
    header: HeaderName,
}

impl ClientIpResolver {
    pub fn new(proxy_ranges: Vec<IpNetwork>, header: HeaderName) -> Self {
        Self {
            proxy_ranges,
            header,
        }
    }

    pub fn is_trusted_proxy(&self, peer: IpAddr) -> bool {
        self.proxy_ranges.iter().any(|range| range.contains(peer))
    }

    /// A peer outside the proxy ranges is taken at face value, so a direct
    /// client cannot choose its apparent address.
    pub fn resolve(&self, peer: IpAddr, headers: &HeaderMap) -> IpAddr {
        if !self.is_trusted_proxy(peer) {
            return peer;
        }

        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
            .unwrap_or(peer)
    }
}

/// The resolved client address of the current request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl ClientIp {
    pub fn from_parts(parts: &Parts, resolver: &ClientIpResolver) -> Option<Self> {
        let ConnectInfo(peer) = parts.extensions.get::<ConnectInfo<SocketAddr>>()?;
        Some(Self(resolver.resolve(peer.ip(), &parts.headers)))
    }
}

impl std::fmt::Display for ClientIp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        ClientIp::from_parts(parts, &state.ip_resolver)
            .ok_or_else(|| AppError::Internal("peer address unavailable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn resolver() -> ClientIpResolver {
        ClientIpResolver::new(
            vec!["173.245.48.0/20".parse().unwrap(), "2400:cb00::/32".parse().unwrap()],
            HeaderName::from_static("cf-connecting-ip"),
        )
    }

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn proxy_peer_forwards_client_ip() {
        let peer: IpAddr = "173.245.48.10".parse().unwrap();
        assert_eq!(
            resolver().resolve(peer, &forwarded("198.51.100.7")),
            "198.51.100.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn direct_peer_cannot_spoof() {
        let peer: IpAddr = "203.0.113.9".parse().unwrap();
        assert_eq!(resolver().resolve(peer, &forwarded("198.51.100.7")), peer);
    }

    #[test]
    fn garbage_header_falls_back_to_peer() {
        let peer: IpAddr = "2400:cb00::1".parse().unwrap();
        assert_eq!(resolver().resolve(peer, &forwarded("not-an-ip")), peer);
        assert_eq!(resolver().resolve(peer, &HeaderMap::new()), peer);
    }
}
