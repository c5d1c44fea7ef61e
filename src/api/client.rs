//! Client identification for lockout and rate limiting

use crate::api::AppState;
use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{Extensions, HeaderMap, request::Parts},
};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Identifier used when neither a proxy header nor the peer address is available
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Stable identifier of the requesting client
///
/// The peer IP address, or with `trust_proxy` the address the nearest proxy
/// appended to `X-Forwarded-For`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl ClientId {
    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ClientId {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(resolve(
            &parts.headers,
            &parts.extensions,
            state.config.api.trust_proxy,
        ))
    }
}

/// Work out the client identifier from request metadata
pub fn resolve(headers: &HeaderMap, extensions: &Extensions, trust_proxy: bool) -> ClientId {
    if trust_proxy && let Some(forwarded) = last_forwarded_for(headers) {
        return ClientId(forwarded);
    }

    let id = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
    ClientId(id)
}

/// Last hop of `X-Forwarded-For`; one proxy in front of the server is trusted
fn last_forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .last()
        .map(str::to_string)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_peer(addr: &str) -> Extensions {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(addr.parse::<SocketAddr>().unwrap()));
        extensions
    }

    #[test]
    fn peer_address_without_proxy() {
        let id = resolve(&HeaderMap::new(), &with_peer("192.0.2.10:51000"), true);
        assert_eq!(id.as_str(), "192.0.2.10");
    }

    #[test]
    fn last_forwarded_entry_wins_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.1.1.1, 203.0.113.9"),
        );

        let id = resolve(&headers, &with_peer("10.0.0.2:8080"), true);
        assert_eq!(id.as_str(), "203.0.113.9");
    }

    #[test]
    fn forwarded_header_ignored_when_untrusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));

        let id = resolve(&headers, &with_peer("10.0.0.2:8080"), false);
        assert_eq!(id.as_str(), "10.0.0.2");
    }

    #[test]
    fn falls_back_to_unknown() {
        let id = resolve(&HeaderMap::new(), &Extensions::new(), true);
        assert_eq!(id.as_str(), UNKNOWN_CLIENT);
    }
}
