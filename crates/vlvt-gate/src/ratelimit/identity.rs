//! Who a rate limit window belongs to.

use axum::http::HeaderMap;
use std::net::SocketAddr;

use vlvt_common::Principal;
use vlvt_common::constants::{UNKNOWN_ADDRESS, headers::X_FORWARDED_FOR};

/// Window key: `prefix:user:<id>` for an identified principal, else
/// `prefix:ip:<address>`
pub fn identity_key(prefix: &str, principal: Option<&Principal>, remote: &str) -> String {
    match principal.and_then(Principal::id) {
        Some(user_id) => format!("{}:user:{}", prefix, user_id),
        None => format!("{}:ip:{}", prefix, remote),
    }
}

/// Resolve the client address.
///
/// The first `X-Forwarded-For` entry is only honoured behind a trusted proxy;
/// otherwise the socket peer is used, and `"unknown"` when neither exists.
pub fn remote_address(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}
