//! Best-effort client details: IP address and user agent.

use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{header, request::Parts},
};

use crate::session::SessionMetadata;

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract the client IP address.
///
/// With `trust_proxy` the first X-Forwarded-For entry wins; otherwise, and as a
/// fallback, the socket address from `ConnectInfo` is used.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(source: &T, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        let forwarded = source
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

pub fn extract_user_agent<T: HasHeadersAndExtensions>(source: &T) -> Option<String> {
    source
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Client details recorded on the session.
pub fn session_metadata<T: HasHeadersAndExtensions>(source: &T, trust_proxy: bool) -> SessionMetadata {
    SessionMetadata {
        ip: extract_client_ip(source, trust_proxy),
        user_agent: extract_user_agent(source),
    }
}
