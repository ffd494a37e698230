//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and refresh-token probing.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

const LOGIN_PER_SEC: NonZeroU32 = NonZeroU32::new(1).unwrap();
const LOGIN_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();
const REFRESH_PER_SEC: NonZeroU32 = NonZeroU32::new(10).unwrap();

/// Rate limiting configuration for authentication endpoints.
pub struct RateLimitConfig {
    /// Login: 5 requests burst, refilling at 1 per second per IP
    pub login: IpLimiter,
    /// Refresh: 10 requests per second per IP
    pub refresh: IpLimiter,
    /// Read the client IP from X-Forwarded-For
    pub trust_proxy: bool,
}

impl RateLimitConfig {
    pub fn new(trust_proxy: bool) -> Self {
        Self {
            login: RateLimiter::keyed(Quota::per_second(LOGIN_PER_SEC).allow_burst(LOGIN_BURST)),
            refresh: RateLimiter::keyed(Quota::per_second(REFRESH_PER_SEC)),
            trust_proxy,
        }
    }

    /// Drop per-IP state that has fully recovered. Returns how many clients are still tracked.
    pub fn prune(&self) -> usize {
        for limiter in [&self.login, &self.refresh] {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
        self.login.len() + self.refresh.len()
    }

    fn client_key(&self, request: &Request) -> String {
        extract_client_ip(request, self.trust_proxy).unwrap_or_else(|| "unknown".to_string())
    }
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = config.client_key(&request);

    match config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many login attempts. Please wait before trying again.",
        )
            .into_response(),
    }
}

/// Middleware for rate limiting token refresh.
pub async fn rate_limit_refresh(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = config.client_key(&request);

    match config.refresh.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests. Please try again later.",
        )
            .into_response(),
    }
}
