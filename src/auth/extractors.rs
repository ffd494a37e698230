//! Axum extractors for bearer-token authentication.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::ip::session_metadata;
use super::state::HasAuthBackend;
use crate::principal::{AuthenticatedPrincipal, Role};
use crate::session::SessionMetadata;

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Extractor for API endpoints that require authentication.
/// Verifies the access token and re-reads the principal from the store.
pub struct Auth(pub AuthenticatedPrincipal);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        state
            .sessions()
            .authenticate(bearer_token(&parts.headers))
            .await
            .map(Auth)
            .map_err(ApiAuthError::from)
    }
}

/// Optional authentication extractor - never fails.
/// Useful for endpoints that work both authenticated and unauthenticated.
pub struct OptionalAuth(pub Option<AuthenticatedPrincipal>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let principal = match bearer_token(&parts.headers) {
            Some(token) => state.sessions().authenticate(Some(token)).await.ok(),
            None => None,
        };
        Ok(OptionalAuth(principal))
    }
}

/// Extractor for admin-only endpoints.
pub struct AdminOnly(pub AuthenticatedPrincipal);

impl<S> FromRequestParts<S> for AdminOnly
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Auth(principal) = Auth::from_request_parts(parts, state).await?;
        if principal.role != Role::Admin {
            return Err(ApiAuthError::new(AuthErrorKind::InsufficientRole));
        }
        Ok(AdminOnly(principal))
    }
}

/// Client IP and user agent of the caller, honoring the proxy setting.
pub struct Client(pub SessionMetadata);

impl<S> FromRequestParts<S> for Client
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Client(session_metadata(parts, state.trust_proxy())))
    }
}
