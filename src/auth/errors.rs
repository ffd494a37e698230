//! Authentication error types.
//!
//! Internally the core reports why a check failed; at the HTTP boundary the
//! reasons collapse into a few uniform responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::cookie::clear_refresh_cookie;
use crate::session::{AuthFailure, RotationError};

/// Externally visible auth outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No credential presented at all
    NotAuthenticated,
    /// Access token failed verification or its principal is gone
    InvalidToken,
    /// Refresh failed; the client must log in again
    SessionExpired,
    InsufficientRole,
    Internal,
}

/// Authentication errors for API routes (JSON body, optionally clears the
/// refresh cookie).
#[derive(Debug)]
pub struct ApiAuthError {
    kind: AuthErrorKind,
    clear_cookie: bool,
    secure: bool,
}

impl ApiAuthError {
    pub fn new(kind: AuthErrorKind) -> Self {
        Self {
            kind,
            clear_cookie: false,
            secure: false,
        }
    }

    /// Also delete the refresh-token cookie in the response.
    pub fn clearing_cookie(mut self, secure: bool) -> Self {
        self.clear_cookie = true;
        self.secure = secure;
        self
    }

    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NotAuthenticated | AuthErrorKind::SessionExpired => {
                StatusCode::UNAUTHORIZED
            }
            AuthErrorKind::InvalidToken | AuthErrorKind::InsufficientRole => StatusCode::FORBIDDEN,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated => "Not authenticated",
            AuthErrorKind::InvalidToken => "Invalid or expired token",
            AuthErrorKind::SessionExpired => "Session expired",
            AuthErrorKind::InsufficientRole => "Insufficient permissions",
            AuthErrorKind::Internal => "Internal error",
        }
    }
}

impl From<AuthFailure> for ApiAuthError {
    fn from(failure: AuthFailure) -> Self {
        let kind = match failure {
            AuthFailure::Missing => AuthErrorKind::NotAuthenticated,
            AuthFailure::InvalidToken(_) | AuthFailure::PrincipalGone => {
                AuthErrorKind::InvalidToken
            }
            AuthFailure::Directory(_) => AuthErrorKind::Internal,
        };
        Self::new(kind)
    }
}

impl From<RotationError> for ApiAuthError {
    fn from(error: RotationError) -> Self {
        if error.is_operational() {
            Self::new(AuthErrorKind::Internal)
        } else {
            Self::new(AuthErrorKind::SessionExpired)
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        if self.clear_cookie {
            if let Ok(value) = HeaderValue::from_str(&clear_refresh_cookie(self.secure)) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }

        response
    }
}
