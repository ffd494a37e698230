use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{ApiError, ResultExt, validate_credentials};
use crate::auth::{
    ApiAuthError, Auth, AuthErrorKind, Client, HasAuthBackend, OptionalAuth, ServerSettings,
    clear_refresh_cookie, refresh_cookie, refresh_token,
};
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::TokenPair;
use crate::password::verify_password_or_dummy;
use crate::principal::AuthenticatedPrincipal;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_refresh};
use crate::session::{SessionManager, SessionRecord, SessionSummary};

#[derive(Clone)]
pub struct SessionsState {
    pub sessions: Arc<SessionManager>,
    pub db: Database,
    pub settings: ServerSettings,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(SessionsState);

pub fn router(state: SessionsState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let refresh_router = Router::new()
        .route("/refresh", post(refresh))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_refresh,
        ));

    let session_router = Router::new()
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/me", get(me))
        .route("/session", get(current_session))
        .route("/session/keepalive", post(keep_alive))
        .route("/sessions", get(list_sessions))
        .with_state(state);

    Router::new()
        .merge(login_router)
        .merge(refresh_router)
        .merge(session_router)
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
    expires_in: u64,
}

/// Access token in the body, refresh token in the cookie.
fn token_response(pair: &TokenPair, secure: bool) -> Response {
    let cookie = refresh_cookie(&pair.refresh.token, pair.refresh.duration, secure);
    (
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(TokenResponse {
            access_token: pair.access.token.clone(),
            token_type: "Bearer",
            expires_in: pair.access.duration,
        }),
    )
        .into_response()
}

/// Check email and password, then start a session.
async fn login(
    State(state): State<SessionsState>,
    Client(metadata): Client,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    validate_credentials(&payload.email, &payload.password)?;
    let email = payload.email.trim();

    let credentials = state
        .db
        .principals()
        .get_credentials(email)
        .await
        .db_err("Failed to look up principal")?;

    // Argon2 is CPU-bound. Unknown emails are checked against a stand-in hash
    // so both paths take the same time.
    let password = payload.password;
    let hash = credentials.as_ref().map(|c| c.password_hash.clone());
    let valid =
        tokio::task::spawn_blocking(move || verify_password_or_dummy(&password, hash.as_deref()))
            .await
            .internal_err("Password verification task failed")?
            .internal_err("Failed to verify password")?;

    let credentials = match (credentials, valid) {
        (Some(credentials), true) => credentials,
        (Some(credentials), false) => {
            warn!(principal_id = %credentials.principal.id, "Login with wrong password");
            return Err(ApiError::unauthorized("Invalid email or password"));
        }
        (None, _) => {
            debug!(email = %email, "Login for unknown email");
            return Err(ApiError::unauthorized("Invalid email or password"));
        }
    };

    let pair = state
        .sessions
        .login(&credentials.principal, metadata)
        .internal_err("Failed to issue tokens")?;

    Ok(token_response(&pair, state.secure_cookies()))
}

/// Exchange the refresh cookie for a new token pair.
async fn refresh(
    State(state): State<SessionsState>,
    Client(metadata): Client,
    headers: HeaderMap,
) -> Result<Response, ApiAuthError> {
    let secure = state.secure_cookies();

    let Some(presented) = refresh_token(&headers) else {
        return Err(ApiAuthError::new(AuthErrorKind::NotAuthenticated));
    };

    match state.sessions.rotate(presented, metadata).await {
        Ok(pair) => Ok(token_response(&pair, secure)),
        // The session may still be fine; keep the cookie so the client can retry
        Err(e) if e.is_operational() => Err(ApiAuthError::from(e)),
        Err(e) => Err(ApiAuthError::from(e).clearing_cookie(secure)),
    }
}

/// End the current session. Succeeds even without one.
async fn logout(
    State(state): State<SessionsState>,
    OptionalAuth(actor): OptionalAuth,
    Client(metadata): Client,
    headers: HeaderMap,
) -> impl IntoResponse {
    state
        .sessions
        .logout(refresh_token(&headers), actor.as_ref(), metadata);

    (
        StatusCode::OK,
        [(SET_COOKIE, clear_refresh_cookie(state.secure_cookies()))],
        Json(serde_json::json!({ "success": true })),
    )
}

#[derive(Serialize)]
struct LogoutAllResponse {
    revoked: usize,
}

/// End every session of the caller, on all devices.
async fn logout_all(
    State(state): State<SessionsState>,
    Auth(principal): Auth,
    Client(metadata): Client,
) -> impl IntoResponse {
    let revoked = state.sessions.logout_all(&principal, metadata);

    (
        StatusCode::OK,
        [(SET_COOKIE, clear_refresh_cookie(state.secure_cookies()))],
        Json(LogoutAllResponse { revoked }),
    )
}

async fn me(Auth(principal): Auth) -> Json<AuthenticatedPrincipal> {
    Json(principal)
}

/// Metadata of the session behind the refresh cookie.
async fn current_session(
    State(state): State<SessionsState>,
    headers: HeaderMap,
) -> Result<Json<SessionRecord>, ApiAuthError> {
    let secure = state.secure_cookies();
    let presented = refresh_token(&headers)
        .ok_or_else(|| ApiAuthError::new(AuthErrorKind::NotAuthenticated))?;

    state
        .sessions
        .current_session(presented)
        .map(Json)
        .ok_or_else(|| ApiAuthError::new(AuthErrorKind::SessionExpired).clearing_cookie(secure))
}

/// Record activity on the current session without rotating it.
async fn keep_alive(
    State(state): State<SessionsState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiAuthError> {
    let secure = state.secure_cookies();
    let presented = refresh_token(&headers)
        .ok_or_else(|| ApiAuthError::new(AuthErrorKind::NotAuthenticated))?;

    if state.sessions.keep_alive(presented) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiAuthError::new(AuthErrorKind::SessionExpired).clearing_cookie(secure))
    }
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<SessionSummary>,
}

/// Live sessions of the caller, marking the one making this request.
async fn list_sessions(
    State(state): State<SessionsState>,
    Auth(principal): Auth,
    headers: HeaderMap,
) -> Json<ListSessionsResponse> {
    let sessions = state
        .sessions
        .sessions_for_principal(&principal.principal_id, refresh_token(&headers));

    Json(ListSessionsResponse { sessions })
}
