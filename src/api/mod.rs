mod audit;
mod error;
mod sessions;

use axum::Router;
use std::sync::Arc;

use crate::auth::ServerSettings;
use crate::db::Database;
use crate::rate_limit::RateLimitConfig;
use crate::session::SessionManager;

pub use error::{ApiError, ResultExt};
pub use sessions::SessionsState;

/// Create the API router.
pub fn create_api_router(
    sessions: Arc<SessionManager>,
    db: Database,
    settings: ServerSettings,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let sessions_state = sessions::SessionsState {
        sessions: sessions.clone(),
        db: db.clone(),
        settings,
        rate_limit_config,
    };

    let audit_state = audit::AuditState {
        sessions,
        db,
        settings,
    };

    Router::new()
        .nest("/auth", sessions::router(sessions_state))
        .nest("/audit", audit::router(audit_state))
}
