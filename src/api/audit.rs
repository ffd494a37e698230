use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ResultExt};
use crate::auth::{AdminOnly, ServerSettings};
use crate::db::{AuditLogEntry, Database};
use crate::impl_has_auth_backend;
use crate::session::SessionManager;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct AuditState {
    pub sessions: Arc<SessionManager>,
    pub db: Database,
    pub settings: ServerSettings,
}

impl_has_auth_backend!(AuditState);

pub fn router(state: AuditState) -> Router {
    Router::new()
        .route("/", get(list_events))
        .with_state(state)
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct ListEventsResponse {
    events: Vec<AuditLogEntry>,
}

/// Most recent audit events of the admin's tenant.
async fn list_events(
    State(state): State<AuditState>,
    AdminOnly(admin): AdminOnly,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let events = state
        .db
        .audit_log()
        .list_for_tenant(&admin.tenant_id, limit)
        .await
        .db_err("Failed to list audit events")?;

    Ok(Json(ListEventsResponse { events }))
}
