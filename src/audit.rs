//! Audit records for login and logout.
//!
//! Writes are fire-and-forget: [`dispatch`] hands the event to a spawned
//! task and returns immediately. A failing sink is logged and never reaches
//! the caller.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    Logout,
    LogoutAll,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
            AuditAction::LogoutAll => "logout_all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub principal_id: String,
    pub tenant_id: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Unix seconds
    pub at: u64,
    /// Action-specific detail, e.g. how many sessions a logout-all ended.
    pub detail: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Record an event in the background. Must be called from within a tokio runtime.
pub fn dispatch(sink: &Arc<dyn AuditSink>, event: AuditEvent) {
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        let action = event.action;
        let principal_id = event.principal_id.clone();
        if let Err(e) = sink.record(event).await {
            warn!(
                action = action.as_str(),
                principal_id = %principal_id,
                error = %e,
                "Failed to write audit record"
            );
        }
    });
}
