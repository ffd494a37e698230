//! Persistent audit trail for session events.

use sqlx::sqlite::SqlitePool;

use crate::audit::AuditEvent;

/// A stored audit record.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub principal_id: String,
    pub tenant_id: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub detail: Option<String>,
    /// Unix seconds
    pub occurred_at: i64,
}

pub struct AuditLogStore {
    pool: SqlitePool,
}

impl AuditLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an event. Returns the row ID.
    pub async fn insert(&self, event: &AuditEvent) -> Result<i64, sqlx::Error> {
        let occurred_at = i64::try_from(event.at).unwrap_or(i64::MAX);
        let result = sqlx::query(
            "INSERT INTO audit_log (action, principal_id, tenant_id, ip, user_agent, detail, occurred_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.action.as_str())
        .bind(&event.principal_id)
        .bind(&event.tenant_id)
        .bind(event.ip.as_deref())
        .bind(event.user_agent.as_deref())
        .bind(event.detail.as_deref())
        .bind(occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Audit records for a principal, oldest first.
    pub async fn list_for_principal(
        &self,
        principal_id: &str,
    ) -> Result<Vec<AuditLogEntry>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, action, principal_id, tenant_id, ip, user_agent, detail, occurred_at FROM audit_log WHERE principal_id = ? ORDER BY occurred_at, id",
        )
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Audit records for a tenant, newest first.
    pub async fn list_for_tenant(
        &self,
        tenant_id: &str,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, action, principal_id, tenant_id, ip, user_agent, detail, occurred_at FROM audit_log WHERE tenant_id = ? ORDER BY occurred_at DESC, id DESC LIMIT ?",
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
