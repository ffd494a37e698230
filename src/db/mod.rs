mod audit;
mod principal;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::audit::{AuditError, AuditEvent, AuditSink};
use crate::principal::{DirectoryError, Principal, PrincipalDirectory};

pub use audit::{AuditLogEntry, AuditLogStore};
pub use principal::{PrincipalCredentials, PrincipalStore};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        // Every connection to ":memory:" is its own database, so keep one.
        let (url, max_connections) = if path == ":memory:" {
            ("sqlite::memory:".to_string(), 1)
        } else {
            (format!("sqlite:{}?mode=rwc", path), 5)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                "CREATE TABLE principals (
                    id TEXT PRIMARY KEY NOT NULL,
                    tenant_id TEXT NOT NULL,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'viewer',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_principals_tenant_id ON principals(tenant_id)",
                // Append-only; principal_id is not a foreign key so history survives deletion
                "CREATE TABLE audit_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    action TEXT NOT NULL,
                    principal_id TEXT NOT NULL,
                    tenant_id TEXT NOT NULL,
                    ip TEXT,
                    user_agent TEXT,
                    detail TEXT,
                    occurred_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_audit_log_principal ON audit_log(principal_id, occurred_at)",
                "CREATE INDEX idx_audit_log_tenant ON audit_log(tenant_id, occurred_at)",
            ],
        )
        .await
    }

    /// Get the principal store.
    pub fn principals(&self) -> PrincipalStore {
        PrincipalStore::new(self.pool.clone())
    }

    /// Get the audit log store.
    pub fn audit_log(&self) -> AuditLogStore {
        AuditLogStore::new(self.pool.clone())
    }
}

#[async_trait]
impl PrincipalDirectory for Database {
    async fn find_principal_by_id(&self, id: &str) -> Result<Option<Principal>, DirectoryError> {
        Ok(self.principals().get_by_id(id).await?)
    }
}

#[async_trait]
impl AuditSink for Database {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.audit_log().insert(&event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditAction;
    use crate::principal::Role;

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(db.get_version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_directory_lookup() {
        let db = Database::open(":memory:").await.unwrap();
        let created = db
            .principals()
            .create("tenant-1", "alice@example.com", "hash", Role::Manager)
            .await
            .unwrap();

        let found = db.find_principal_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(found, created);

        assert!(db.find_principal_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_audit_sink_persists_event() {
        let db = Database::open(":memory:").await.unwrap();
        let event = AuditEvent {
            action: AuditAction::Login,
            principal_id: "p-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            ip: Some("10.0.0.1".to_string()),
            user_agent: None,
            at: 1_700_000_000,
            detail: None,
        };

        db.record(event).await.unwrap();

        let entries = db.audit_log().list_for_principal("p-1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "login");
        assert_eq!(entries[0].ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(entries[0].occurred_at, 1_700_000_000);
    }
}
