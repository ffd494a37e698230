use sqlx::sqlite::SqlitePool;

use crate::principal::{Principal, Role};

#[derive(Clone)]
pub struct PrincipalStore {
    pool: SqlitePool,
}

/// A principal together with its stored password hash, for login only.
#[derive(Debug, Clone)]
pub struct PrincipalCredentials {
    pub principal: Principal,
    pub password_hash: String,
}

#[derive(sqlx::FromRow)]
struct PrincipalRow {
    id: String,
    tenant_id: String,
    email: String,
    role: String,
}

impl From<PrincipalRow> for Principal {
    fn from(row: PrincipalRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            role: Role::from_str(&row.role),
            tenant_id: row.tenant_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialsRow {
    id: String,
    tenant_id: String,
    email: String,
    role: String,
    password_hash: String,
}

impl PrincipalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a principal with a fresh UUID.
    pub async fn create(
        &self,
        tenant_id: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Principal, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO principals (id, tenant_id, email, password_hash, role) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;

        Ok(Principal {
            id,
            email: email.to_string(),
            role,
            tenant_id: tenant_id.to_string(),
        })
    }

    /// Get a principal by ID.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Principal>, sqlx::Error> {
        let row: Option<PrincipalRow> =
            sqlx::query_as("SELECT id, tenant_id, email, role FROM principals WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Principal::from))
    }

    /// Get a principal and its password hash by email (case-insensitive).
    pub async fn get_credentials(
        &self,
        email: &str,
    ) -> Result<Option<PrincipalCredentials>, sqlx::Error> {
        let row: Option<CredentialsRow> = sqlx::query_as(
            "SELECT id, tenant_id, email, role, password_hash FROM principals WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| PrincipalCredentials {
            principal: Principal {
                id: row.id,
                email: row.email,
                role: Role::from_str(&row.role),
                tenant_id: row.tenant_id,
            },
            password_hash: row.password_hash,
        }))
    }

    /// Set the role for a principal.
    pub async fn set_role(&self, id: &str, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE principals SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a principal by ID.
    pub async fn delete(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM principals WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::principal::Role;

    #[tokio::test]
    async fn test_create_and_get_principal() {
        let db = Database::open(":memory:").await.unwrap();

        let created = db
            .principals()
            .create("tenant-1", "alice@example.com", "hash", Role::Auditor)
            .await
            .unwrap();

        let found = db.principals().get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(found.email, "alice@example.com");
        assert_eq!(found.role, Role::Auditor);
        assert_eq!(found.tenant_id, "tenant-1");
    }

    #[tokio::test]
    async fn test_credentials_lookup_ignores_case() {
        let db = Database::open(":memory:").await.unwrap();
        db.principals()
            .create("tenant-1", "Alice@Example.com", "stored-hash", Role::Viewer)
            .await
            .unwrap();

        let creds = db
            .principals()
            .get_credentials("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(creds.password_hash, "stored-hash");
        assert_eq!(creds.principal.email, "Alice@Example.com");
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.principals()
            .create("tenant-1", "alice@example.com", "h", Role::Viewer)
            .await
            .unwrap();
        let result = db
            .principals()
            .create("tenant-2", "ALICE@example.com", "h", Role::Viewer)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_set_role_and_delete() {
        let db = Database::open(":memory:").await.unwrap();
        let p = db
            .principals()
            .create("tenant-1", "bob@example.com", "h", Role::Viewer)
            .await
            .unwrap();

        assert!(db.principals().set_role(&p.id, Role::Admin).await.unwrap());
        let updated = db.principals().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(updated.role, Role::Admin);

        assert!(db.principals().delete(&p.id).await.unwrap());
        assert!(db.principals().get_by_id(&p.id).await.unwrap().is_none());
        assert!(!db.principals().delete(&p.id).await.unwrap());
    }
}
