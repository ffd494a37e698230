//! Principals (users) and the backing-store lookup the session core depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Dashboard role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Auditor,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Auditor => "auditor",
            Role::Viewer => "viewer",
        }
    }

    /// Unknown values fall back to the least privileged role.
    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => Role::Admin,
            "manager" => Role::Manager,
            "auditor" => Role::Auditor,
            _ => Role::Viewer,
        }
    }
}

/// The authenticated actor a token represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub tenant_id: String,
}

/// Principal context attached to an authenticated request.
///
/// Always built from a fresh backing-store read, never from token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedPrincipal {
    pub principal_id: String,
    pub email: String,
    pub role: Role,
    pub tenant_id: String,
}

impl From<Principal> for AuthenticatedPrincipal {
    fn from(principal: Principal) -> Self {
        Self {
            principal_id: principal.id,
            email: principal.email,
            role: principal.role,
            tenant_id: principal.tenant_id,
        }
    }
}

/// A failure of the lookup itself, as opposed to "not found".
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("principal store unavailable: {0}")]
    Unavailable(String),
}

/// Backing-store lookup called on every authenticated request and every rotation.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn find_principal_by_id(&self, id: &str) -> Result<Option<Principal>, DirectoryError>;
}
