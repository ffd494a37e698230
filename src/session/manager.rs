//! Session lifecycle: login, refresh-token rotation, logout and per-request
//! authentication.
//!
//! Registry reads and writes never suspend; the principal lookup does. Any
//! decision that depends on a registry read made before that lookup is
//! re-checked afterwards (see [`SessionRegistry::replace`]).

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::registry::{SessionMetadata, SessionRecord, SessionRegistry};
use crate::audit::{self, AuditAction, AuditEvent, AuditSink};
use crate::jwt::{TokenCodec, TokenError, TokenPair, VerifyError};
use crate::principal::{AuthenticatedPrincipal, DirectoryError, Principal, PrincipalDirectory};

/// Why a rotation failed. Everything except `Directory` and `Issue` is a
/// security determination and is reported to clients as one outcome.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("refresh token rejected: {0}")]
    InvalidToken(#[source] VerifyError),
    #[error("session is not active")]
    SessionNotActive,
    #[error("principal no longer exists")]
    PrincipalGone,
    #[error("principal lookup failed: {0}")]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Issue(#[from] TokenError),
}

impl RotationError {
    /// True for infrastructure failures that say nothing about the token.
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Directory(_) | Self::Issue(_))
    }
}

/// Why a request could not be authenticated.
#[derive(Debug, thiserror::Error)]
pub enum AuthFailure {
    #[error("no bearer token presented")]
    Missing,
    #[error("access token rejected: {0}")]
    InvalidToken(#[source] VerifyError),
    #[error("principal no longer exists")]
    PrincipalGone,
    #[error("principal lookup failed: {0}")]
    Directory(#[from] DirectoryError),
}

/// A live session as reported to its owner. The key is never exposed.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub is_current: bool,
    #[serde(flatten)]
    pub record: SessionRecord,
}

/// Owns the token codec and session registry and talks to the collaborators.
pub struct SessionManager {
    codec: TokenCodec,
    registry: Arc<SessionRegistry>,
    directory: Arc<dyn PrincipalDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl SessionManager {
    pub fn new(
        codec: TokenCodec,
        registry: Arc<SessionRegistry>,
        directory: Arc<dyn PrincipalDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            codec,
            registry,
            directory,
            audit,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start a session for a principal whose credentials were already checked.
    pub fn login(
        &self,
        principal: &Principal,
        metadata: SessionMetadata,
    ) -> Result<TokenPair, TokenError> {
        let pair = self.codec.issue_pair(principal)?;
        let now = self.registry.now();

        self.audit_event(
            AuditAction::Login,
            &principal.id,
            &principal.tenant_id,
            &metadata,
            None,
        );
        self.registry.create(
            pair.refresh.token.clone(),
            SessionRecord::new(principal, metadata, now),
        );

        info!(
            principal_id = %principal.id,
            tenant_id = %principal.tenant_id,
            "Session created"
        );
        Ok(pair)
    }

    /// Exchange a live refresh token for a new pair, retiring the old one.
    pub async fn rotate(
        &self,
        presented: &str,
        metadata: SessionMetadata,
    ) -> Result<TokenPair, RotationError> {
        let claims = match self.codec.verify_refresh_token(presented) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Refresh token rejected");
                // An expired token may still have an entry; it must not outlive its token.
                self.registry.remove(presented);
                return Err(RotationError::InvalidToken(e));
            }
        };

        if !self.registry.is_active(presented) {
            debug!(principal_id = %claims.sub, "Refresh token has no live session");
            return Err(RotationError::SessionNotActive);
        }

        let principal = self
            .directory
            .find_principal_by_id(&claims.sub)
            .await
            .map_err(|e| {
                error!(principal_id = %claims.sub, error = %e, "Failed to look up principal");
                e
            })?;

        let Some(principal) = principal else {
            self.registry.remove(presented);
            info!(principal_id = %claims.sub, "Principal gone, session removed");
            return Err(RotationError::PrincipalGone);
        };

        // Fresh attributes, not the stale claims, so role/tenant changes apply now.
        let pair = self.codec.issue_pair(&principal).map_err(|e| {
            error!(principal_id = %principal.id, error = %e, "Failed to issue tokens");
            e
        })?;

        let record = SessionRecord::new(&principal, metadata, self.registry.now());
        if !self
            .registry
            .replace(presented, pair.refresh.token.clone(), record)
        {
            debug!(principal_id = %principal.id, "Session ended during rotation");
            return Err(RotationError::SessionNotActive);
        }

        debug!(principal_id = %principal.id, "Session rotated");
        Ok(pair)
    }

    /// End the session behind `refresh_token`, if any. Always succeeds.
    ///
    /// The audit record names the session's owner, or `actor` when the
    /// session was already gone.
    pub fn logout(
        &self,
        refresh_token: Option<&str>,
        actor: Option<&AuthenticatedPrincipal>,
        metadata: SessionMetadata,
    ) -> bool {
        let removed = refresh_token.and_then(|key| self.registry.remove(key));

        let owner = match (&removed, actor) {
            (Some(record), _) => Some((&record.principal_id, &record.tenant_id)),
            (None, Some(actor)) => Some((&actor.principal_id, &actor.tenant_id)),
            (None, None) => None,
        };

        if let Some((principal_id, tenant_id)) = owner {
            self.audit_event(AuditAction::Logout, principal_id, tenant_id, &metadata, None);
            info!(principal_id = %principal_id, "Session ended");
        }

        removed.is_some()
    }

    /// End every session of a principal. Returns how many were removed.
    pub fn logout_all(
        &self,
        principal: &AuthenticatedPrincipal,
        metadata: SessionMetadata,
    ) -> usize {
        let removed = self
            .registry
            .remove_all_for_principal(&principal.principal_id);

        self.audit_event(
            AuditAction::LogoutAll,
            &principal.principal_id,
            &principal.tenant_id,
            &metadata,
            Some(format!("sessions={}", removed)),
        );
        info!(principal_id = %principal.principal_id, removed, "All sessions ended");

        removed
    }

    /// Mark the session behind `refresh_token` as active. False when it is gone.
    pub fn keep_alive(&self, refresh_token: &str) -> bool {
        if self.codec.verify_refresh_token(refresh_token).is_err() {
            self.registry.remove(refresh_token);
            return false;
        }
        self.registry.touch(refresh_token)
    }

    /// Metadata of the session behind `refresh_token`.
    pub fn current_session(&self, refresh_token: &str) -> Option<SessionRecord> {
        if self.codec.verify_refresh_token(refresh_token).is_err() {
            self.registry.remove(refresh_token);
            return None;
        }
        self.registry.get(refresh_token)
    }

    /// Live sessions of a principal, flagging the one keyed by `current`.
    pub fn sessions_for_principal(
        &self,
        principal_id: &str,
        current: Option<&str>,
    ) -> Vec<SessionSummary> {
        self.registry
            .list_for_principal(principal_id)
            .into_iter()
            .map(|(key, record)| SessionSummary {
                is_current: current == Some(key.as_str()),
                record,
            })
            .collect()
    }

    /// Verify an access token and re-confirm its principal still exists.
    ///
    /// The store read happens on every call so deletions and role changes
    /// take effect before the access token expires.
    pub async fn authenticate(
        &self,
        bearer: Option<&str>,
    ) -> Result<AuthenticatedPrincipal, AuthFailure> {
        let token = bearer.ok_or(AuthFailure::Missing)?;

        let claims = self.codec.verify_access_token(token).map_err(|e| {
            debug!(error = %e, "Access token rejected");
            AuthFailure::InvalidToken(e)
        })?;

        let principal = self
            .directory
            .find_principal_by_id(&claims.sub)
            .await
            .map_err(|e| {
                error!(principal_id = %claims.sub, error = %e, "Failed to look up principal");
                e
            })?
            .ok_or(AuthFailure::PrincipalGone)?;

        Ok(principal.into())
    }

    fn audit_event(
        &self,
        action: AuditAction,
        principal_id: &str,
        tenant_id: &str,
        metadata: &SessionMetadata,
        detail: Option<String>,
    ) {
        audit::dispatch(
            &self.audit,
            AuditEvent {
                action,
                principal_id: principal_id.to_string(),
                tenant_id: tenant_id.to_string(),
                ip: metadata.ip.clone(),
                user_agent: metadata.user_agent.clone(),
                at: self.registry.now(),
                detail,
            },
        );
    }
}
