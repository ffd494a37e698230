//! In-memory session registry keyed by refresh token.
//!
//! A session exists iff its refresh token is still honoured. The key is the
//! refresh token string itself, so "is this presented token live" is a single
//! map lookup, while "all sessions for a principal" is a full scan.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::clock::Clock;
use crate::principal::{Principal, Role};

/// Best-effort client details captured per request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// The registry's record of one live refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub principal_id: String,
    pub email: String,
    pub role: Role,
    pub tenant_id: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Unix seconds
    pub last_activity: u64,
}

impl SessionRecord {
    pub fn new(principal: &Principal, metadata: SessionMetadata, now: u64) -> Self {
        Self {
            principal_id: principal.id.clone(),
            email: principal.email.clone(),
            role: principal.role,
            tenant_id: principal.tenant_id.clone(),
            ip: metadata.ip,
            user_agent: metadata.user_agent,
            last_activity: now,
        }
    }
}

/// Process-wide session store. Every operation takes the lock once and never
/// holds it across an await point.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionRecord>>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionRecord>> {
        // The map holds no invariants a panicking holder could break mid-way.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Insert a session, overwriting any entry with the same key.
    pub fn create(&self, key: String, record: SessionRecord) {
        self.lock().insert(key, record);
    }

    /// Bump last activity. Returns false when the session is gone.
    pub fn touch(&self, key: &str) -> bool {
        let now = self.clock.now();
        match self.lock().get_mut(key) {
            Some(record) => {
                record.last_activity = now;
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<SessionRecord> {
        self.lock().get(key).cloned()
    }

    /// Remove a session if present. Idempotent.
    pub fn remove(&self, key: &str) -> Option<SessionRecord> {
        self.lock().remove(key)
    }

    /// Remove every session owned by a principal. Returns how many were removed.
    pub fn remove_all_for_principal(&self, principal_id: &str) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, record| record.principal_id != principal_id);
        before - sessions.len()
    }

    /// Swap `old_key` for `new_key` under one lock acquisition.
    ///
    /// The new entry is only inserted when `old_key` was still present, so of
    /// several callers racing on the same old key exactly one succeeds.
    pub fn replace(&self, old_key: &str, new_key: String, record: SessionRecord) -> bool {
        let mut sessions = self.lock();
        if sessions.remove(old_key).is_none() {
            return false;
        }
        sessions.insert(new_key, record);
        true
    }

    /// Sessions owned by a principal, paired with their keys.
    pub fn list_for_principal(&self, principal_id: &str) -> Vec<(String, SessionRecord)> {
        let mut sessions: Vec<_> = self
            .lock()
            .iter()
            .filter(|(_, record)| record.principal_id == principal_id)
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect();
        sessions.sort_by(|a, b| b.1.last_activity.cmp(&a.1.last_activity));
        sessions
    }

    /// Remove sessions idle for strictly longer than `idle_timeout`.
    pub fn evict_idle(&self, idle_timeout: Duration) -> usize {
        let now = self.clock.now();
        let idle = idle_timeout.as_secs();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, record| now.saturating_sub(record.last_activity) <= idle);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
