#![allow(dead_code)]

use async_trait::async_trait;
use auditdesk::audit::{AuditError, AuditEvent, AuditSink};
use auditdesk::clock::{Clock, ManualClock};
use auditdesk::jwt::TokenCodec;
use auditdesk::principal::{DirectoryError, Principal, PrincipalDirectory, Role};
use auditdesk::session::{SessionManager, SessionMetadata, SessionRegistry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{Barrier, mpsc};

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-at-least-32-bytes!!";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-at-least-32-bytes!";

/// Fixed starting point so timestamps in assertions are predictable.
pub const START: u64 = 1_700_000_000;

/// In-memory principal store with knobs for failure and interleaving.
#[derive(Default)]
pub struct MockDirectory {
    principals: RwLock<HashMap<String, Principal>>,
    failing: AtomicBool,
    gate: Mutex<Option<Arc<Barrier>>>,
}

impl MockDirectory {
    pub fn insert(&self, principal: Principal) {
        self.principals
            .write()
            .unwrap()
            .insert(principal.id.clone(), principal);
    }

    pub fn remove(&self, id: &str) {
        self.principals.write().unwrap().remove(id);
    }

    pub fn set_role(&self, id: &str, role: Role) {
        if let Some(principal) = self.principals.write().unwrap().get_mut(id) {
            principal.role = role;
        }
    }

    /// Make every lookup fail until called again with `false`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold the next `parties` lookups until all of them have arrived.
    pub fn gate(&self, parties: usize) {
        *self.gate.lock().unwrap() = Some(Arc::new(Barrier::new(parties)));
    }
}

#[async_trait]
impl PrincipalDirectory for MockDirectory {
    async fn find_principal_by_id(&self, id: &str) -> Result<Option<Principal>, DirectoryError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(barrier) = gate {
            barrier.wait().await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("directory offline".to_string()));
        }

        Ok(self.principals.read().unwrap().get(id).cloned())
    }
}

/// Forwards every event to a channel the test can read.
pub struct RecordingAuditSink {
    tx: mpsc::UnboundedSender<AuditEvent>,
}

impl RecordingAuditSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AuditEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.tx
            .send(event)
            .map_err(|_| AuditError::Unavailable("receiver dropped".to_string()))
    }
}

/// Rejects every write and counts the attempts.
#[derive(Default)]
pub struct FailingAuditSink {
    calls: AtomicUsize,
}

impl FailingAuditSink {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` writes were attempted, failing the test if they never are.
    pub async fn wait_for_calls(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("timed out waiting for audit writes");
    }
}

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AuditError::Unavailable("audit store offline".to_string()))
    }
}

pub struct TestContext {
    pub clock: Arc<ManualClock>,
    pub directory: Arc<MockDirectory>,
    pub sessions: Arc<SessionManager>,
    pub audit_rx: mpsc::UnboundedReceiver<AuditEvent>,
}

impl TestContext {
    pub fn new() -> Self {
        let (sink, audit_rx) = RecordingAuditSink::new();
        Self::with_sink(Arc::new(sink), audit_rx)
    }

    pub fn with_sink(
        sink: Arc<dyn AuditSink>,
        audit_rx: mpsc::UnboundedReceiver<AuditEvent>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let directory = Arc::new(MockDirectory::default());
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let codec = TokenCodec::new(ACCESS_SECRET, REFRESH_SECRET, dyn_clock.clone());
        let registry = Arc::new(SessionRegistry::new(dyn_clock));
        let sessions = Arc::new(SessionManager::new(
            codec,
            registry,
            directory.clone(),
            sink,
        ));

        Self {
            clock,
            directory,
            sessions,
            audit_rx,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Add a principal to the directory and return it.
    pub fn principal(&self, id: &str, role: Role) -> Principal {
        let principal = Principal {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            role,
            tenant_id: "tenant-a".to_string(),
        };
        self.directory.insert(principal.clone());
        principal
    }

    /// Next audit event, failing the test if none arrives promptly.
    pub async fn next_audit(&mut self) -> AuditEvent {
        tokio::time::timeout(Duration::from_secs(5), self.audit_rx.recv())
            .await
            .expect("timed out waiting for audit event")
            .expect("audit channel closed")
    }
}

pub fn metadata(ip: &str) -> SessionMetadata {
    SessionMetadata {
        ip: Some(ip.to_string()),
        user_agent: Some("test-agent".to_string()),
    }
}
