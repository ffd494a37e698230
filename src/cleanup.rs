//! Scheduled eviction of idle sessions and stale rate-limit state.

use crate::rate_limit::RateLimitConfig;
use crate::session::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Sessions idle longer than this are evicted.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Interval between sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Run one sweep. Returns how many sessions were evicted.
pub fn run_sweep(registry: &SessionRegistry, idle_timeout: Duration) -> usize {
    let evicted = registry.evict_idle(idle_timeout);
    if evicted > 0 {
        info!(
            evicted,
            remaining = registry.len(),
            "Evicted idle sessions"
        );
    }
    evicted
}

/// Handle to a running sweeper task. Dropping it also stops the sweeper.
pub struct SweeperHandle {
    shutdown: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}

/// Prune per-IP limiter state for clients that have fully recovered.
pub fn prune_rate_limits(rate_limits: &RateLimitConfig) {
    let tracked = rate_limits.prune();
    debug!(tracked, "Pruned rate limiter state");
}

/// Spawn a background task that sweeps the registry and prunes the rate
/// limiters every `interval`.
pub fn spawn_sweeper(
    registry: Arc<SessionRegistry>,
    rate_limits: Arc<RateLimitConfig>,
    idle_timeout: Duration,
    interval: Duration,
) -> SweeperHandle {
    let (shutdown, mut stopped) = oneshot::channel();

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    run_sweep(&registry, idle_timeout);
                    prune_rate_limits(&rate_limits);
                }
                _ = &mut stopped => {
                    debug!("Session sweeper stopped");
                    break;
                }
            }
        }
    });

    SweeperHandle { shutdown, task }
}
