pub mod api;
pub mod audit;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod db;
pub mod jwt;
pub mod password;
pub mod principal;
pub mod rate_limit;
pub mod session;

use api::create_api_router;
use audit::AuditSink;
use auth::ServerSettings;
use axum::Router;
use clock::{Clock, SystemClock};
use db::Database;
use jwt::TokenCodec;
use principal::PrincipalDirectory;
use rate_limit::RateLimitConfig;
use session::{SessionManager, SessionRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens, must differ from the access secret
    pub refresh_secret: Vec<u8>,
    /// Cookie and proxy handling
    pub settings: ServerSettings,
    /// Sessions idle for longer than this are evicted
    pub idle_timeout: Duration,
    /// How often the sweeper runs
    pub sweep_interval: Duration,
}

/// Wire the token codec, session registry and the database collaborators together.
pub fn build_session_manager(config: &ServerConfig, clock: Arc<dyn Clock>) -> Arc<SessionManager> {
    let codec = TokenCodec::new(&config.access_secret, &config.refresh_secret, clock.clone());
    let registry = Arc::new(SessionRegistry::new(clock));
    let directory: Arc<dyn PrincipalDirectory> = Arc::new(config.db.clone());
    let audit: Arc<dyn AuditSink> = Arc::new(config.db.clone());

    Arc::new(SessionManager::new(codec, registry, directory, audit))
}

/// Create the application router.
pub fn create_app(
    sessions: Arc<SessionManager>,
    db: Database,
    settings: ServerSettings,
    rate_limits: Arc<RateLimitConfig>,
) -> Router {
    Router::new().nest("/api", create_api_router(sessions, db, settings, rate_limits))
}

/// Run the server on the given listener until Ctrl-C.
/// The idle-session sweeper runs for as long as the server does.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let sessions = build_session_manager(&config, Arc::new(SystemClock));
    let rate_limits = Arc::new(RateLimitConfig::new(config.settings.trust_proxy));
    let sweeper = cleanup::spawn_sweeper(
        sessions.registry().clone(),
        rate_limits.clone(),
        config.idle_timeout,
        config.sweep_interval,
    );

    let app = create_app(sessions, config.db, config.settings, rate_limits);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let result = axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.stop().await;
    result
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
