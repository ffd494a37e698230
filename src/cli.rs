//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use crate::ServerConfig;
use crate::auth::ServerSettings;
use crate::cleanup::{IDLE_TIMEOUT, SWEEP_INTERVAL};
use crate::db::Database;
use crate::password::hash_password;
use crate::principal::Role;
use clap::Parser;
use rand::{Rng, distr::Alphanumeric};
use tracing::{error, info};

const MIN_SECRET_LENGTH: usize = 32;
const GENERATED_PASSWORD_LENGTH: usize = 24;

const ACCESS_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET";
const REFRESH_SECRET_ENV: &str = "REFRESH_TOKEN_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "auditdesk",
    about = "Session and token service for the audit dashboard"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7300", env = "AUDITDESK_PORT")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "auditdesk.db", env = "AUDITDESK_DATABASE")]
    pub database: String,

    /// Path to file containing the access token secret. Prefer ACCESS_TOKEN_SECRET instead
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer REFRESH_TOKEN_SECRET instead
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// End sessions idle for longer than this many seconds
    #[arg(long, default_value_t = IDLE_TIMEOUT.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub idle_timeout_secs: u64,

    /// Seconds between idle session sweeps
    #[arg(long, default_value_t = SWEEP_INTERVAL.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval_secs: u64,

    /// Omit the Secure flag on cookies (plain HTTP development setups)
    #[arg(long)]
    pub insecure_cookies: bool,

    /// Take the client IP from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long)]
    pub trust_proxy: bool,

    /// Create an admin with this email on startup and print its password
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Tenant for the admin created with --create-admin
    #[arg(long, default_value = "default")]
    pub tenant: String,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load one signing secret from an environment variable or a file.
fn load_secret(env_var: &str, file: Option<&str>, flag: &str) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            "{} is required. Set the environment variable (recommended) or use {}",
            env_var, flag
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env_var, MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load the access and refresh token secrets.
/// Returns None and logs an error if either secret is unusable or the two are equal.
pub fn load_secrets(
    access_secret_file: Option<&str>,
    refresh_secret_file: Option<&str>,
) -> Option<(String, String)> {
    let access = load_secret(ACCESS_SECRET_ENV, access_secret_file, "--access-secret-file")?;
    let refresh = load_secret(REFRESH_SECRET_ENV, refresh_secret_file, "--refresh-secret-file")?;

    if access == refresh {
        error!("Access and refresh token secrets must differ");
        return None;
    }

    Some((access, refresh))
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Handle the --create-admin flag: create an admin with a generated password,
/// or report that the email is already taken.
pub async fn handle_create_admin(db: &Database, email: &str, tenant: &str) {
    match db.principals().get_credentials(email).await {
        Ok(Some(existing)) => {
            println!();
            println!(
                "Principal already exists: {} ({})",
                existing.principal.email,
                existing.principal.role.as_str()
            );
            println!();
        }
        Ok(None) => {
            let password = generate_password();
            let hash = match hash_password(&password) {
                Ok(hash) => hash,
                Err(e) => {
                    error!(error = %e, "Failed to hash admin password");
                    std::process::exit(1);
                }
            };

            match db.principals().create(tenant, email, &hash, Role::Admin).await {
                Ok(principal) => {
                    println!();
                    println!("Admin created: {} (tenant {})", principal.email, tenant);
                    println!("Password: {}", password);
                    println!();
                }
                Err(e) => {
                    error!(error = %e, "Failed to create admin");
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to check for existing principal");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, secrets: (String, String)) -> ServerConfig {
    let (access_secret, refresh_secret) = secrets;

    ServerConfig {
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        settings: ServerSettings {
            secure_cookies: !args.insecure_cookies,
            trust_proxy: args.trust_proxy,
        },
        idle_timeout: Duration::from_secs(args.idle_timeout_secs),
        sweep_interval: Duration::from_secs(args.sweep_interval_secs),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["auditdesk"]).unwrap();
        assert_eq!(args.idle_timeout_secs, 1800);
        assert_eq!(args.sweep_interval_secs, 60);
        assert!(!args.insecure_cookies);
        assert_eq!(args.tenant, "default");
        assert!(args.create_admin.is_none());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        assert!(Args::try_parse_from(["auditdesk", "--idle-timeout-secs", "0"]).is_err());
        assert!(Args::try_parse_from(["auditdesk", "--sweep-interval-secs", "0"]).is_err());
    }

    #[test]
    fn test_generated_password() {
        let a = generate_password();
        let b = generate_password();
        assert_eq!(a.len(), GENERATED_PASSWORD_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_build_config_secure_by_default() {
        let db = Database::open(":memory:").await.unwrap();
        let args = Args::try_parse_from(["auditdesk", "--trust-proxy"]).unwrap();
        let config = build_config(&args, db, ("a".repeat(32), "b".repeat(32)));

        assert!(config.settings.secure_cookies);
        assert!(config.settings.trust_proxy);
        assert_eq!(config.idle_timeout, Duration::from_secs(1800));
    }
}
