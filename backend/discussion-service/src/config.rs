/// Configuration management for Discussion Service
///
/// Loads configuration from environment variables (and `.env` in development).
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use doc_store::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Minimum HS256 secret length in bytes
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Document store settings
    pub store: StoreConfig,
    /// Token verification
    pub auth: AuthConfig,
    /// Transaction retry settings
    pub transactions: TransactionConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port
    pub http_port: u16,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

/// Document store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Required for the postgres backend
    pub database_url: Option<String>,
    /// Max connections in pool
    pub max_connections: u32,
    /// How many change notices a live query may lag before it resynchronises
    pub watch_channel_capacity: usize,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the token issuer
    pub jwt_secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl TransactionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
            jitter: true,
        }
    }
}

// Default values
fn default_http_port() -> u16 {
    8080
}

fn default_max_connections() -> u32 {
    20
}

fn default_watch_channel_capacity() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    10
}

fn default_max_backoff_ms() -> u64 {
    500
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app = AppConfig {
            env: lookup("APP_ENV").unwrap_or_else(|| "development".to_string()),
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            http_port: parse_var(&lookup, "PORT").unwrap_or_else(default_http_port),
            json_logs: lookup("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        let backend = match lookup("STORE_BACKEND").as_deref().map(str::trim) {
            None | Some("") | Some("memory") => StoreBackend::Memory,
            Some("postgres") => StoreBackend::Postgres,
            Some(other) => bail!("STORE_BACKEND must be 'memory' or 'postgres', got '{}'", other),
        };
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if backend == StoreBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL environment variable not set (required for STORE_BACKEND=postgres)");
        }

        let store = StoreConfig {
            backend,
            database_url,
            max_connections: parse_var(&lookup, "DB_MAX_CONNECTIONS").unwrap_or_else(default_max_connections),
            watch_channel_capacity: parse_var(&lookup, "WATCH_CHANNEL_CAPACITY")
                .unwrap_or_else(default_watch_channel_capacity),
        };

        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET environment variable not set")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            bail!(
                "JWT_SECRET must be at least {} bytes, got {}",
                MIN_JWT_SECRET_LEN,
                jwt_secret.len()
            );
        }
        let auth = AuthConfig { jwt_secret };

        let transactions = TransactionConfig {
            max_attempts: parse_var(&lookup, "TX_MAX_ATTEMPTS").unwrap_or_else(default_max_attempts),
            initial_backoff_ms: parse_var(&lookup, "TX_INITIAL_BACKOFF_MS").unwrap_or_else(default_initial_backoff_ms),
            max_backoff_ms: parse_var(&lookup, "TX_MAX_BACKOFF_MS").unwrap_or_else(default_max_backoff_ms),
        };

        Ok(Config {
            app,
            store,
            auth,
            transactions,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.env == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[("JWT_SECRET", SECRET)]).unwrap();

        assert_eq!(config.app.env, "development");
        assert_eq!(config.app.host, "0.0.0.0");
        assert_eq!(config.app.http_port, 8080);
        assert!(!config.app.json_logs);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.max_connections, 20);
        assert_eq!(config.store.watch_channel_capacity, 256);
        assert_eq!(config.transactions.max_attempts, 5);
        assert_eq!(config.transactions.initial_backoff_ms, 10);
    }

    #[test]
    fn test_short_secret_is_rejected() {
        assert!(load(&[("JWT_SECRET", "too-short")]).is_err());
        assert!(load(&[]).is_err());
    }

    #[test]
    fn test_postgres_requires_database_url() {
        assert!(load(&[("JWT_SECRET", SECRET), ("STORE_BACKEND", "postgres")]).is_err());

        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("STORE_BACKEND", "postgres"),
            ("DATABASE_URL", "postgres://localhost/discussion"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert!(config.app.json_logs);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(load(&[("JWT_SECRET", SECRET), ("STORE_BACKEND", "mongodb")]).is_err());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("TX_MAX_ATTEMPTS", "9"),
            ("TX_INITIAL_BACKOFF_MS", "25"),
        ])
        .unwrap();
        let policy = config.transactions.retry_policy();
        assert_eq!(policy.max_attempts, 9);
        assert_eq!(policy.initial_backoff, Duration::from_millis(25));
        assert_eq!(policy.max_backoff, Duration::from_millis(500));
    }

    #[test]
    fn test_secret_is_redacted_in_debug_output() {
        let config = load(&[("JWT_SECRET", SECRET)]).unwrap();
        assert!(!format!("{:?}", config).contains(SECRET));
    }
}
