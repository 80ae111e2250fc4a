//! Service configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). Unparsable numbers fall back to their defaults; unknown
//! enumerated values, a malformed address, or inverted pool bounds are
//! errors.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use crate::middleware::fault_injection::ChaosSettings;
use crate::persistence::PoolSettings;

/// Which [`crate::persistence::PostStore`] backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL through the lazy connection pool.
    Postgres,
    /// Process memory; nothing survives a restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => bail!("unknown store backend `{other}`"),
        }
    }
}

/// Where database credentials are resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// `SECRET_<ID>` environment variables.
    Env,
    /// `<dir>/<id>.json` files.
    File(PathBuf),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => bail!("unknown log format `{other}`"),
        }
    }
}

/// Top-level service configuration.
///
/// Loaded once at startup via [`ServiceConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Socket address to bind the HTTP server to.
    pub listen_addr: SocketAddr,

    /// Storage backend.
    pub store_backend: StoreBackend,

    /// Credential source for the PostgreSQL pool.
    pub secret_source: SecretSource,

    /// Pool bounds, acquire timeout and secret identifier.
    pub pool: PoolSettings,

    /// Upper bound on a single data operation.
    pub statement_timeout: Duration,

    /// Fault injection settings.
    pub chaos: ChaosSettings,

    /// Name of the root path segment.
    pub trace_service_name: String,

    /// UDP trace daemon; segments are logged when unset.
    pub trace_daemon_addr: Option<SocketAddr>,

    /// Log output format.
    pub log_format: LogFormat,
}

impl ServiceConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if an address, backend, secret source or log format
    /// is invalid, or if the minimum pool size exceeds the maximum.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`ServiceConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let listen_addr: SocketAddr = lookup("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8000".to_string())
            .parse()
            .context("LISTEN_ADDR is not a socket address")?;

        let store_backend = lookup("STORE_BACKEND")
            .map_or(Ok(StoreBackend::Postgres), |v| v.parse())
            .context("invalid STORE_BACKEND")?;

        let secret_source = match lookup("SECRET_SOURCE")
            .unwrap_or_else(|| "env".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "env" => SecretSource::Env,
            "file" => SecretSource::File(PathBuf::from(
                lookup("SECRET_DIR").unwrap_or_else(|| "./secrets".to_string()),
            )),
            other => bail!("invalid SECRET_SOURCE `{other}`"),
        };

        let defaults = PoolSettings::default();
        let pool = PoolSettings {
            secret_id: lookup("DB_SECRET_ID").unwrap_or(defaults.secret_id),
            min_connections: parse_or(&lookup, "DATABASE_MIN_CONNECTIONS", defaults.min_connections),
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", defaults.max_connections),
            acquire_timeout: Duration::from_millis(parse_or(
                &lookup,
                "DATABASE_ACQUIRE_TIMEOUT_MS",
                1_000,
            )),
        };
        if pool.max_connections == 0 || pool.min_connections > pool.max_connections {
            bail!(
                "invalid pool bounds: min {} max {}",
                pool.min_connections,
                pool.max_connections
            );
        }

        let statement_timeout =
            Duration::from_millis(parse_or(&lookup, "STATEMENT_TIMEOUT_MS", 5_000));

        let chaos_defaults = ChaosSettings::default();
        let chaos = ChaosSettings {
            enabled: parse_bool_or(&lookup, "CHAOS_ENABLED", chaos_defaults.enabled),
            threshold: parse_or(&lookup, "CHAOS_THRESHOLD", chaos_defaults.threshold),
            exempt_marker: lookup("CHAOS_EXEMPT_MARKER").unwrap_or(chaos_defaults.exempt_marker),
            seed: lookup("CHAOS_SEED").and_then(|v| v.parse().ok()),
        };

        let trace_service_name =
            lookup("TRACE_SERVICE_NAME").unwrap_or_else(|| "chaos-posts".to_string());

        let trace_daemon_addr = lookup("TRACE_DAEMON_ADDR")
            .map(|v| v.parse::<SocketAddr>())
            .transpose()
            .context("TRACE_DAEMON_ADDR is not a socket address")?;

        let log_format = lookup("LOG_FORMAT")
            .map_or(Ok(LogFormat::Pretty), |v| v.parse())
            .context("invalid LOG_FORMAT")?;

        Ok(Self {
            listen_addr,
            store_backend,
            secret_source,
            pool,
            statement_timeout,
            chaos,
            trace_service_name,
            trace_daemon_addr,
            log_format,
        })
    }
}

/// Parses `key` as `T`, returning `default` on missing or invalid values.
fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Parses `key` as a boolean. Accepts `true`/`1` and `false`/`0`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
