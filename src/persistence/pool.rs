//! Lazily created PostgreSQL connection pool.
//!
//! The pool does not exist until the first [`LazyPool::acquire`]. That call
//! resolves credentials from the [`SecretStore`], opens a `sqlx` pool with
//! the configured bounds and keeps it for the life of the process. Callers
//! racing on the first acquire share a single initialization; a failed
//! initialization is retried by the next caller.
//!
//! Connections are [`PoolConnection`] guards: dropping one checks it back
//! in, so every exit path of a handler releases its connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres};
use tokio::sync::OnceCell;

use super::secrets::SecretStore;
use super::store::StoreError;

/// Pool bounds and credential source.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Identifier of the secret holding the database credentials.
    pub secret_id: String,
    /// Connections kept open once the pool exists.
    pub min_connections: u32,
    /// Hard upper bound on open connections.
    pub max_connections: u32,
    /// Longest wait for a free connection before giving up.
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            secret_id: "posts-db".to_string(),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(1),
        }
    }
}

/// Owned, lazily initialized connection pool.
#[derive(Debug)]
pub struct LazyPool {
    settings: PoolSettings,
    secrets: Arc<dyn SecretStore>,
    pool: OnceCell<PgPool>,
    closed: AtomicBool,
}

impl LazyPool {
    /// Creates an uninitialized pool. No connection is opened yet.
    #[must_use]
    pub fn new(settings: PoolSettings, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            settings,
            secrets,
            pool: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns `true` once the first acquire has opened the pool.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    /// Checks a connection out of the pool, creating the pool if needed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::CredentialResolution`] if the secret cannot be read.
    /// - [`StoreError::Connect`] if the database is unreachable or the pool
    ///   was closed.
    /// - [`StoreError::PoolExhausted`] if every connection stays busy for
    ///   the whole acquire timeout.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Connect("connection pool is closed".to_string()));
        }

        let pool = self.pool.get_or_try_init(|| self.open()).await?;
        pool.acquire().await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => StoreError::PoolExhausted(self.settings.acquire_timeout),
            other => StoreError::Connect(other.to_string()),
        })
    }

    async fn open(&self) -> Result<PgPool, StoreError> {
        let creds = self.secrets.resolve(&self.settings.secret_id).await?;
        tracing::info!(
            host = %creds.host,
            port = creds.port,
            dbname = %creds.dbname,
            min = self.settings.min_connections,
            max = self.settings.max_connections,
            "opening connection pool"
        );

        let options = PgConnectOptions::new()
            .host(&creds.host)
            .port(creds.port)
            .username(&creds.username)
            .password(&creds.password)
            .database(&creds.dbname);

        PgPoolOptions::new()
            .min_connections(self.settings.min_connections)
            .max_connections(self.settings.max_connections)
            .acquire_timeout(self.settings.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))
    }

    /// Closes every connection. A no-op if the pool was never created or
    /// has already been closed.
    pub async fn close_all(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pool) = self.pool.get() {
            tracing::info!(open = pool.size(), "closing all open connections");
            pool.close().await;
        }
    }
}
