//! Storage contract shared by the PostgreSQL and in-memory backends.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use super::models::{NewPost, Post};
use super::secrets::SecretError;

/// Errors raised by a [`PostStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No connection became free within the acquire timeout.
    #[error("connection pool exhausted after waiting {0:?}")]
    PoolExhausted(Duration),

    /// Database credentials could not be resolved.
    #[error("credential resolution failed: {0}")]
    CredentialResolution(#[from] SecretError),

    /// Opening a connection or the pool failed.
    #[error("failed to connect to database: {0}")]
    Connect(String),

    /// The `posts` table already exists.
    #[error("table `posts` already exists")]
    TableExists,

    /// The `posts` table does not exist.
    #[error("table `posts` does not exist")]
    TableMissing,

    /// A data operation did not finish within the statement timeout.
    #[error("data operation timed out after {0:?}")]
    Timeout(Duration),

    /// The database rejected a statement.
    #[error("query failed: {0}")]
    Query(String),
}

impl StoreError {
    /// Returns `true` for failures to obtain a connection at all.
    #[must_use]
    pub const fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted(_) | Self::CredentialResolution(_) | Self::Connect(_)
        )
    }
}

/// Data operations on the `posts` table.
///
/// Each call checks a connection out of the backend's pool, runs exactly
/// one statement and returns the connection before the call completes, on
/// success and on failure alike.
#[async_trait]
pub trait PostStore: Send + Sync + fmt::Debug {
    /// Creates the `posts` table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TableExists`] if the table is already present.
    async fn create_table(&self) -> Result<(), StoreError>;

    /// Drops the `posts` table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TableMissing`] if there is no table to drop.
    async fn drop_table(&self) -> Result<(), StoreError>;

    /// Inserts a post and returns its generated id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on connection or statement failure.
    async fn insert_post(&self, post: &NewPost) -> Result<i32, StoreError>;

    /// Returns every row whose id equals `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on connection or statement failure.
    async fn find_posts(&self, id: i32) -> Result<Vec<Post>, StoreError>;

    /// Deletes every row whose id equals `id` and returns how many went.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on connection or statement failure.
    async fn delete_posts(&self, id: i32) -> Result<u64, StoreError>;

    /// Releases every pooled connection. Safe to call more than once.
    async fn close(&self);
}
