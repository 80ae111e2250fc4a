//! Persistence layer: the `posts` table behind a pooled connection.
//!
//! [`PostStore`] is the contract handlers depend on. The PostgreSQL
//! backend resolves its credentials through a [`SecretStore`] and opens its
//! pool lazily on first use; the in-memory backend mirrors its semantics
//! for local runs and tests.

pub mod in_memory;
pub mod models;
pub mod pool;
pub mod postgres;
pub mod secrets;
pub mod statements;
pub mod store;

pub use in_memory::InMemoryPostStore;
pub use models::{NewPost, Post};
pub use pool::{LazyPool, PoolSettings};
pub use postgres::PostgresPostStore;
pub use secrets::{DbCredentials, EnvSecretStore, FileSecretStore, SecretError, SecretStore};
pub use store::{PostStore, StoreError};
