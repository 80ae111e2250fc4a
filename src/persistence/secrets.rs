//! Database credential resolution.
//!
//! The connection pool never reads credentials from its own configuration.
//! It asks a [`SecretStore`] for a secret identifier when the pool is first
//! created, so rotated credentials are picked up on the next pool creation.
//!
//! A secret is a JSON document of the shape:
//! ```json
//! {
//!   "username": "postgres",
//!   "password": "...",
//!   "host": "db.internal",
//!   "port": 5432,
//!   "dbname": "pgdb"
//! }
//! ```
//! `port` may be given as a number or a numeric string.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

/// Errors raised while resolving a secret.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// No secret exists under the given identifier.
    #[error("secret `{0}` not found")]
    NotFound(String),

    /// The secret exists but could not be read.
    #[error("secret `{id}` could not be read: {source}")]
    Unreadable {
        /// Secret identifier.
        id: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The secret is not a valid credentials document.
    #[error("secret `{id}` is malformed: {source}")]
    Malformed {
        /// Secret identifier.
        id: String,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Connection credentials resolved from a secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DbCredentials {
    /// Database role.
    pub username: String,
    /// Role password.
    pub password: String,
    /// Database host name or address.
    pub host: String,
    /// Database port.
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    /// Database name.
    pub dbname: String,
}

impl fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .finish()
    }
}

impl DbCredentials {
    /// Parses a credentials document.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Malformed`] if `raw` is not a valid document.
    pub fn parse(secret_id: &str, raw: &str) -> Result<Self, SecretError> {
        serde_json::from_str(raw).map_err(|source| SecretError::Malformed {
            id: secret_id.to_string(),
            source,
        })
    }
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Source of database credentials.
#[async_trait]
pub trait SecretStore: Send + Sync + fmt::Debug {
    /// Resolves the credentials stored under `secret_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`SecretError`] if the secret is missing, unreadable or
    /// malformed.
    async fn resolve(&self, secret_id: &str) -> Result<DbCredentials, SecretError>;
}

/// Reads secrets from environment variables.
///
/// The secret `posts-db` is looked up in `SECRET_POSTS_DB`: the identifier
/// is upper-cased and every character that is not ASCII alphanumeric
/// becomes `_`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    /// Returns the environment variable holding `secret_id`.
    #[must_use]
    pub fn var_name(secret_id: &str) -> String {
        let suffix: String = secret_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("SECRET_{suffix}")
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn resolve(&self, secret_id: &str) -> Result<DbCredentials, SecretError> {
        let raw = std::env::var(Self::var_name(secret_id))
            .map_err(|_| SecretError::NotFound(secret_id.to_string()))?;
        DbCredentials::parse(secret_id, &raw)
    }
}

/// Reads secrets from `<dir>/<secret_id>.json`.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, secret_id: &str) -> PathBuf {
        self.dir.join(format!("{secret_id}.json"))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn resolve(&self, secret_id: &str) -> Result<DbCredentials, SecretError> {
        let path = self.path_for(secret_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SecretError::NotFound(secret_id.to_string()));
            }
            Err(source) => {
                return Err(SecretError::Unreadable {
                    id: secret_id.to_string(),
                    source,
                });
            }
        };
        DbCredentials::parse(secret_id, &raw)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "username": "postgres",
        "password": "hunter2",
        "host": "localhost",
        "port": 5432,
        "dbname": "pgdb",
        "engine": "postgres"
    }"#;

    #[test]
    fn parses_numeric_port_and_ignores_extra_keys() {
        let Ok(creds) = DbCredentials::parse("db", DOC) else {
            panic!("valid document rejected");
        };
        assert_eq!(creds.username, "postgres");
        assert_eq!(creds.port, 5432);
        assert_eq!(creds.dbname, "pgdb");
    }

    #[test]
    fn parses_string_port() {
        let raw = r#"{"username":"u","password":"p","host":"h","port":"6543","dbname":"d"}"#;
        let Ok(creds) = DbCredentials::parse("db", raw) else {
            panic!("string port rejected");
        };
        assert_eq!(creds.port, 6543);
    }

    #[test]
    fn missing_field_is_malformed() {
        let raw = r#"{"username":"u","password":"p","host":"h","port":5432}"#;
        let err = DbCredentials::parse("db", raw);
        assert!(matches!(err, Err(SecretError::Malformed { .. })));
    }

    #[test]
    fn debug_redacts_password() {
        let Ok(creds) = DbCredentials::parse("db", DOC) else {
            panic!("valid document rejected");
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn env_var_name_is_sanitized() {
        assert_eq!(EnvSecretStore::var_name("posts-db"), "SECRET_POSTS_DB");
        assert_eq!(
            EnvSecretStore::var_name("rds/cluster.main"),
            "SECRET_RDS_CLUSTER_MAIN"
        );
    }

    #[tokio::test]
    async fn env_store_reports_missing_secret() {
        let store = EnvSecretStore;
        let id = format!("absent-{}", uuid::Uuid::new_v4());
        let err = store.resolve(&id).await;
        assert!(matches!(err, Err(SecretError::NotFound(found)) if found == id));
    }

    #[tokio::test]
    async fn file_store_reads_json_document() {
        let dir = std::env::temp_dir().join(format!("chaos-posts-{}", uuid::Uuid::new_v4()));
        if tokio::fs::create_dir_all(&dir).await.is_err() {
            panic!("could not create temp dir");
        }
        if tokio::fs::write(dir.join("posts-db.json"), DOC).await.is_err() {
            panic!("could not write secret");
        }

        let store = FileSecretStore::new(&dir);
        let Ok(creds) = store.resolve("posts-db").await else {
            panic!("secret not resolved");
        };
        assert_eq!(creds.host, "localhost");

        let missing = store.resolve("other").await;
        assert!(matches!(missing, Err(SecretError::NotFound(_))));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
