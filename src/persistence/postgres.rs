//! PostgreSQL implementation of [`PostStore`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::models::{NewPost, Post};
use super::pool::LazyPool;
use super::statements;
use super::store::{PostStore, StoreError};

/// SQLSTATE `duplicate_table`.
const DUPLICATE_TABLE: &str = "42P07";
/// SQLSTATE `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

/// PostgreSQL-backed post store on top of a [`LazyPool`].
#[derive(Debug)]
pub struct PostgresPostStore {
    pool: LazyPool,
    statement_timeout: Duration,
}

impl PostgresPostStore {
    /// Creates a store. The pool stays closed until the first operation.
    #[must_use]
    pub fn new(pool: LazyPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Runs one statement under the statement timeout.
    async fn bounded<T, F>(&self, statement: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.statement_timeout, statement).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(StoreError::Timeout(self.statement_timeout)),
        }
    }
}

/// Maps a driver error onto the store taxonomy.
fn classify(err: sqlx::Error) -> StoreError {
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());
    match code.as_deref() {
        Some(DUPLICATE_TABLE) => StoreError::TableExists,
        Some(UNDEFINED_TABLE) => StoreError::TableMissing,
        _ => match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::Connect(err.to_string()),
            other => StoreError::Query(other.to_string()),
        },
    }
}

#[async_trait]
impl PostStore for PostgresPostStore {
    async fn create_table(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        self.bounded(sqlx::query(statements::CREATE_TABLE).execute(&mut *conn))
            .await?;
        Ok(())
    }

    async fn drop_table(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        self.bounded(sqlx::query(statements::DROP_TABLE).execute(&mut *conn))
            .await?;
        Ok(())
    }

    async fn insert_post(&self, post: &NewPost) -> Result<i32, StoreError> {
        let mut conn = self.pool.acquire().await?;
        self.bounded(
            sqlx::query_scalar::<_, i32>(statements::INSERT_POST)
                .bind(&post.title)
                .bind(&post.content)
                .bind(&post.username)
                .fetch_one(&mut *conn),
        )
        .await
    }

    async fn find_posts(&self, id: i32) -> Result<Vec<Post>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let rows = self
            .bounded(
                sqlx::query_as::<_, (i32, Option<String>, Option<String>, Option<String>)>(
                    statements::SELECT_POSTS,
                )
                .bind(id)
                .fetch_all(&mut *conn),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, username, title, content)| Post {
                id,
                username: username.unwrap_or_default(),
                title: title.unwrap_or_default(),
                content: content.unwrap_or_default(),
            })
            .collect())
    }

    async fn delete_posts(&self, id: i32) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = self
            .bounded(
                sqlx::query(statements::DELETE_POSTS)
                    .bind(id)
                    .execute(&mut *conn),
            )
            .await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close_all().await;
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::persistence::pool::PoolSettings;
    use crate::persistence::secrets::EnvSecretStore;

    #[test]
    fn pool_errors_classify_as_connection_failures() {
        assert!(classify(sqlx::Error::PoolTimedOut).is_connection_failure());
        assert!(classify(sqlx::Error::PoolClosed).is_connection_failure());
        assert!(matches!(
            classify(sqlx::Error::RowNotFound),
            StoreError::Query(_)
        ));
    }

    /// Needs `SECRET_POSTS_DB` pointing at a scratch database.
    #[tokio::test]
    #[ignore = "requires PostgreSQL"]
    async fn round_trip_against_postgres() {
        let pool = LazyPool::new(PoolSettings::default(), Arc::new(EnvSecretStore));
        let store = PostgresPostStore::new(pool, Duration::from_secs(5));

        let _ = store.drop_table().await;
        assert!(store.create_table().await.is_ok());
        assert!(matches!(
            store.create_table().await,
            Err(StoreError::TableExists)
        ));

        let post = NewPost {
            title: "hello".to_string(),
            content: "it's a post; DROP TABLE posts; --".to_string(),
            username: "o'brien".to_string(),
        };
        let Ok(id) = store.insert_post(&post).await else {
            panic!("insert failed");
        };
        let Ok(rows) = store.find_posts(id).await else {
            panic!("select failed");
        };
        assert_eq!(rows, vec![post.into_post(id)]);

        assert!(matches!(store.delete_posts(id).await, Ok(1)));
        assert!(matches!(store.delete_posts(id).await, Ok(0)));

        assert!(store.drop_table().await.is_ok());
        assert!(matches!(
            store.drop_table().await,
            Err(StoreError::TableMissing)
        ));
        store.close().await;
    }
}
