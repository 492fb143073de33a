//! Runs validated queries and reads back a single scalar.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use deadpool::managed::{Manager, Object, Pool};
use thiserror::Error;
use tokio_postgres::SimpleQueryMessage;
use tracing::{error, info};

use super::normalizer::ScalarValue;
use super::validator::ValidatedQuery;
use crate::repository::pool::{acquire, PoolError};
use crate::repository::util::pg_error_message;

/// Errors raised while executing a validated query.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("database error: {0}")]
    Database(String),

    #[error("statement timed out after {0:?}")]
    Timeout(Duration),

    #[error("expected one row with one column, got {rows} row(s) and {columns} column(s)")]
    Shape { rows: usize, columns: usize },
}

/// A pooled connection that can answer a query with one scalar.
#[async_trait]
pub trait ScalarConnection: Send {
    /// Run `sql` and return its only cell.
    async fn query_scalar(&mut self, sql: &str) -> Result<ScalarValue, ExecutionError>;
}

#[async_trait]
impl ScalarConnection for tokio_postgres::Client {
    async fn query_scalar(&mut self, sql: &str) -> Result<ScalarValue, ExecutionError> {
        // Parsing as a prepared statement makes the engine refuse anything
        // that is more than one command, whatever the gate concluded.
        self.prepare(sql)
            .await
            .map_err(|e| ExecutionError::Database(pg_error_message(&e)))?;

        // Text protocol: every column type comes back in the engine's own
        // canonical rendering, numeric included.
        let messages = self
            .simple_query(sql)
            .await
            .map_err(|e| ExecutionError::Database(pg_error_message(&e)))?;

        let rows: Vec<_> = messages
            .into_iter()
            .filter_map(|msg| match msg {
                SimpleQueryMessage::Row(row) => Some(row),
                _ => None,
            })
            .collect();

        let columns = rows.first().map_or(0, |row| row.len());
        if rows.len() != 1 || columns != 1 {
            return Err(ExecutionError::Shape {
                rows: rows.len(),
                columns,
            });
        }

        let cell = rows[0]
            .try_get(0)
            .map_err(|e| ExecutionError::Database(pg_error_message(&e)))?;
        Ok(ScalarValue::from_text(cell))
    }
}

/// Executes validated queries on connections borrowed from a pool.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    statement_timeout: Duration,
    acquire_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(statement_timeout: Duration, acquire_timeout: Duration) -> Self {
        Self {
            statement_timeout,
            acquire_timeout,
        }
    }

    /// Execute `query` on one pooled connection.
    ///
    /// The connection goes back to the pool when this returns or when the
    /// future is dropped. A connection whose statement outlived
    /// `statement_timeout` is detached from the pool instead, since it may
    /// still be busy server-side.
    pub async fn execute<M>(
        &self,
        query: &ValidatedQuery,
        pool: &Pool<M>,
    ) -> Result<ScalarValue, ExecutionError>
    where
        M: Manager,
        M::Type: ScalarConnection,
        M::Error: Display,
    {
        let mut conn = acquire(pool, self.acquire_timeout).await?;

        info!("Executing SQL: {}", query);
        let outcome =
            tokio::time::timeout(self.statement_timeout, conn.query_scalar(query.as_str())).await;

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!("Database execution error: {}", e);
                Err(e)
            }
            Err(_) => {
                error!(
                    "Statement exceeded {:?}, discarding connection",
                    self.statement_timeout
                );
                drop(Object::take(conn));
                Err(ExecutionError::Timeout(self.statement_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::testing::{FakeManager, FakeReply};
    use crate::query::validate;
    use crate::repository::pool::{build_pool, PoolSettings, PoolStatus};

    fn executor() -> QueryExecutor {
        QueryExecutor::new(Duration::from_millis(200), Duration::from_millis(200))
    }

    fn settings(max_size: usize) -> PoolSettings {
        PoolSettings {
            min_size: 1,
            max_size,
            acquire_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_returns_scalar_and_releases_connection() {
        let manager = FakeManager::new(|sql| {
            assert_eq!(sql, "SELECT COUNT(*) FROM videos;");
            FakeReply::value("358")
        });
        let pool = build_pool(manager, &settings(2)).await.unwrap();

        let query = validate("SELECT COUNT(*) FROM videos;").unwrap();
        let value = executor().execute(&query, &pool).await.unwrap();

        assert_eq!(value, ScalarValue::Integer(358));
        assert_eq!(PoolStatus::of(&pool).in_use, 0);
    }

    #[tokio::test]
    async fn test_null_result() {
        let pool = build_pool(FakeManager::new(|_| FakeReply::null()), &settings(1))
            .await
            .unwrap();
        let query = validate("SELECT SUM(delta_views_count) FROM video_snapshots").unwrap();
        let value = executor().execute(&query, &pool).await.unwrap();
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn test_database_error_releases_connection() {
        let pool = build_pool(
            FakeManager::new(|_| FakeReply::fail("column \"nope\" does not exist")),
            &settings(1),
        )
        .await
        .unwrap();

        let query = validate("SELECT nope FROM videos").unwrap();
        let err = executor().execute(&query, &pool).await.unwrap_err();

        assert!(matches!(err, ExecutionError::Database(ref m) if m.contains("nope")));
        assert_eq!(PoolStatus::of(&pool).in_use, 0);
        assert_eq!(PoolStatus::of(&pool).size, 1);
    }

    #[tokio::test]
    async fn test_timeout_discards_connection() {
        let manager = FakeManager::new(|_| FakeReply::hang());
        let created = manager.created();
        let pool = build_pool(manager, &settings(1)).await.unwrap();
        assert_eq!(created.load(std::sync::atomic::Ordering::SeqCst), 1);

        let query = validate("SELECT pg_sleep(60)").unwrap();
        let err = executor().execute(&query, &pool).await.unwrap_err();

        assert!(matches!(err, ExecutionError::Timeout(_)));
        let status = PoolStatus::of(&pool);
        assert_eq!(status.in_use, 0);
        assert_eq!(status.size, 0);
    }

    #[tokio::test]
    async fn test_cancelled_request_releases_connection() {
        let pool = build_pool(FakeManager::new(|_| FakeReply::hang()), &settings(1))
            .await
            .unwrap();
        let query = validate("SELECT 1").unwrap();
        let long = QueryExecutor::new(Duration::from_secs(60), Duration::from_secs(1));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), long.execute(&query, &pool)).await;
        assert!(cancelled.is_err());

        let status = PoolStatus::of(&pool);
        assert_eq!(status.in_use, 0);
        assert_eq!(status.available, 1);
    }

    #[tokio::test]
    async fn test_exhausted_pool_is_a_pool_error() {
        let pool = build_pool(FakeManager::new(|_| FakeReply::value("1")), &settings(1))
            .await
            .unwrap();
        let _held = pool.get().await.unwrap();

        let query = validate("SELECT 1").unwrap();
        let err = executor().execute(&query, &pool).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Pool(PoolError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_shape_mismatch() {
        let pool = build_pool(
            FakeManager::new(|_| FakeReply::shape(3, 1)),
            &settings(1),
        )
        .await
        .unwrap();
        let query = validate("SELECT id FROM videos").unwrap();
        let err = executor().execute(&query, &pool).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Shape { rows: 3, columns: 1 }));
    }
}
