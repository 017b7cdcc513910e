//! `StatementExecutor` over an `sqlx::AnyPool`.
//!
//! The Any driver lets one executor serve both SQLite files and Postgres
//! servers; the URL scheme picks the backend at connect time. Every pooled
//! connection is switched to read-only before first use.

use async_trait::async_trait;
use sleuth_core::error::ToolError;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Column, Row, ValueRef};
use tracing::{debug, info, warn};

use crate::text_to_sql::{QueryRows, StatementExecutor};

const TOOL_NAME: &str = "database_query";

pub struct SqlxExecutor {
    pool: AnyPool,
}

impl SqlxExecutor {
    /// Connect a pool to `url` (`sqlite:...` or `postgres://...`).
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, ToolError> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    match read_only_guard(conn.backend_name()) {
                        Some(guard) => {
                            sqlx::query(guard).execute(&mut *conn).await?;
                            debug!(guard, "Connection set read-only");
                        }
                        None => warn!(backend = conn.backend_name(), "No read-only guard for backend"),
                    }
                    Ok(())
                })
            })
            .connect(url)
            .await
            .map_err(|e| ToolError::failed(TOOL_NAME, format!("Failed to connect to database: {e}")))?;

        info!(backend = dialect_for_url(url), "Database pool connected");
        Ok(Self { pool })
    }
}

/// The SQL dialect name for a connection URL, as shown to the SQL model.
pub fn dialect_for_url(url: &str) -> &'static str {
    if url.starts_with("sqlite:") {
        "SQLite"
    } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        "PostgreSQL"
    } else {
        "SQL"
    }
}

/// The session setting that makes a connection refuse writes.
fn read_only_guard(backend: &str) -> Option<&'static str> {
    match backend {
        "SQLite" => Some("PRAGMA query_only = ON"),
        "PostgreSQL" => Some("SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY"),
        _ => None,
    }
}

/// Decode one cell into JSON, trying the types the Any driver supports.
fn decode_cell(row: &AnyRow, index: usize) -> serde_json::Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return serde_json::Value::Null,
        Ok(_) => {}
        Err(_) => return serde_json::Value::Null,
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return serde_json::Number::from_f64(v).map_or(serde_json::Value::Null, Into::into);
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return v.into();
    }
    serde_json::Value::String("<unsupported>".into())
}

#[async_trait]
impl StatementExecutor for SqlxExecutor {
    async fn execute(&self, statement: &str) -> Result<QueryRows, ToolError> {
        let rows = sqlx::query(statement)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ToolError::failed(TOOL_NAME, e))?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| decode_cell(row, i)).collect())
            .collect();

        Ok(QueryRows { columns, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};

    /// A seeded database file and a read-only executor over it.
    async fn seeded() -> (tempfile::TempDir, SqlxExecutor) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fraud.db");

        let writer = SqlitePool::connect_with(SqliteConnectOptions::new().filename(&path).create_if_missing(true))
            .await
            .unwrap();
        for stmt in [
            "CREATE TABLE transactions (id INTEGER PRIMARY KEY, merchant TEXT, amt REAL, is_fraud INTEGER)",
            "INSERT INTO transactions (merchant, amt, is_fraud) VALUES ('fuel_stop', 40.0, 0)",
            "INSERT INTO transactions (merchant, amt, is_fraud) VALUES ('grocer', 60.0, 1)",
            "INSERT INTO transactions (merchant, amt, is_fraud) VALUES (NULL, 20.0, 0)",
        ] {
            sqlx::query(stmt).execute(&writer).await.unwrap();
        }
        writer.close().await;

        let url = format!("sqlite://{}", path.display());
        let executor = SqlxExecutor::connect(&url, 2).await.unwrap();
        (dir, executor)
    }

    async fn count(executor: &SqlxExecutor) -> serde_json::Value {
        executor
            .execute("SELECT count(*) FROM transactions")
            .await
            .unwrap()
            .rows[0][0]
            .clone()
    }

    #[tokio::test]
    async fn decodes_mixed_cells() {
        let (_dir, executor) = seeded().await;
        let result = executor
            .execute("SELECT id, merchant, amt FROM transactions ORDER BY id")
            .await
            .unwrap();

        assert_eq!(result.columns, ["id", "merchant", "amt"]);
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[0], vec![serde_json::json!(1), "fuel_stop".into(), serde_json::json!(40.0)]);
        assert_eq!(result.rows[2][1], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn aggregates_come_back_as_numbers() {
        let (_dir, executor) = seeded().await;
        let result = executor
            .execute("SELECT AVG(amt) AS avg_amount, SUM(is_fraud) AS frauds FROM transactions")
            .await
            .unwrap();
        assert_eq!(result.rows[0], vec![serde_json::json!(40.0), serde_json::json!(1)]);
    }

    #[tokio::test]
    async fn bad_statement_is_execution_failure() {
        let (_dir, executor) = seeded().await;
        let err = executor.execute("SELECT nope FROM missing").await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn writes_are_refused_by_the_database() {
        let (_dir, executor) = seeded().await;

        for write in [
            "WITH d AS (SELECT 1) DELETE FROM transactions",
            "DELETE FROM transactions",
            "INSERT INTO transactions (merchant, amt, is_fraud) VALUES ('x', 1.0, 0)",
            "DROP TABLE transactions",
        ] {
            let err = executor.execute(write).await.unwrap_err();
            assert!(matches!(err, ToolError::ExecutionFailed { .. }), "{write}");
        }
        assert_eq!(count(&executor).await, serde_json::json!(3));
    }

    #[tokio::test]
    async fn in_memory_connections_are_read_only_too() {
        let executor = SqlxExecutor::connect("sqlite::memory:", 1).await.unwrap();
        assert!(executor.execute("CREATE TABLE t (x INTEGER)").await.is_err());
        assert!(executor.execute("SELECT 1 AS one").await.is_ok());
    }

    #[test]
    fn guards_per_backend() {
        assert_eq!(read_only_guard("SQLite"), Some("PRAGMA query_only = ON"));
        assert!(read_only_guard("PostgreSQL").unwrap().contains("READ ONLY"));
        assert_eq!(read_only_guard("MySQL"), None);
    }

    #[test]
    fn dialects() {
        assert_eq!(dialect_for_url("sqlite://fraud.db"), "SQLite");
        assert_eq!(dialect_for_url("postgres://u@h/db"), "PostgreSQL");
        assert_eq!(dialect_for_url("mysql://h/db"), "SQL");
    }
}
