//! SQLite database layer for the telemetry store
//!
//! Owns the connection pool and the schema: the `spans` table (with its
//! enrichment columns), the `vector_metadata` table, and the lazily-created
//! per-dimension vector tables. Schema creation is idempotent, and the spans
//! table evolves additively (see [`super::migrate`]); there is no
//! destructive migration path.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Spans table plus its indexes. Every column the writer fills must exist
/// here; older databases are brought up via the additive migrator.
const SCHEMA_SQL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS spans (
        span_id TEXT PRIMARY KEY,
        trace_id TEXT NOT NULL,
        parent_span_id TEXT,
        name TEXT,
        kind TEXT,
        start_time INTEGER,
        end_time INTEGER,
        status_code TEXT,
        status_message TEXT,
        attributes TEXT,
        events TEXT,
        resource TEXT,
        provider TEXT,
        model_name TEXT,
        model_family TEXT,
        prompt_tokens INTEGER,
        completion_tokens INTEGER,
        total_tokens INTEGER,
        reasoning_tokens INTEGER,
        estimated_cost_usd REAL,
        ttft_ms REAL,
        tokens_per_second REAL,
        generation_time_ms REAL,
        temperature REAL,
        top_p REAL,
        top_k INTEGER,
        max_tokens INTEGER,
        context_window_size INTEGER,
        cpu_percent REAL,
        memory_mb REAL,
        gpu_utilization REAL,
        gpu_memory_used_mb REAL,
        streaming_enabled BOOLEAN DEFAULT FALSE,
        streaming_chunk_count INTEGER,
        streaming_ttft_ms REAL,
        streaming_total_time_ms REAL,
        streaming_avg_inter_chunk_ms REAL,
        streaming_per_token_ms REAL
    )",
    "CREATE INDEX IF NOT EXISTS idx_trace_id ON spans(trace_id)",
    "CREATE INDEX IF NOT EXISTS idx_start_time ON spans(start_time)",
    "CREATE TABLE IF NOT EXISTS vector_metadata (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        vector_rowid INTEGER NOT NULL,
        table_name TEXT NOT NULL,
        span_id TEXT NOT NULL,
        trace_id TEXT NOT NULL,
        content TEXT,
        metadata TEXT
    )",
];

/// Telemetry database handle
///
/// Cheap to clone; all clones share one pool. SQLite serializes concurrent
/// writers itself; the store does not retry on lock contention.
#[derive(Clone)]
pub struct RecorderDb {
    pool: SqlitePool,
}

impl RecorderDb {
    /// Open (or create) the database and bootstrap the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite URL, e.g. `"sqlite:./flight_recorder.db"`
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, 5, Duration::from_secs(30)).await
    }

    /// Open the database using pool settings from configuration
    pub async fn from_config(cfg: &DatabaseConfig) -> Result<Self> {
        Self::connect_with(
            &cfg.database_url(),
            cfg.max_connections,
            Duration::from_secs(cfg.busy_timeout_seconds),
        )
        .await
    }

    async fn connect_with(
        database_url: &str,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal) // Write-Ahead Logging for concurrent reads
            .busy_timeout(busy_timeout)
            .pragma("temp_store", "memory")
            .pragma("synchronous", "NORMAL");

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections) // Limited for SQLite (single writer)
            .acquire_timeout(busy_timeout)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Create tables and indexes if absent. Safe to call repeatedly.
    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA_SQL {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        tracing::debug!("Telemetry schema ready");
        Ok(())
    }

    /// Row counts across the store
    pub async fn stats(&self) -> Result<StoreStats> {
        let span_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM spans")
            .fetch_one(&self.pool)
            .await?;

        let trace_count: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT trace_id) FROM spans")
                .fetch_one(&self.pool)
                .await?;

        let vector_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_metadata")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            span_count: span_count as u64,
            trace_count: trace_count as u64,
            vector_count: vector_count as u64,
        })
    }

    /// Names of every per-dimension vector table currently in the store
    pub async fn vector_table_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name LIKE 'vectors\\_%' ESCAPE '\\'
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("name")).collect())
    }

    /// Delete all recorded telemetry: spans, vector metadata, and every
    /// per-dimension vector table.
    ///
    /// Requires exclusive access and must not run concurrently with any
    /// writer. The store does not enforce this; callers own the guarantee.
    pub async fn clear_all(&self) -> Result<()> {
        let vector_tables = self.vector_table_names().await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM spans").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM vector_metadata").execute(&mut *tx).await?;

        for table in &vector_tables {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(dropped_vector_tables = vector_tables.len(), "Cleared telemetry store");
        Ok(())
    }

    /// The underlying connection pool (for advanced usage)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Store-wide row counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub span_count: u64,
    pub trace_count: u64,
    pub vector_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_db() -> (RecorderDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = RecorderDb::connect(&format!("sqlite:{}", path.display())).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn test_schema_bootstrap_is_idempotent() {
        let (db, _dir) = create_test_db().await;
        // A second bootstrap over the same file must be a no-op
        db.init_schema().await.unwrap();

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.span_count, 0);
        assert_eq!(stats.vector_count, 0);
    }

    #[tokio::test]
    async fn test_no_vector_tables_initially() {
        let (db, _dir) = create_test_db().await;
        assert!(db.vector_table_names().await.unwrap().is_empty());
    }
}
