//! Additive schema migration for the spans table
//!
//! Databases created by older releases predate the enrichment, performance,
//! and streaming columns. Each migration wave is a fixed list of
//! `(column, type)` pairs added with `ALTER TABLE ... ADD COLUMN`. A column
//! that already exists is a successful no-op, and a failing column does not
//! halt the rest. Migrations are best-effort and individually diagnosable.
//! There is no rollback; re-running the full list is always safe.

use sqlx::SqlitePool;

use crate::error::Result;

/// One named wave of column additions
pub struct Migration {
    pub name: &'static str,
    pub columns: &'static [(&'static str, &'static str)],
}

/// Every migration wave, oldest first. Fresh databases already contain all
/// of these columns; the list only matters for files written by older
/// releases.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "add_provider_enrichment",
        columns: &[
            ("provider", "TEXT"),
            ("model_name", "TEXT"),
            ("model_family", "TEXT"),
            ("prompt_tokens", "INTEGER"),
            ("completion_tokens", "INTEGER"),
            ("total_tokens", "INTEGER"),
            ("reasoning_tokens", "INTEGER"),
            ("estimated_cost_usd", "REAL"),
        ],
    },
    Migration {
        name: "add_performance_metrics",
        columns: &[
            ("ttft_ms", "REAL"),
            ("tokens_per_second", "REAL"),
            ("generation_time_ms", "REAL"),
            ("temperature", "REAL"),
            ("top_p", "REAL"),
            ("top_k", "INTEGER"),
            ("max_tokens", "INTEGER"),
            ("context_window_size", "INTEGER"),
            ("cpu_percent", "REAL"),
            ("memory_mb", "REAL"),
            ("gpu_utilization", "REAL"),
            ("gpu_memory_used_mb", "REAL"),
        ],
    },
    Migration {
        name: "add_streaming_support",
        columns: &[
            ("streaming_enabled", "BOOLEAN DEFAULT FALSE"),
            ("streaming_chunk_count", "INTEGER"),
            ("streaming_ttft_ms", "REAL"),
            ("streaming_total_time_ms", "REAL"),
            ("streaming_avg_inter_chunk_ms", "REAL"),
            ("streaming_per_token_ms", "REAL"),
        ],
    },
];

/// Per-column outcome of a migration run
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Columns newly added this run
    pub added: Vec<String>,
    /// Columns that already existed
    pub skipped: Vec<String>,
    /// `(column, error)` for columns that failed for any other reason
    pub failed: Vec<(String, String)>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run every migration wave against the spans table.
///
/// Only pool-level failures (e.g. the database is gone) abort; individual
/// column failures land in the report.
pub async fn apply_all(pool: &SqlitePool) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    for migration in MIGRATIONS {
        for (column, column_type) in migration.columns {
            let sql = format!("ALTER TABLE spans ADD COLUMN {column} {column_type}");
            match sqlx::query(&sql).execute(pool).await {
                Ok(_) => {
                    tracing::debug!(migration = migration.name, column, "Added column");
                    report.added.push((*column).to_string());
                }
                Err(e) if is_duplicate_column(&e) => {
                    report.skipped.push((*column).to_string());
                }
                Err(e) => {
                    tracing::warn!(
                        migration = migration.name,
                        column,
                        error = %e,
                        "Failed to add column"
                    );
                    report.failed.push(((*column).to_string(), e.to_string()));
                }
            }
        }
    }

    tracing::info!(
        added = report.added.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Schema migration complete"
    );
    Ok(report)
}

fn is_duplicate_column(error: &sqlx::Error) -> bool {
    error.to_string().to_lowercase().contains("duplicate column name")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// The pre-enrichment schema, as written by the earliest release
    async fn legacy_db() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("legacy.db").display());
        let pool = SqlitePoolOptions::new().max_connections(2).connect(&url).await.unwrap();

        sqlx::query(
            "CREATE TABLE spans (
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
                resource TEXT
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        (pool, dir)
    }

    #[tokio::test]
    async fn test_migrates_legacy_schema() {
        let (pool, _dir) = legacy_db().await;

        let report = apply_all(&pool).await.unwrap();
        let total: usize = MIGRATIONS.iter().map(|m| m.columns.len()).sum();
        assert_eq!(report.added.len(), total);
        assert!(report.skipped.is_empty());
        assert!(report.is_clean());

        // The migrated table accepts enriched rows
        sqlx::query(
            "INSERT INTO spans (span_id, trace_id, provider, estimated_cost_usd, streaming_enabled)
             VALUES ('s1', 't1', 'openai', 0.06, TRUE)",
        )
        .execute(&pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_rerun_is_noop() {
        let (pool, _dir) = legacy_db().await;

        apply_all(&pool).await.unwrap();
        let second = apply_all(&pool).await.unwrap();

        assert!(second.added.is_empty());
        assert!(second.is_clean());
        let total: usize = MIGRATIONS.iter().map(|m| m.columns.len()).sum();
        assert_eq!(second.skipped.len(), total);
    }

    #[tokio::test]
    async fn test_current_schema_needs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let db = crate::store::database::RecorderDb::connect(&format!(
            "sqlite:{}",
            dir.path().join("fresh.db").display()
        ))
        .await
        .unwrap();

        let report = apply_all(db.pool()).await.unwrap();
        assert!(report.added.is_empty());
        assert!(report.is_clean());
    }
}
