//! Read surface over the telemetry store
//!
//! Read-only helpers consumed by rendering layers, debugging UIs, and the
//! replay workflow. Everything here is defined purely by the persisted
//! schema and the writer's upsert semantics.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::Result;
use crate::store::database::RecorderDb;
use crate::store::span::StoredSpan;
use crate::store::vector::VectorMetadataRow;

/// One trace as seen in a listing
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TraceSummary {
    pub trace_id: String,
    pub span_count: i64,
    /// Earliest span start in the trace (ns epoch)
    pub start_time: Option<i64>,
    /// Latest span end in the trace (ns epoch)
    pub end_time: Option<i64>,
}

/// Everything a replay workflow needs to re-issue an LLM call.
///
/// `provider`/`model_name` can be absent for spans that never went through
/// an LLM wrapper; the replay layer decides how to handle those.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayContext {
    pub span_id: String,
    pub provider: Option<String>,
    pub model_name: Option<String>,
    /// Verbatim prompt text as recorded on the span
    pub prompt: String,
    /// Verbatim completion text as recorded on the span
    pub completion: String,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
}

impl RecorderDb {
    /// List all traces, earliest first
    pub async fn list_traces(&self) -> Result<Vec<TraceSummary>> {
        let traces = sqlx::query_as::<_, TraceSummary>(
            "SELECT trace_id,
                    COUNT(*) AS span_count,
                    MIN(start_time) AS start_time,
                    MAX(end_time) AS end_time
             FROM spans
             GROUP BY trace_id
             ORDER BY MIN(start_time) ASC",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(traces)
    }

    /// All spans of one trace, ordered by start time
    pub async fn trace_spans(&self, trace_id: &str) -> Result<Vec<StoredSpan>> {
        let spans = sqlx::query_as::<_, StoredSpan>(
            "SELECT * FROM spans WHERE trace_id = ? ORDER BY start_time ASC",
        )
        .bind(trace_id)
        .fetch_all(self.pool())
        .await?;

        Ok(spans)
    }

    /// One span by id
    pub async fn span(&self, span_id: &str) -> Result<Option<StoredSpan>> {
        let span = sqlx::query_as::<_, StoredSpan>("SELECT * FROM spans WHERE span_id = ?")
            .bind(span_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(span)
    }

    /// Vector metadata rows linked to a span
    pub async fn vectors_for_span(&self, span_id: &str) -> Result<Vec<VectorMetadataRow>> {
        let rows = sqlx::query_as::<_, VectorMetadataRow>(
            "SELECT id, vector_rowid, table_name, span_id, trace_id, content, metadata
             FROM vector_metadata
             WHERE span_id = ?
             ORDER BY id ASC",
        )
        .bind(span_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Recorded context for replaying a span's LLM call.
    ///
    /// Returns `None` when the span does not exist. Prompt and completion
    /// come back verbatim from the `gen_ai.prompt` / `gen_ai.completion`
    /// attributes (empty when the wrapper never recorded them).
    pub async fn replay_context(&self, span_id: &str) -> Result<Option<ReplayContext>> {
        let Some(span) = self.span(span_id).await? else {
            return Ok(None);
        };

        let attrs = span.attribute_map();
        let text_attr = |key: &str| {
            attrs.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
        };

        Ok(Some(ReplayContext {
            span_id: span.span_id,
            provider: span.provider,
            model_name: span.model_name,
            prompt: text_attr("gen_ai.prompt"),
            completion: text_attr("gen_ai.completion"),
            prompt_tokens: span.prompt_tokens,
            completion_tokens: span.completion_tokens,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelRegistry;
    use crate::store::span::{AttrMap, RawSpan};
    use crate::store::writer::SpanWriter;
    use serde_json::json;
    use std::sync::Arc;

    async fn create_test_db() -> (RecorderDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query.db");
        let db = RecorderDb::connect(&format!("sqlite:{}", path.display())).await.unwrap();
        (db, dir)
    }

    fn span(trace_id: u128, span_id: u64, start_time: u64) -> RawSpan {
        RawSpan {
            trace_id,
            span_id,
            parent_span_id: None,
            name: "op".into(),
            kind: "INTERNAL".into(),
            start_time,
            end_time: start_time + 1_000,
            status_code: "OK".into(),
            status_message: None,
            attributes: AttrMap::new(),
            events: Vec::new(),
            resource: AttrMap::new(),
        }
    }

    #[tokio::test]
    async fn test_list_traces_earliest_first() {
        let (db, _dir) = create_test_db().await;
        let writer = SpanWriter::new(db.clone(), Arc::new(ModelRegistry::new()));

        writer
            .export(&[span(2, 10, 5_000), span(1, 20, 1_000), span(1, 21, 2_000)])
            .await
            .unwrap();

        let traces = db.list_traces().await.unwrap();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].trace_id, "00000000000000000000000000000001");
        assert_eq!(traces[0].span_count, 2);
        assert_eq!(traces[1].trace_id, "00000000000000000000000000000002");
    }

    #[tokio::test]
    async fn test_replay_context_round_trip() {
        let (db, _dir) = create_test_db().await;
        let writer = SpanWriter::new(db.clone(), Arc::new(ModelRegistry::new()));

        let mut llm = span(1, 1, 1_000);
        llm.attributes.insert("gen_ai.system".into(), json!("openai"));
        llm.attributes.insert("gen_ai.request.model".into(), json!("gpt-4"));
        llm.attributes.insert("gen_ai.prompt".into(), json!("What is Rust?"));
        llm.attributes.insert("gen_ai.completion".into(), json!("A systems language."));
        llm.attributes.insert("gen_ai.usage.prompt_tokens".into(), json!(12));
        llm.attributes.insert("gen_ai.usage.completion_tokens".into(), json!(8));
        writer.export(&[llm]).await.unwrap();

        let replay = db.replay_context("0000000000000001").await.unwrap().unwrap();
        assert_eq!(replay.provider.as_deref(), Some("openai"));
        assert_eq!(replay.model_name.as_deref(), Some("gpt-4"));
        assert_eq!(replay.prompt, "What is Rust?");
        assert_eq!(replay.completion, "A systems language.");
        assert_eq!(replay.prompt_tokens, Some(12));
    }

    #[tokio::test]
    async fn test_replay_context_missing_span() {
        let (db, _dir) = create_test_db().await;
        assert!(db.replay_context("ffffffffffffffff").await.unwrap().is_none());
    }
}
