//! Span batch writer
//!
//! Consumes raw span batches from the instrumentation layer, enriches each
//! record (provider, model family, token usage, cost, performance and
//! streaming figures), and upserts them into the `spans` table. A batch
//! commits as one transaction: any row-level failure rolls the whole batch
//! back, so the spans table is never left partially updated.
//!
//! Upserts replace whole rows. Exporting the same `span_id` twice (a start
//! event followed by a completion event) leaves only the latest version,
//! never a field-level merge.

use std::sync::Arc;

use crate::detector::{
    attr_bool, attr_f64, attr_i64, attr_str, ProviderDetector, ATTR_REQUEST_MODEL,
    ATTR_RESPONSE_MODEL,
};
use crate::error::Result;
use crate::registry::ModelRegistry;
use crate::store::database::RecorderDb;
use crate::store::span::{format_span_id, format_trace_id, RawSpan};

const UPSERT_SQL: &str = "INSERT OR REPLACE INTO spans
    (span_id, trace_id, parent_span_id, name, kind, start_time, end_time,
     status_code, status_message, attributes, events, resource,
     provider, model_name, model_family,
     prompt_tokens, completion_tokens, total_tokens, reasoning_tokens, estimated_cost_usd,
     ttft_ms, tokens_per_second, generation_time_ms,
     temperature, top_p, top_k, max_tokens, context_window_size,
     cpu_percent, memory_mb, gpu_utilization, gpu_memory_used_mb,
     streaming_enabled, streaming_chunk_count, streaming_ttft_ms,
     streaming_total_time_ms, streaming_avg_inter_chunk_ms, streaming_per_token_ms)
    VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)";

/// Writes enriched span batches into the store
#[derive(Clone)]
pub struct SpanWriter {
    db: RecorderDb,
    enricher: SpanEnricher,
}

impl SpanWriter {
    pub fn new(db: RecorderDb, registry: Arc<ModelRegistry>) -> Self {
        Self { db, enricher: SpanEnricher::new(registry) }
    }

    /// Enrich and upsert a batch of raw spans as one atomic unit.
    ///
    /// Returns the number of rows written. An empty batch is a no-op.
    pub async fn export(&self, batch: &[RawSpan]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let rows: Vec<EnrichedSpan> =
            batch.iter().map(|span| self.enricher.enrich(span)).collect::<Result<_>>()?;

        let mut tx = self.db.pool().begin().await?;

        for row in &rows {
            sqlx::query(UPSERT_SQL)
                .bind(&row.span_id)
                .bind(&row.trace_id)
                .bind(&row.parent_span_id)
                .bind(&row.name)
                .bind(&row.kind)
                .bind(row.start_time)
                .bind(row.end_time)
                .bind(&row.status_code)
                .bind(&row.status_message)
                .bind(&row.attributes)
                .bind(&row.events)
                .bind(&row.resource)
                .bind(&row.provider)
                .bind(&row.model_name)
                .bind(&row.model_family)
                .bind(row.prompt_tokens)
                .bind(row.completion_tokens)
                .bind(row.total_tokens)
                .bind(row.reasoning_tokens)
                .bind(row.estimated_cost_usd)
                .bind(row.ttft_ms)
                .bind(row.tokens_per_second)
                .bind(row.generation_time_ms)
                .bind(row.temperature)
                .bind(row.top_p)
                .bind(row.top_k)
                .bind(row.max_tokens)
                .bind(row.context_window_size)
                .bind(row.cpu_percent)
                .bind(row.memory_mb)
                .bind(row.gpu_utilization)
                .bind(row.gpu_memory_used_mb)
                .bind(row.streaming_enabled)
                .bind(row.streaming_chunk_count)
                .bind(row.streaming_ttft_ms)
                .bind(row.streaming_total_time_ms)
                .bind(row.streaming_avg_inter_chunk_ms)
                .bind(row.streaming_per_token_ms)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(count = rows.len(), "Exported span batch");
        Ok(rows.len())
    }
}

/// Pure enrichment stage: raw span in, storage row out. No database handle,
/// so the derivation is testable in isolation.
#[derive(Clone)]
pub(crate) struct SpanEnricher {
    registry: Arc<ModelRegistry>,
    detector: ProviderDetector,
}

impl SpanEnricher {
    pub(crate) fn new(registry: Arc<ModelRegistry>) -> Self {
        let detector = ProviderDetector::new(registry.clone());
        Self { registry, detector }
    }

    /// Derive the full storage row for one raw span.
    ///
    /// Enrichment lookups never fail: an unresolvable provider or model
    /// simply leaves the corresponding columns NULL.
    pub(crate) fn enrich(&self, span: &RawSpan) -> Result<EnrichedSpan> {
        let attrs = &span.attributes;

        let provider = self.detector.detect_provider(attrs);
        let model_name = attr_str(attrs, ATTR_REQUEST_MODEL)
            .or_else(|| attr_str(attrs, ATTR_RESPONSE_MODEL));
        let model_family =
            model_name.as_deref().map(|m| self.registry.model_family(m).to_string());
        let context_window_size = model_name
            .as_deref()
            .and_then(|m| self.registry.token_limit(m))
            .map(i64::from);
        let usage = self.detector.extract_cost_info(attrs, &provider);

        Ok(EnrichedSpan {
            span_id: format_span_id(span.span_id),
            trace_id: format_trace_id(span.trace_id),
            parent_span_id: span.parent_span_id.map(format_span_id),
            name: span.name.clone(),
            kind: span.kind.clone(),
            start_time: span.start_time as i64,
            end_time: span.end_time as i64,
            status_code: span.status_code.clone(),
            status_message: span.status_message.clone(),
            attributes: serde_json::to_string(&span.attributes)?,
            events: serde_json::to_string(&span.events)?,
            resource: serde_json::to_string(&span.resource)?,
            provider: (provider != "unknown").then_some(provider),
            model_name,
            model_family,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            reasoning_tokens: usage.reasoning_tokens,
            estimated_cost_usd: usage.estimated_cost_usd,
            ttft_ms: attr_f64(attrs, "llm.ttft_ms"),
            tokens_per_second: attr_f64(attrs, "llm.tokens_per_second"),
            generation_time_ms: attr_f64(attrs, "llm.generation_time_ms"),
            temperature: attr_f64(attrs, "gen_ai.request.temperature"),
            top_p: attr_f64(attrs, "gen_ai.request.top_p"),
            top_k: attr_i64(attrs, "gen_ai.request.top_k"),
            max_tokens: attr_i64(attrs, "gen_ai.request.max_tokens"),
            context_window_size,
            cpu_percent: attr_f64(attrs, "system.cpu_percent"),
            memory_mb: attr_f64(attrs, "system.memory_mb"),
            gpu_utilization: attr_f64(attrs, "system.gpu_utilization"),
            gpu_memory_used_mb: attr_f64(attrs, "system.gpu_memory_used_mb"),
            streaming_enabled: attr_bool(attrs, "llm.streaming.enabled"),
            streaming_chunk_count: attr_i64(attrs, "llm.streaming.chunk_count"),
            streaming_ttft_ms: attr_f64(attrs, "llm.streaming.ttft_ms"),
            streaming_total_time_ms: attr_f64(attrs, "llm.streaming.total_time_ms"),
            streaming_avg_inter_chunk_ms: attr_f64(attrs, "llm.streaming.avg_inter_chunk_ms"),
            streaming_per_token_ms: attr_f64(attrs, "llm.streaming.per_token_ms"),
        })
    }
}

/// One fully derived storage row, column for column
pub(crate) struct EnrichedSpan {
    pub(crate) span_id: String,
    pub(crate) trace_id: String,
    pub(crate) parent_span_id: Option<String>,
    pub(crate) name: String,
    pub(crate) kind: String,
    pub(crate) start_time: i64,
    pub(crate) end_time: i64,
    pub(crate) status_code: String,
    pub(crate) status_message: Option<String>,
    pub(crate) attributes: String,
    pub(crate) events: String,
    pub(crate) resource: String,
    pub(crate) provider: Option<String>,
    pub(crate) model_name: Option<String>,
    pub(crate) model_family: Option<String>,
    pub(crate) prompt_tokens: Option<i64>,
    pub(crate) completion_tokens: Option<i64>,
    pub(crate) total_tokens: Option<i64>,
    pub(crate) reasoning_tokens: Option<i64>,
    pub(crate) estimated_cost_usd: Option<f64>,
    pub(crate) ttft_ms: Option<f64>,
    pub(crate) tokens_per_second: Option<f64>,
    pub(crate) generation_time_ms: Option<f64>,
    pub(crate) temperature: Option<f64>,
    pub(crate) top_p: Option<f64>,
    pub(crate) top_k: Option<i64>,
    pub(crate) max_tokens: Option<i64>,
    pub(crate) context_window_size: Option<i64>,
    pub(crate) cpu_percent: Option<f64>,
    pub(crate) memory_mb: Option<f64>,
    pub(crate) gpu_utilization: Option<f64>,
    pub(crate) gpu_memory_used_mb: Option<f64>,
    pub(crate) streaming_enabled: Option<bool>,
    pub(crate) streaming_chunk_count: Option<i64>,
    pub(crate) streaming_ttft_ms: Option<f64>,
    pub(crate) streaming_total_time_ms: Option<f64>,
    pub(crate) streaming_avg_inter_chunk_ms: Option<f64>,
    pub(crate) streaming_per_token_ms: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::span::AttrMap;
    use serde_json::json;

    fn enricher() -> SpanEnricher {
        SpanEnricher::new(Arc::new(ModelRegistry::new()))
    }

    fn llm_span() -> RawSpan {
        let mut attributes = AttrMap::new();
        attributes.insert("gen_ai.system".into(), json!("openai"));
        attributes.insert("gen_ai.request.model".into(), json!("gpt-4"));
        attributes.insert("gen_ai.usage.prompt_tokens".into(), json!(1000));
        attributes.insert("gen_ai.usage.completion_tokens".into(), json!(500));
        attributes.insert("llm.ttft_ms".into(), json!(120.5));
        attributes.insert("llm.streaming.enabled".into(), json!(true));
        attributes.insert("llm.streaming.chunk_count".into(), json!(42));

        RawSpan {
            trace_id: 1,
            span_id: 1,
            parent_span_id: None,
            name: "llm_call".into(),
            kind: "CLIENT".into(),
            start_time: 1_000,
            end_time: 2_000,
            status_code: "OK".into(),
            status_message: None,
            attributes,
            events: Vec::new(),
            resource: AttrMap::new(),
        }
    }

    #[test]
    fn test_enrich_formats_fixed_width_ids() {
        let row = enricher().enrich(&llm_span()).unwrap();
        assert_eq!(row.trace_id, "00000000000000000000000000000001");
        assert_eq!(row.span_id, "0000000000000001");
        assert!(row.parent_span_id.is_none());
    }

    #[test]
    fn test_enrich_computes_cost_and_family() {
        let row = enricher().enrich(&llm_span()).unwrap();
        assert_eq!(row.provider.as_deref(), Some("openai"));
        assert_eq!(row.model_name.as_deref(), Some("gpt-4"));
        assert_eq!(row.model_family.as_deref(), Some("GPT"));
        assert_eq!(row.estimated_cost_usd, Some(0.06));
        assert_eq!(row.context_window_size, Some(8192));
    }

    #[test]
    fn test_enrich_prefers_request_model_over_response_model() {
        let mut span = llm_span();
        span.attributes.insert("gen_ai.response.model".into(), json!("gpt-4-0613"));
        let row = enricher().enrich(&span).unwrap();
        assert_eq!(row.model_name.as_deref(), Some("gpt-4"));

        span.attributes.remove("gen_ai.request.model");
        let row = enricher().enrich(&span).unwrap();
        assert_eq!(row.model_name.as_deref(), Some("gpt-4-0613"));
    }

    #[test]
    fn test_enrich_reads_performance_and_streaming_keys() {
        let row = enricher().enrich(&llm_span()).unwrap();
        assert_eq!(row.ttft_ms, Some(120.5));
        assert_eq!(row.streaming_enabled, Some(true));
        assert_eq!(row.streaming_chunk_count, Some(42));
        // Absent keys degrade to NULL, never an error
        assert!(row.temperature.is_none());
        assert!(row.cpu_percent.is_none());
    }

    #[test]
    fn test_enrich_encodes_empty_maps_as_empty_objects() {
        let mut span = llm_span();
        span.attributes.clear();
        let row = enricher().enrich(&span).unwrap();
        assert_eq!(row.attributes, "{}");
        assert_eq!(row.events, "[]");
        assert_eq!(row.resource, "{}");
        assert!(row.provider.is_none());
        assert!(row.model_family.is_none());
    }
}
