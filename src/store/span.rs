//! Span export records and identifier encoding
//!
//! The instrumentation layer hands the store raw span batches with integer
//! OTel-style identifiers (128-bit trace id, 64-bit span ids). The store
//! persists them as fixed-width lowercase hex strings for readability.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// String-keyed scalar attribute map, as produced by the instrumentation layer
pub type AttrMap = serde_json::Map<String, serde_json::Value>;

/// One timed event recorded on a span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    /// Nanoseconds since the Unix epoch
    pub timestamp: u64,
    #[serde(default)]
    pub attributes: AttrMap,
}

/// A raw span record as handed in by the instrumentation layer.
///
/// This is the input shape; the writer enriches it (provider, model, cost,
/// performance figures) before persisting. Re-exporting the same `span_id`
/// fully replaces the stored row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSpan {
    pub trace_id: u128,
    pub span_id: u64,
    pub parent_span_id: Option<u64>,
    pub name: String,
    pub kind: String,
    /// Nanoseconds since the Unix epoch
    pub start_time: u64,
    pub end_time: u64,
    pub status_code: String,
    pub status_message: Option<String>,
    #[serde(default)]
    pub attributes: AttrMap,
    #[serde(default)]
    pub events: Vec<SpanEvent>,
    #[serde(default)]
    pub resource: AttrMap,
}

/// Link from a vector record to the span that produced it.
///
/// The store never tracks "the current span" itself; callers pass the link
/// explicitly, or `None` to store sentinel values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanLink {
    pub trace_id: String,
    pub span_id: String,
}

impl SpanLink {
    pub fn from_ids(trace_id: u128, span_id: u64) -> Self {
        Self {
            trace_id: format_trace_id(trace_id),
            span_id: format_span_id(span_id),
        }
    }
}

/// Encode a 128-bit trace id as 32 lowercase hex chars, zero-padded
pub fn format_trace_id(trace_id: u128) -> String {
    format!("{trace_id:032x}")
}

/// Encode a 64-bit span id as 16 lowercase hex chars, zero-padded
pub fn format_span_id(span_id: u64) -> String {
    format!("{span_id:016x}")
}

/// A fully enriched span row as read back from the `spans` table
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoredSpan {
    pub span_id: String,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub status_code: Option<String>,
    pub status_message: Option<String>,
    /// JSON text of the attribute map
    pub attributes: Option<String>,
    /// JSON text of the ordered event list
    pub events: Option<String>,
    /// JSON text of the resource attribute map
    pub resource: Option<String>,

    // Provider/model enrichment
    pub provider: Option<String>,
    pub model_name: Option<String>,
    pub model_family: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub reasoning_tokens: Option<i64>,
    pub estimated_cost_usd: Option<f64>,

    // Performance
    pub ttft_ms: Option<f64>,
    pub tokens_per_second: Option<f64>,
    pub generation_time_ms: Option<f64>,

    // Request configuration
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<i64>,
    pub max_tokens: Option<i64>,
    pub context_window_size: Option<i64>,

    // Resource usage
    pub cpu_percent: Option<f64>,
    pub memory_mb: Option<f64>,
    pub gpu_utilization: Option<f64>,
    pub gpu_memory_used_mb: Option<f64>,

    // Streaming
    pub streaming_enabled: Option<bool>,
    pub streaming_chunk_count: Option<i64>,
    pub streaming_ttft_ms: Option<f64>,
    pub streaming_total_time_ms: Option<f64>,
    pub streaming_avg_inter_chunk_ms: Option<f64>,
    pub streaming_per_token_ms: Option<f64>,
}

impl StoredSpan {
    /// Parse the stored attribute JSON back into a map
    pub fn attribute_map(&self) -> AttrMap {
        self.attributes
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }
}
