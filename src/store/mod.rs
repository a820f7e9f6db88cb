//! Persistent telemetry store
//!
//! A synchronous, call-and-return storage surface over one embedded SQLite
//! file:
//! - **Spans**: enriched span records upserted in atomic batches
//! - **Vectors**: dimension-partitioned embedding tables with linked metadata
//! - **Queries**: trace listing, vector lookup, and replay context
//!
//! The store never creates spans, never calls a provider, and runs no
//! background tasks; batching and delivery belong to the instrumentation
//! layer, and callers own retry policy on lock contention.

pub mod database;
pub mod migrate;
pub mod query;
pub mod span;
pub mod vector;
pub mod writer;

pub use database::{RecorderDb, StoreStats};
pub use migrate::{apply_all, Migration, MigrationReport, MIGRATIONS};
pub use query::{ReplayContext, TraceSummary};
pub use span::{format_span_id, format_trace_id, AttrMap, RawSpan, SpanEvent, SpanLink, StoredSpan};
pub use vector::{
    vector_table_name, RetrievedDoc, SimilarVector, VectorMetadataRow, VectorStore, VectorType,
};
pub use writer::SpanWriter;

/// Current version of the telemetry schema
pub const SCHEMA_VERSION: &str = "1.2.0";
