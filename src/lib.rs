//! Flight recorder for LLM applications
//!
//! A persistent telemetry store: span batches from a tracing instrumentation
//! layer come in, get enriched with provider/model/cost metadata, and land in
//! an embedded SQLite file alongside a dimension-partitioned vector index
//! used for retrieval debugging and replay workflows.

pub mod config;
pub mod detector;
pub mod error;
pub mod registry;
pub mod store;

pub use config::{load_config, Config, DatabaseConfig};
pub use detector::{ProviderDetector, UsageInfo};
pub use error::{RecorderError, Result};
pub use registry::{ModelPricing, ModelRegistry};
pub use store::{
    RawSpan, RecorderDb, RetrievedDoc, SimilarVector, SpanLink, SpanWriter, VectorStore,
    VectorType,
};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// Note: This function can only be called once per process. Embedding
/// applications that configure their own subscriber should skip it.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
