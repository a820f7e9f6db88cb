use thiserror::Error;

/// Errors surfaced by the telemetry store.
///
/// Enrichment never produces errors (unresolved lookups degrade to NULL or
/// `"unknown"`); everything here comes from the backing store or from
/// serializing span payloads. The store does not retry; callers own retry
/// policy for transient lock contention.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The backing SQLite store rejected an operation
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Span attribute/event payload could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RecorderError>;
