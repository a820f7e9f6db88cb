//! Dimension-partitioned vector store
//!
//! Embeddings land in per-dimension tables (`vectors_384`, `vectors_1536`,
//! ...) created lazily on first use and never merged. Each vector row has
//! exactly one `vector_metadata` row linking it to the span that produced it,
//! the raw text, and a JSON metadata blob; the pair is written in one
//! transaction so neither side can exist orphaned.
//!
//! Similarity queries are dimension-scoped: a query vector only ever sees
//! rows stored under its own dimension's table. Embeddings are stored as
//! little-endian f32 blobs and cosine distance is computed in-process.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::Result;
use crate::store::database::RecorderDb;
use crate::store::span::SpanLink;

/// Sentinel stored when an embedding is logged outside any span
const NO_SPAN: &str = "no_span";
const NO_TRACE: &str = "no_trace";

/// What a logged vector represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorType {
    Document,
    Query,
    Retrieved,
    Chunk,
    Test,
}

impl VectorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Query => "query",
            Self::Retrieved => "retrieved",
            Self::Chunk => "chunk",
            Self::Test => "test",
        }
    }
}

/// A document handed to [`VectorStore::log_retrieval`]
#[derive(Debug, Clone)]
pub struct RetrievedDoc {
    pub text: String,
    /// Embedding of the document; documents without one are skipped
    pub vector: Option<Vec<f32>>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// One similarity query hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarVector {
    pub id: i64,
    pub vector_rowid: i64,
    pub table_name: String,
    pub span_id: String,
    pub trace_id: String,
    pub content: String,
    pub metadata: serde_json::Value,
    /// Cosine distance, ascending = more similar
    pub distance: f64,
    /// `1 - distance`
    pub similarity: f64,
}

/// A vector metadata row as stored
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VectorMetadataRow {
    pub id: i64,
    pub vector_rowid: i64,
    pub table_name: String,
    pub span_id: String,
    pub trace_id: String,
    pub content: Option<String>,
    pub metadata: Option<String>,
}

#[derive(FromRow)]
struct JoinedVectorRow {
    id: i64,
    vector_rowid: i64,
    table_name: String,
    span_id: String,
    trace_id: String,
    content: Option<String>,
    metadata: Option<String>,
    embedding: Vec<u8>,
}

/// Logs embeddings and answers nearest-neighbor queries
#[derive(Clone)]
pub struct VectorStore {
    db: RecorderDb,
}

impl VectorStore {
    pub fn new(db: RecorderDb) -> Self {
        Self { db }
    }

    /// Log one embedding with linked metadata.
    ///
    /// The dimension is taken from the vector length; the matching
    /// `vectors_{dim}` table is created on first use. The vector insert and
    /// the metadata insert commit together or not at all.
    ///
    /// Returns the rowid of the stored vector.
    pub async fn log_embedding(
        &self,
        text: &str,
        vector: &[f32],
        model_name: &str,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
        vector_type: VectorType,
        link: Option<&SpanLink>,
    ) -> Result<i64> {
        let dimension = vector.len();
        let table_name = vector_table_name(dimension);
        self.ensure_vector_table(dimension).await?;

        let (span_id, trace_id) = match link {
            Some(link) => (link.span_id.as_str(), link.trace_id.as_str()),
            None => (NO_SPAN, NO_TRACE),
        };

        let mut meta = metadata.unwrap_or_default();
        meta.insert("model".into(), model_name.into());
        meta.insert("dimension".into(), (dimension as u64).into());
        meta.insert("type".into(), vector_type.as_str().into());
        let metadata_json = serde_json::to_string(&meta)?;

        let mut tx = self.db.pool().begin().await?;

        let result = sqlx::query(&format!("INSERT INTO {table_name} (embedding) VALUES (?)"))
            .bind(serialize_embedding(vector))
            .execute(&mut *tx)
            .await?;
        let row_id = result.last_insert_rowid();

        sqlx::query(
            "INSERT INTO vector_metadata
             (vector_rowid, table_name, span_id, trace_id, content, metadata)
             VALUES (?,?,?,?,?,?)",
        )
        .bind(row_id)
        .bind(&table_name)
        .bind(span_id)
        .bind(trace_id)
        .bind(text)
        .bind(&metadata_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(table = %table_name, row_id, vector_type = vector_type.as_str(), "Logged embedding");
        Ok(row_id)
    }

    /// Nearest neighbors of `query_vector` within its own dimension.
    ///
    /// A dimension that was never logged has no table; that is an empty
    /// result, not an error. There is no cross-dimension search.
    pub async fn get_similar_vectors(
        &self,
        query_vector: &[f32],
        limit: usize,
        exclude_span_id: Option<&str>,
    ) -> Result<Vec<SimilarVector>> {
        let table_name = vector_table_name(query_vector.len());
        if !self.table_exists(&table_name).await? {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT vm.id, vm.vector_rowid, vm.table_name, vm.span_id, vm.trace_id,
                    vm.content, vm.metadata, v.embedding
             FROM {table_name} v
             JOIN vector_metadata vm ON v.rowid = vm.vector_rowid AND vm.table_name = ?"
        );
        if exclude_span_id.is_some() {
            sql.push_str(" WHERE vm.span_id != ?");
        }

        let mut query = sqlx::query_as::<_, JoinedVectorRow>(&sql).bind(&table_name);
        if let Some(span_id) = exclude_span_id {
            query = query.bind(span_id);
        }
        let rows = query.fetch_all(self.db.pool()).await?;

        let mut results: Vec<SimilarVector> = rows
            .into_iter()
            .map(|row| {
                let stored = deserialize_embedding(&row.embedding);
                let distance = cosine_distance(query_vector, &stored);
                SimilarVector {
                    id: row.id,
                    vector_rowid: row.vector_rowid,
                    table_name: row.table_name,
                    span_id: row.span_id,
                    trace_id: row.trace_id,
                    content: row.content.unwrap_or_default(),
                    metadata: row
                        .metadata
                        .as_deref()
                        .and_then(|m| serde_json::from_str(m).ok())
                        .unwrap_or_default(),
                    distance,
                    similarity: 1.0 - distance,
                }
            })
            .collect();

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(limit);
        Ok(results)
    }

    /// Log a full retrieval operation: the query vector plus every retrieved
    /// document that carries an embedding, annotated with its rank and score.
    pub async fn log_retrieval(
        &self,
        query: &str,
        query_vector: &[f32],
        retrieved_docs: &[RetrievedDoc],
        scores: &[f64],
        model_name: &str,
        link: Option<&SpanLink>,
    ) -> Result<()> {
        let mut query_meta = serde_json::Map::new();
        query_meta.insert("retrieved_count".into(), (retrieved_docs.len() as u64).into());

        self.log_embedding(query, query_vector, model_name, Some(query_meta), VectorType::Query, link)
            .await?;

        for (i, (doc, score)) in retrieved_docs.iter().zip(scores).enumerate() {
            let Some(vector) = &doc.vector else { continue };

            let mut meta = doc.metadata.clone();
            meta.insert("retrieval_score".into(), (*score).into());
            meta.insert("retrieval_rank".into(), (i as u64 + 1).into());

            self.log_embedding(&doc.text, vector, model_name, Some(meta), VectorType::Retrieved, link)
                .await?;
        }

        Ok(())
    }

    /// Create the per-dimension table if absent. `CREATE TABLE IF NOT
    /// EXISTS` makes concurrent first-use race-free.
    async fn ensure_vector_table(&self, dimension: usize) -> Result<()> {
        let table_name = vector_table_name(dimension);
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table_name} (embedding BLOB NOT NULL)"
        ))
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let found: Option<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table_name)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(found.is_some())
    }
}

/// Table name for a dimension, e.g. `1536 -> "vectors_1536"`
pub fn vector_table_name(dimension: usize) -> String {
    format!("vectors_{dimension}")
}

/// Encode a vector as consecutive little-endian f32s (4 bytes each)
pub fn serialize_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a little-endian f32 blob back into a vector
pub fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine distance in `[0, 2]`; zero-norm vectors are treated as maximally
/// distant from everything at distance 1.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_table_name() {
        assert_eq!(vector_table_name(384), "vectors_384");
        assert_eq!(vector_table_name(1536), "vectors_1536");
    }

    #[test]
    fn test_embedding_round_trip() {
        let vector = vec![1.0f32, -0.5, 0.25, 3.75];
        let bytes = serialize_embedding(&vector);
        assert_eq!(bytes.len(), 16);
        assert_eq!(deserialize_embedding(&bytes), vector);
    }

    #[test]
    fn test_cosine_distance_identical_is_zero() {
        let v = vec![0.3f32, 0.7, -0.2];
        assert!(cosine_distance(&v, &v).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_distance_orthogonal_is_one() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_distance_opposite_is_two() {
        let a = vec![1.0f32, 0.0];
        let b = vec![-1.0f32, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_distance_zero_norm() {
        let a = vec![0.0f32, 0.0];
        let b = vec![1.0f32, 0.0];
        assert_eq!(cosine_distance(&a, &b), 1.0);
    }

    #[test]
    fn test_vector_type_serialized_lowercase() {
        assert_eq!(VectorType::Retrieved.as_str(), "retrieved");
        assert_eq!(serde_json::to_string(&VectorType::Query).unwrap(), "\"query\"");
    }
}
