//! Vector index abstraction layer.
//!
//! A trait over index backends (in-memory, PostgreSQL/pgvector) plus the
//! scoring and validation rules every backend shares.

mod memory;
mod pgvector;

pub use memory::MemoryIndex;
pub use pgvector::PgVectorIndex;

use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::VectorStoreError;
use crate::models::{Chunk, ChunkFilter, QueryResult, VectorDriver, VectorStoreConfig};

/// Stores chunk vectors per document and answers top-K cosine queries.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Check if the backing store is reachable.
    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Dimensionality every stored vector must have, once established.
    async fn dimension(&self) -> Option<usize>;

    /// Atomically replace all chunks of `document_id` with `chunks`.
    ///
    /// On error the previously stored set is left untouched.
    async fn upsert(&self, document_id: &str, chunks: Vec<Chunk>) -> Result<(), VectorStoreError>;

    /// Up to `k` chunks ranked by descending cosine similarity, ties broken
    /// by ascending chunk index.
    async fn query(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<QueryResult>, VectorStoreError>;

    /// Remove every chunk of `document_id`.
    async fn delete(&self, document_id: &str) -> Result<(), VectorStoreError>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<u64, VectorStoreError>;

    /// Backend name for display.
    fn name(&self) -> &str;
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity `(a·b)/(‖a‖·‖b‖)`, clamped to [-1, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, VectorStoreError> {
    if a.len() != b.len() {
        return Err(VectorStoreError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let norm = magnitude(a) * magnitude(b);
    if norm == 0.0 {
        return Err(VectorStoreError::ZeroMagnitude);
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    Ok((dot / norm).clamp(-1.0, 1.0))
}

/// Reject `k == 0`, zero-magnitude queries and queries of the wrong width.
pub fn validate_query(
    query_vector: &[f32],
    k: usize,
    dimension: Option<usize>,
) -> Result<(), VectorStoreError> {
    if k == 0 {
        return Err(VectorStoreError::InvalidQuery("k must be at least 1".to_string()));
    }
    if let Some(expected) = dimension
        && query_vector.len() != expected
    {
        return Err(VectorStoreError::DimensionMismatch {
            expected,
            actual: query_vector.len(),
        });
    }
    if magnitude(query_vector) == 0.0 {
        return Err(VectorStoreError::ZeroMagnitude);
    }
    Ok(())
}

/// Validate a replacement set and return the dimensionality it implies.
///
/// Every chunk must belong to `document_id` and carry a non-zero vector of
/// the established width (or of the first chunk's width when none is
/// established yet).
pub fn validate_chunks(
    document_id: &str,
    chunks: &[Chunk],
    established: Option<usize>,
) -> Result<Option<usize>, VectorStoreError> {
    let mut dimension = established;

    for chunk in chunks {
        if chunk.document_id != document_id {
            return Err(VectorStoreError::ForeignChunk {
                expected: document_id.to_string(),
                found: chunk.document_id.clone(),
                chunk_index: chunk.chunk_index,
            });
        }

        let expected = *dimension.get_or_insert(chunk.embedding.len());
        if chunk.embedding.len() != expected || expected == 0 {
            return Err(VectorStoreError::DimensionMismatch {
                expected,
                actual: chunk.embedding.len(),
            });
        }
        if magnitude(&chunk.embedding) == 0.0 {
            return Err(VectorStoreError::ZeroMagnitude);
        }
    }

    Ok(dimension)
}

/// Descending score, then ascending chunk index, then ascending document id.
fn ranking_order(a_score: f32, a: &Chunk, b_score: f32, b: &Chunk) -> Ordering {
    b_score
        .total_cmp(&a_score)
        .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        .then_with(|| a.document_id.cmp(&b.document_id))
}

/// Order results the way [`rank`] does.
pub fn sort_results(results: &mut [QueryResult]) {
    results.sort_by(|a, b| ranking_order(a.score, &a.chunk, b.score, &b.chunk));
}

/// Score `candidates` against `query_vector` and keep the best `k`.
pub fn rank<'a>(
    candidates: impl IntoIterator<Item = &'a Chunk>,
    query_vector: &[f32],
    k: usize,
) -> Result<Vec<QueryResult>, VectorStoreError> {
    let mut scored = Vec::new();
    for chunk in candidates {
        let score = cosine_similarity(query_vector, &chunk.embedding)?;
        scored.push((score, chunk));
    }

    scored.sort_by(|(sa, a), (sb, b)| ranking_order(*sa, a, *sb, b));

    Ok(scored
        .into_iter()
        .take(k)
        .map(|(score, chunk)| QueryResult {
            chunk: chunk.clone(),
            score,
        })
        .collect())
}

/// Create a vector index backend based on configuration.
pub async fn create_backend(
    config: &VectorStoreConfig,
    embedding_dim: usize,
) -> Result<Arc<dyn VectorIndex>, VectorStoreError> {
    match config.driver {
        VectorDriver::Memory => Ok(Arc::new(MemoryIndex::with_dimension(embedding_dim))),
        VectorDriver::PostgreSQL => {
            let backend = PgVectorIndex::connect(config, embedding_dim).await?;
            backend.ensure_schema().await?;
            Ok(Arc::new(backend))
        }
    }
}
