use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{VectorIndex, rank, validate_chunks, validate_query};
use crate::error::VectorStoreError;
use crate::models::{Chunk, ChunkFilter, QueryResult};

#[derive(Debug, Default)]
struct IndexState {
    dimension: Option<usize>,
    documents: HashMap<String, Arc<Vec<Chunk>>>,
}

/// Process-local index with exact (brute-force) cosine ranking.
///
/// A document's chunk set is swapped as one `Arc` under the write lock, so
/// readers see either the old set or the new one.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    state: RwLock<IndexState>,
}

impl MemoryIndex {
    /// An index whose dimensionality is fixed by its first upsert.
    pub fn new() -> Self {
        Self::default()
    }

    /// An index that only accepts vectors of `dimension`.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            state: RwLock::new(IndexState {
                dimension: Some(dimension),
                documents: HashMap::new(),
            }),
        }
    }

    /// Chunks currently stored for `document_id`, in index order.
    pub async fn chunks_for(&self, document_id: &str) -> Vec<Chunk> {
        let state = self.state.read().await;
        state
            .documents
            .get(document_id)
            .map(|chunks| chunks.as_ref().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        Ok(true)
    }

    async fn dimension(&self) -> Option<usize> {
        self.state.read().await.dimension
    }

    async fn upsert(
        &self,
        document_id: &str,
        mut chunks: Vec<Chunk>,
    ) -> Result<(), VectorStoreError> {
        let mut state = self.state.write().await;

        let dimension = validate_chunks(document_id, &chunks, state.dimension)?;
        state.dimension = dimension;

        chunks.sort_by_key(|c| c.chunk_index);
        let count = chunks.len();
        if chunks.is_empty() {
            state.documents.remove(document_id);
        } else {
            state
                .documents
                .insert(document_id.to_string(), Arc::new(chunks));
        }

        debug!(document_id, chunks = count, "replaced document chunks");
        Ok(())
    }

    async fn query(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<QueryResult>, VectorStoreError> {
        let state = self.state.read().await;
        validate_query(query_vector, k, state.dimension)?;

        let candidates = match &filter.document_id {
            Some(id) => state
                .documents
                .get(id)
                .map(|chunks| chunks.iter().collect::<Vec<_>>())
                .unwrap_or_default(),
            None => state.documents.values().flat_map(|c| c.iter()).collect(),
        };

        rank(
            candidates.into_iter().filter(|c| filter.matches(c)),
            query_vector,
            k,
        )
    }

    async fn delete(&self, document_id: &str) -> Result<(), VectorStoreError> {
        self.state.write().await.documents.remove(document_id);
        Ok(())
    }

    async fn count(&self) -> Result<u64, VectorStoreError> {
        let state = self.state.read().await;
        Ok(state.documents.values().map(|c| c.len() as u64).sum())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
