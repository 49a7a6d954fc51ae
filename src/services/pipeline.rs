//! Ingestion and retrieval orchestration.
//!
//! Each document moves `Fetched -> Chunked -> Embedded -> Indexed`. A failure
//! at any stage leaves the document `Failed(stage)` and nothing is written to
//! the index for it, because the index only ever sees complete chunk sets.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, EmbeddingError, ErrorClass, IngestFailure, SearchError, VectorStoreError};
use crate::models::{
    Chunk, ChunkFilter, Config, Document, DocumentState, EmbeddingConfig, IngestResult,
    IngestStage, PipelineConfig, RetrievedChunk,
};
use crate::services::chunker::TextChunker;
use crate::services::embedding::{Embedder, EmbeddingClient, validate_embeddings};
use crate::services::vector_store::{VectorIndex, create_backend};
use crate::utils::{RetryConfig, RetryResult, with_retry, with_timeout};

/// Chunk, embed and index documents; embed queries and rank stored chunks.
#[derive(Clone)]
pub struct RetrievalPipeline {
    chunker: TextChunker,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    retry: RetryConfig,
    call_timeout: Duration,
    concurrency: usize,
    batch_size: usize,
}

impl RetrievalPipeline {
    pub fn new(
        chunker: TextChunker,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
            retry: config.retry_config(),
            call_timeout: config.call_timeout(),
            concurrency: config.concurrency.max(1) as usize,
            batch_size: EmbeddingConfig::default().batch_size as usize,
        }
    }

    /// Wire the HTTP embedder and the configured index backend.
    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        let chunker = TextChunker::new(&config.chunking)?;
        let embedder = Arc::new(EmbeddingClient::new(&config.embedding)?);
        let index = create_backend(&config.vector_store, embedder.dimension()).await?;
        Ok(Self::new(chunker, embedder, index, &config.pipeline)
            .with_batch_size(config.embedding.batch_size as usize))
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Texts sent per embedding call. Each call gets its own deadline and retries.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Run one document through every stage.
    pub async fn ingest(&self, document: &Document) -> IngestResult {
        match self.run(document).await {
            Ok(chunk_count) => {
                info!(document_id = %document.id, chunk_count, "document indexed");
                IngestResult::indexed(&document.id, chunk_count)
            }
            Err(failure) => {
                warn!(
                    document_id = %failure.document_id,
                    stage = %failure.stage,
                    class = %failure.class,
                    cause = %failure.cause,
                    "document ingestion failed"
                );
                IngestResult::failed(&failure)
            }
        }
    }

    /// Ingest many documents, at most `concurrency` at a time.
    ///
    /// Results come back in input order; one document's failure never
    /// affects another.
    pub async fn ingest_all(&self, documents: Vec<Document>) -> Vec<IngestResult> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(documents.len());

        for document in documents {
            let pipeline = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let document_id = document.id.clone();
            let handle = tokio::spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                pipeline.ingest(&document).await
            });
            handles.push((document_id, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (document_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(document_id = %document_id, error = %e, "ingest task aborted");
                    let failure = IngestFailure::new(
                        document_id,
                        IngestStage::Chunked,
                        ErrorClass::Fatal,
                        format!("ingest task aborted: {e}"),
                    );
                    IngestResult::failed(&failure)
                }
            };
            results.push(result);
        }

        results
    }

    async fn run(&self, document: &Document) -> Result<usize, IngestFailure> {
        let mut state = DocumentState::Fetched;
        let mut chunks = Vec::new();

        while let Some(stage) = state.next_stage() {
            match stage {
                IngestStage::Chunked => chunks = self.chunker.chunk(document, Utc::now()),
                IngestStage::Embedded => {
                    chunks = self
                        .embed_chunks(&document.id, std::mem::take(&mut chunks))
                        .await?;
                }
                IngestStage::Indexed => self.index_chunks(&document.id, &chunks).await?,
            }

            let next = DocumentState::from(stage);
            debug!(document_id = %document.id, from = %state, to = %next, "document state transition");
            state = next;
        }

        Ok(chunks.len())
    }

    /// Attach a vector to every chunk, or fail the whole set.
    async fn embed_chunks(
        &self,
        document_id: &str,
        chunks: Vec<Chunk>,
    ) -> Result<Vec<Chunk>, IngestFailure> {
        if chunks.is_empty() {
            return Ok(chunks);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let fail = |e: EmbeddingError| {
            IngestFailure::new(document_id, IngestStage::Embedded, e.class(), e)
        };

        let embeddings = self.embed_texts(&texts).await.map_err(fail)?;
        validate_embeddings(texts.len(), self.embedder.dimension(), &embeddings).map_err(fail)?;

        Ok(chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| chunk.with_embedding(embedding))
            .collect())
    }

    /// Embed `texts` in `batch_size` slices, one deadline and retry budget per slice.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let outcome = with_retry(&self.retry, || {
                with_timeout(
                    self.call_timeout,
                    self.embedder.embed_batch(batch),
                    || EmbeddingError::Timeout,
                )
            })
            .await;

            if outcome.attempts() > 1 {
                debug!(attempts = outcome.attempts(), "embedding batch finished after retries");
            }
            let vectors = outcome.into_result()?;
            validate_embeddings(batch.len(), self.embedder.dimension(), &vectors)?;
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    async fn index_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<(), IngestFailure> {
        let timeout_ms = self.call_timeout.as_millis() as u64;
        let outcome = with_retry(&self.retry, || {
            with_timeout(
                self.call_timeout,
                self.index.upsert(document_id, chunks.to_vec()),
                || VectorStoreError::Timeout(timeout_ms),
            )
        })
        .await;

        match outcome {
            RetryResult::Success { .. } => Ok(()),
            RetryResult::Failed { last_error, attempts } => {
                debug!(document_id, attempts, "index stage gave up");
                Err(IngestFailure::new(
                    document_id,
                    IngestStage::Indexed,
                    last_error.class(),
                    last_error,
                ))
            }
        }
    }

    /// Embed `query_text` once and return the top `k` chunks.
    pub async fn retrieve(
        &self,
        query_text: &str,
        k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        let query_text = query_text.trim();
        if query_text.is_empty() {
            return Err(SearchError::InvalidQuery("query text cannot be empty".to_string()));
        }
        if k == 0 {
            return Err(SearchError::InvalidQuery("k must be at least 1".to_string()));
        }

        let query = [query_text.to_string()];
        let mut embeddings = self.embed_texts(&query).await?;
        validate_embeddings(1, self.embedder.dimension(), &embeddings)?;
        let query_vector = embeddings.swap_remove(0);

        let timeout_ms = self.call_timeout.as_millis() as u64;
        let results = with_timeout(
            self.call_timeout,
            self.index.query(&query_vector, k, filter),
            || VectorStoreError::Timeout(timeout_ms),
        )
        .await?;

        debug!(k, hits = results.len(), "retrieved chunks");
        Ok(results.into_iter().map(RetrievedChunk::from).collect())
    }
}
