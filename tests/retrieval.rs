use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use article_rag::error::{EmbeddingError, ErrorClass, SearchError, VectorStoreError};
use article_rag::models::{
    Chunk, ChunkFilter, ChunkKind, Document, DocumentState, IngestStage, PipelineConfig,
    QueryResult,
};
use article_rag::services::{Embedder, MemoryIndex, RetrievalPipeline, TextChunker, VectorIndex};

const KEYWORDS: [&str; 4] = ["rust", "python", "database", "cooking"];

/// One dimension per keyword, plus a small constant so no vector is zero.
fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .map(|kw| lower.matches(kw).count() as f32 + 0.01)
        .collect()
}

#[derive(Default)]
struct ScriptedEmbedder {
    failures: Mutex<VecDeque<EmbeddingError>>,
    fatal_marker: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedEmbedder {
    fn failing_with(errors: Vec<EmbeddingError>) -> Self {
        Self {
            failures: Mutex::new(errors.into()),
            ..Default::default()
        }
    }

    fn fatal_on(marker: &str) -> Self {
        Self {
            fatal_marker: Some(marker.to_string()),
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    fn dimension(&self) -> usize {
        KEYWORDS.len()
    }

    fn model_version(&self) -> &str {
        "keywords-v1"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.failures.lock().unwrap().pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }
        if let Some(marker) = &self.fatal_marker
            && texts.iter().any(|t| t.contains(marker.as_str()))
        {
            return Err(EmbeddingError::InvalidResponse(
                "malformed embedding payload".to_string(),
            ));
        }

        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Memory index that counts upserts and can fail them on demand.
#[derive(Default)]
struct RecordingIndex {
    inner: MemoryIndex,
    upserts: AtomicUsize,
    failures: Mutex<VecDeque<VectorStoreError>>,
}

impl RecordingIndex {
    fn failing_with(errors: Vec<VectorStoreError>) -> Self {
        Self {
            failures: Mutex::new(errors.into()),
            ..Default::default()
        }
    }

    fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        Ok(true)
    }

    async fn dimension(&self) -> Option<usize> {
        self.inner.dimension().await
    }

    async fn upsert(&self, document_id: &str, chunks: Vec<Chunk>) -> Result<(), VectorStoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let scripted = self.failures.lock().unwrap().pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }
        self.inner.upsert(document_id, chunks).await
    }

    async fn query(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<QueryResult>, VectorStoreError> {
        self.inner.query(query_vector, k, filter).await
    }

    async fn delete(&self, document_id: &str) -> Result<(), VectorStoreError> {
        self.inner.delete(document_id).await
    }

    async fn count(&self) -> Result<u64, VectorStoreError> {
        self.inner.count().await
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        concurrency: 2,
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        call_timeout_secs: 5,
    }
}

fn pipeline(
    embedder: Arc<ScriptedEmbedder>,
    index: Arc<RecordingIndex>,
    max_tokens: usize,
) -> RetrievalPipeline {
    RetrievalPipeline::new(
        TextChunker::with_max_tokens(max_tokens).unwrap(),
        embedder,
        index,
        &fast_config(),
    )
}

/// Five paragraphs of 40 bytes each; with a 10 token budget each is its own chunk.
fn five_paragraph_body(marker_in_second: Option<&str>) -> String {
    (0..5)
        .map(|i| {
            let filler = match (i, marker_in_second) {
                (1, Some(marker)) => format!("{marker} rust"),
                _ => format!("rust paragraph {i}"),
            };
            format!("{:<38}\n\n", filler)
        })
        .collect()
}

#[tokio::test]
async fn ingest_then_retrieve() {
    let embedder = Arc::new(ScriptedEmbedder::default());
    let index = Arc::new(RecordingIndex::default());
    let pipeline = pipeline(embedder, index, 512);

    let rust = Document::new("1", "Rust", "Rust ownership explained. Rust is fast.")
        .with_header("Title: Rust");
    let cooking = Document::new("2", "Cooking", "Cooking pasta takes ten minutes.")
        .with_header("Title: Cooking");

    assert!(pipeline.ingest(&rust).await.is_indexed());
    assert!(pipeline.ingest(&cooking).await.is_indexed());

    let results = pipeline
        .retrieve("rust", 2, &ChunkFilter::any())
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.document_id == "1"));
    assert!(results[0].score >= results[1].score);

    let headers = pipeline
        .retrieve("cooking", 5, &ChunkFilter::kind(ChunkKind::Header))
        .await
        .unwrap();
    assert_eq!(headers.len(), 2);
    assert_eq!(headers[0].document_id, "2");
    assert!(headers.iter().all(|r| r.chunk_kind == ChunkKind::Header));
    assert_eq!(headers[0].title, "Cooking");
    assert_eq!(headers[1].title, "Rust");
}

#[tokio::test]
async fn transient_embedding_failures_are_retried() {
    let embedder = Arc::new(ScriptedEmbedder::failing_with(vec![
        EmbeddingError::Timeout,
        EmbeddingError::ServerError {
            status: 503,
            message: "unavailable".to_string(),
        },
    ]));
    let index = Arc::new(RecordingIndex::default());
    let pipeline = pipeline(Arc::clone(&embedder), Arc::clone(&index), 512);

    let result = pipeline
        .ingest(&Document::new("7", "t", "Some rust text."))
        .await;

    assert_eq!(result.status, DocumentState::Indexed);
    assert_eq!(result.chunk_count, 1);
    assert_eq!(embedder.calls(), 3);
    assert_eq!(index.count().await.unwrap(), 1);
}

#[tokio::test]
async fn exhausted_retries_fail_the_document() {
    let embedder = Arc::new(ScriptedEmbedder::failing_with(vec![
        EmbeddingError::Timeout,
        EmbeddingError::Timeout,
        EmbeddingError::Timeout,
    ]));
    let index = Arc::new(RecordingIndex::default());
    let pipeline = pipeline(Arc::clone(&embedder), Arc::clone(&index), 512);

    let result = pipeline
        .ingest(&Document::new("8", "t", "Some rust text."))
        .await;

    assert_eq!(result.status, DocumentState::Failed(IngestStage::Embedded));
    assert!(result.failure_reason.unwrap().contains("'8'"));
    assert_eq!(embedder.calls(), 3);
    assert_eq!(index.upserts(), 0);
}

#[tokio::test]
async fn fatal_embedding_failure_never_reaches_index() {
    let embedder = Arc::new(ScriptedEmbedder::fatal_on("POISON"));
    let index = Arc::new(RecordingIndex::default());
    let pipeline = pipeline(Arc::clone(&embedder), Arc::clone(&index), 10);

    let document = Document::new("9", "t", five_paragraph_body(Some("POISON")));
    assert_eq!(
        TextChunker::with_max_tokens(10).unwrap().chunk(&document, Utc::now()).len(),
        5
    );

    let result = pipeline.ingest(&document).await;

    assert_eq!(result.status, DocumentState::Failed(IngestStage::Embedded));
    assert_eq!(result.chunk_count, 0);
    // Fatal errors are not retried
    assert_eq!(embedder.calls(), 1);
    assert_eq!(index.upserts(), 0);
    assert_eq!(index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn reingest_replaces_previous_chunks() {
    let embedder = Arc::new(ScriptedEmbedder::default());
    let index = Arc::new(RecordingIndex::default());
    let pipeline = pipeline(embedder, Arc::clone(&index), 10);

    let first = Document::new("42", "t", five_paragraph_body(None));
    assert_eq!(pipeline.ingest(&first).await.chunk_count, 5);

    let second = Document::new("42", "t", "database only now");
    assert_eq!(pipeline.ingest(&second).await.chunk_count, 1);

    let results = pipeline
        .retrieve("rust", 10, &ChunkFilter::document("42"))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk_text, "database only now");
}

#[tokio::test]
async fn dimension_mismatch_is_not_retried() {
    let embedder = Arc::new(ScriptedEmbedder::default());
    let index = Arc::new(RecordingIndex::failing_with(vec![
        VectorStoreError::DimensionMismatch {
            expected: 8,
            actual: 4,
        },
    ]));
    let pipeline = pipeline(embedder, Arc::clone(&index), 512);

    let result = pipeline
        .ingest(&Document::new("5", "t", "rust"))
        .await;

    assert_eq!(result.status, DocumentState::Failed(IngestStage::Indexed));
    assert_eq!(index.upserts(), 1);
}

#[tokio::test]
async fn transient_storage_errors_are_retried() {
    let embedder = Arc::new(ScriptedEmbedder::default());
    let index = Arc::new(RecordingIndex::failing_with(vec![
        VectorStoreError::Unavailable("connection reset".to_string()),
    ]));
    let pipeline = pipeline(embedder, Arc::clone(&index), 512);

    let result = pipeline
        .ingest(&Document::new("6", "t", "rust"))
        .await;

    assert!(result.is_indexed());
    assert_eq!(index.upserts(), 2);
}

#[tokio::test]
async fn embedding_timeout_is_transient() {
    let embedder = Arc::new(ScriptedEmbedder::slow(Duration::from_millis(500)));
    let index = Arc::new(RecordingIndex::default());
    let pipeline = pipeline(Arc::clone(&embedder), Arc::clone(&index), 512)
        .with_call_timeout(Duration::from_millis(20));

    let result = pipeline
        .ingest(&Document::new("3", "t", "rust"))
        .await;

    assert_eq!(result.status, DocumentState::Failed(IngestStage::Embedded));
    assert!(result.failure_reason.unwrap().contains("transient"));
    assert_eq!(embedder.calls(), 3);
    assert_eq!(index.upserts(), 0);
}

#[tokio::test]
async fn call_timeout_applies_to_each_embedding_batch() {
    // Each call takes 40ms; eight sequential calls exceed one 150ms deadline
    let embedder = Arc::new(ScriptedEmbedder::slow(Duration::from_millis(40)));
    let index = Arc::new(RecordingIndex::default());
    let pipeline = pipeline(Arc::clone(&embedder), Arc::clone(&index), 10)
        .with_batch_size(1)
        .with_call_timeout(Duration::from_millis(150));

    let body: String = (0..8).map(|i| format!("{:<38}\n\n", format!("rust part {i}"))).collect();
    let result = pipeline.ingest(&Document::new("long", "t", body)).await;

    assert_eq!(result.status, DocumentState::Indexed);
    assert_eq!(result.chunk_count, 8);
    assert_eq!(embedder.calls(), 8);
    assert_eq!(index.count().await.unwrap(), 8);
}

#[tokio::test]
async fn transient_failure_retries_only_its_batch() {
    let embedder = Arc::new(ScriptedEmbedder::failing_with(vec![EmbeddingError::Timeout]));
    let index = Arc::new(RecordingIndex::default());
    let pipeline = pipeline(Arc::clone(&embedder), Arc::clone(&index), 10).with_batch_size(2);

    let result = pipeline
        .ingest(&Document::new("b", "t", five_paragraph_body(None)))
        .await;

    assert!(result.is_indexed());
    // Three batches of at most two texts, the first one attempted twice
    assert_eq!(embedder.calls(), 4);
    let stored = index.inner.chunks_for("b").await;
    let indices: Vec<u32> = stored.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    assert!(stored.iter().all(|c| c.embedding.len() == KEYWORDS.len()));
}

#[tokio::test]
async fn empty_document_indexes_zero_chunks() {
    let embedder = Arc::new(ScriptedEmbedder::default());
    let index = Arc::new(RecordingIndex::default());
    let pipeline = pipeline(Arc::clone(&embedder), Arc::clone(&index), 512);

    let result = pipeline.ingest(&Document::new("0", "t", "")).await;

    assert!(result.is_indexed());
    assert_eq!(result.chunk_count, 0);
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn batch_ingest_isolates_failures_and_bounds_concurrency() {
    let embedder = Arc::new(ScriptedEmbedder {
        fatal_marker: Some("POISON".to_string()),
        delay: Duration::from_millis(20),
        ..Default::default()
    });
    let index = Arc::new(RecordingIndex::default());
    let pipeline = pipeline(Arc::clone(&embedder), Arc::clone(&index), 512);

    let documents: Vec<Document> = (0..6)
        .map(|i| {
            let body = if i == 3 { "POISON rust" } else { "rust text" };
            Document::new(i.to_string(), "t", body)
        })
        .collect();

    let results = pipeline.ingest_all(documents).await;

    let ids: Vec<&str> = results.iter().map(|r| r.document_id.as_str()).collect();
    assert_eq!(ids, vec!["0", "1", "2", "3", "4", "5"]);
    assert_eq!(results.iter().filter(|r| r.is_indexed()).count(), 5);
    assert_eq!(
        results[3].status,
        DocumentState::Failed(IngestStage::Embedded)
    );
    assert!(embedder.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(index.count().await.unwrap(), 5);
}

#[tokio::test]
async fn retrieve_rejects_invalid_requests() {
    let embedder = Arc::new(ScriptedEmbedder::default());
    let index = Arc::new(RecordingIndex::default());
    let pipeline = pipeline(Arc::clone(&embedder), index, 512);

    let err = pipeline
        .retrieve("   ", 3, &ChunkFilter::any())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::InvalidQuery(_)));
    assert_eq!(err.class(), ErrorClass::Validation);

    let err = pipeline
        .retrieve("rust", 0, &ChunkFilter::any())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::InvalidQuery(_)));
    assert_eq!(embedder.calls(), 0);
}

fn indexed_chunk(document_id: &str, index: u32, embedding: Vec<f32>) -> Chunk {
    Chunk::new(
        document_id,
        ChunkKind::Content,
        index,
        format!("chunk {index}"),
        2,
        Utc::now(),
    )
    .with_embedding(embedding)
}

#[tokio::test]
async fn query_ranks_by_cosine_similarity() {
    let index = MemoryIndex::new();
    let q = [1.0, 0.0, 0.0];
    index
        .upsert(
            "d",
            vec![
                indexed_chunk("d", 0, vec![0.0, 1.0, 0.0]),
                indexed_chunk("d", 1, vec![1.0, 0.1, 0.0]),
                indexed_chunk("d", 2, vec![1.0, 1.0, 0.0]),
            ],
        )
        .await
        .unwrap();

    let results = index.query(&q, 3, &ChunkFilter::any()).await.unwrap();
    let order: Vec<u32> = results.iter().map(|r| r.chunk.chunk_index).collect();
    assert_eq!(order, vec![1, 2, 0]);
    assert!(results[0].score > results[1].score && results[1].score > results[2].score);
}

#[tokio::test]
async fn k_larger_than_population_returns_everything() {
    let index = MemoryIndex::new();
    index
        .upsert(
            "d",
            vec![
                indexed_chunk("d", 0, vec![1.0, 0.0]),
                indexed_chunk("d", 1, vec![0.0, 1.0]),
            ],
        )
        .await
        .unwrap();

    let results = index
        .query(&[1.0, 1.0], 5, &ChunkFilter::any())
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn concurrent_reads_never_see_mixed_sets() {
    let index = Arc::new(MemoryIndex::new());
    let old: Vec<Chunk> = (0..4).map(|i| indexed_chunk("d", i, vec![1.0, 0.0])).collect();
    let new: Vec<Chunk> = (0..2).map(|i| indexed_chunk("d", i, vec![0.0, 1.0])).collect();
    index.upsert("d", old.clone()).await.unwrap();

    let writer = {
        let index = Arc::clone(&index);
        tokio::spawn(async move {
            for round in 0..50 {
                let set = if round % 2 == 0 { new.clone() } else { old.clone() };
                index.upsert("d", set).await.unwrap();
            }
        })
    };

    for _ in 0..50 {
        let results = index
            .query(&[1.0, 1.0], 10, &ChunkFilter::document("d"))
            .await
            .unwrap();
        let first = &results[0].chunk.embedding;
        assert!(results.iter().all(|r| &r.chunk.embedding == first));
        assert!(results.len() == 4 || results.len() == 2);
        tokio::task::yield_now().await;
    }

    writer.await.unwrap();
}
