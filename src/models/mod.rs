mod config;
mod document;
mod ingest;
mod search;

pub use config::{
    ChunkingConfig, Config, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_MAX_TOKENS, DEFAULT_TABLE, DEFAULT_TOP_K, ENV_DATABASE_URL, ENV_EMBEDDING_URL,
    EmbeddingConfig, PipelineConfig,
    SearchConfig, VectorDriver, VectorStoreConfig,
};
pub use document::{ArticleMetadata, Chunk, ChunkKind, Document};
pub use ingest::{DocumentState, IngestResult, IngestStage};
pub use search::{ChunkFilter, OutputFormat, QueryResult, RetrievedChunk, SearchResults};
