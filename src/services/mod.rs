mod chunker;
mod context;
mod embedding;
mod pipeline;
mod vector_store;

pub use chunker::{CHARS_PER_TOKEN, Segment, TextChunker, estimate_tokens};
pub use context::{SYSTEM_PROMPT, build_context, build_prompt};
pub use embedding::{Embedder, EmbeddingClient, HealthResponse, normalize, validate_embeddings};
pub use pipeline::RetrievalPipeline;
pub use vector_store::{
    MemoryIndex, PgVectorIndex, VectorIndex, cosine_similarity, create_backend, rank,
    sort_results, validate_chunks, validate_query,
};
