pub mod cli;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::{AppError, ErrorClass, IngestFailure};
pub use models::{Chunk, ChunkFilter, ChunkKind, Config, Document, IngestResult, OutputFormat};
pub use services::{Embedder, MemoryIndex, RetrievalPipeline, TextChunker, VectorIndex};
