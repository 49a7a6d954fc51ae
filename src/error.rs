//! Error types for the article retrieval core.

use std::fmt;

use thiserror::Error;

use crate::models::IngestStage;
use crate::utils::retry::Retryable;

/// How an error should be treated by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input or configuration caught synchronously. Never retried.
    Validation,
    /// Timeout, rate limit or temporary unavailability. Retried with backoff.
    Transient,
    /// Misconfiguration or malformed collaborator output. Never retried.
    Fatal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Validation => write!(f, "validation"),
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Fatal => write!(f, "fatal"),
        }
    }
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error (status {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding timeout")]
    Timeout,
}

impl EmbeddingError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => ErrorClass::Transient,
            // 5xx gateway errors and rate limiting are transient
            EmbeddingError::ServerError { status, .. } => {
                if matches!(status, 429 | 502 | 503 | 504) {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Fatal
                }
            }
            EmbeddingError::RequestError(e) => {
                if e.is_timeout() || e.is_connect() {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Fatal
                }
            }
            EmbeddingError::InvalidResponse(_) | EmbeddingError::DimensionMismatch { .. } => {
                ErrorClass::Fatal
            }
        }
    }
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Errors related to vector index operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to vector store: {0}")]
    ConnectionError(String),

    #[error("storage temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("vector dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector has zero magnitude")]
    ZeroMagnitude,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("chunk {chunk_index} belongs to document '{found}', not '{expected}'")]
    ForeignChunk {
        expected: String,
        found: String,
        chunk_index: u32,
    },

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("search error: {0}")]
    SearchError(String),

    #[error("delete error: {0}")]
    DeleteError(String),

    #[error("operation timed out after {0}ms")]
    Timeout(u64),
}

impl VectorStoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            VectorStoreError::ConnectionError(_)
            | VectorStoreError::Unavailable(_)
            | VectorStoreError::Timeout(_) => ErrorClass::Transient,
            VectorStoreError::DimensionMismatch { .. }
            | VectorStoreError::ZeroMagnitude
            | VectorStoreError::InvalidQuery(_)
            | VectorStoreError::ForeignChunk { .. } => ErrorClass::Validation,
            VectorStoreError::SchemaError(_)
            | VectorStoreError::UpsertError(_)
            | VectorStoreError::SearchError(_)
            | VectorStoreError::DeleteError(_) => ErrorClass::Fatal,
        }
    }
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

impl From<sqlx::Error> for VectorStoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                VectorStoreError::Unavailable(e.to_string())
            }
            sqlx::Error::Database(ref db) => {
                // 08xxx connection exceptions, 40001 serialization, 40P01 deadlock,
                // 57P03 cannot connect now
                let transient = db.code().is_some_and(|code| {
                    code.starts_with("08") || matches!(&*code, "40001" | "40P01" | "57P03")
                });
                if transient {
                    VectorStoreError::Unavailable(e.to_string())
                } else {
                    VectorStoreError::UpsertError(e.to_string())
                }
            }
            other => VectorStoreError::UpsertError(other.to_string()),
        }
    }
}

/// Errors raised while splitting a document.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("max tokens per chunk must be at least 1")]
    ZeroBudget,
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors related to query-time retrieval.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStoreError(#[from] VectorStoreError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl SearchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SearchError::EmbeddingError(e) => e.class(),
            SearchError::VectorStoreError(e) => e.class(),
            SearchError::InvalidQuery(_) => ErrorClass::Validation,
        }
    }
}

/// A document-scoped ingestion failure.
#[derive(Debug, Clone, Error)]
#[error("document '{document_id}' failed at {stage} ({class}): {cause}")]
pub struct IngestFailure {
    pub document_id: String,
    pub stage: IngestStage,
    pub class: ErrorClass,
    pub cause: String,
}

impl IngestFailure {
    pub fn new(
        document_id: impl Into<String>,
        stage: IngestStage,
        class: ErrorClass,
        cause: impl fmt::Display,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            stage,
            class,
            cause: cause.to_string(),
        }
    }
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("search error: {0}")]
    Search(#[from] SearchError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestFailure),
}
