//! Query-side models: filters, ranked results and output formats.

use serde::{Deserialize, Serialize};

use super::document::{Chunk, ChunkKind};

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Narrows the candidate pool before ranking.
///
/// Empty fields match everything. A filter never changes how candidates
/// are scored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChunkKind>,
}

impl ChunkFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id.into()),
            kind: None,
        }
    }

    pub fn kind(kind: ChunkKind) -> Self {
        Self {
            document_id: None,
            kind: Some(kind),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ChunkKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.document_id
            .as_deref()
            .is_none_or(|id| id == chunk.document_id)
            && self.kind.is_none_or(|kind| kind == chunk.kind)
    }
}

/// One ranked hit from the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub chunk: Chunk,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
}

/// Retrieval context handed to the request layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_text: String,
    pub chunk_kind: ChunkKind,
    pub document_id: String,
    pub chunk_index: u32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub score: f32,
}

impl From<QueryResult> for RetrievedChunk {
    fn from(result: QueryResult) -> Self {
        Self {
            chunk_text: result.chunk.text,
            chunk_kind: result.chunk.kind,
            document_id: result.chunk.document_id,
            chunk_index: result.chunk.chunk_index,
            title: result.chunk.title,
            url: result.chunk.url,
            score: result.score,
        }
    }
}

/// Ranked results for one query, with timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub results: Vec<RetrievedChunk>,
    pub duration_ms: u64,
}

impl SearchResults {
    pub fn new(query: String, results: Vec<RetrievedChunk>, duration_ms: u64) -> Self {
        Self {
            query,
            results,
            duration_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
