use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stages, named after the state a successful transition reaches.
///
/// Serialized with the same activity names `Display` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IngestStage {
    #[serde(rename = "chunking")]
    Chunked,
    #[serde(rename = "embedding")]
    Embedded,
    #[serde(rename = "indexing")]
    Indexed,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestStage::Chunked => write!(f, "chunking"),
            IngestStage::Embedded => write!(f, "embedding"),
            IngestStage::Indexed => write!(f, "indexing"),
        }
    }
}

/// Per-document ingestion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Fetched,
    Chunked,
    Embedded,
    Indexed,
    Failed(IngestStage),
}

impl DocumentState {
    /// The stage the next transition would attempt, if any.
    pub fn next_stage(self) -> Option<IngestStage> {
        match self {
            DocumentState::Fetched => Some(IngestStage::Chunked),
            DocumentState::Chunked => Some(IngestStage::Embedded),
            DocumentState::Embedded => Some(IngestStage::Indexed),
            DocumentState::Indexed | DocumentState::Failed(_) => None,
        }
    }

}

impl From<IngestStage> for DocumentState {
    /// The state a successful run of `stage` reaches.
    fn from(stage: IngestStage) -> Self {
        match stage {
            IngestStage::Chunked => DocumentState::Chunked,
            IngestStage::Embedded => DocumentState::Embedded,
            IngestStage::Indexed => DocumentState::Indexed,
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentState::Fetched => write!(f, "fetched"),
            DocumentState::Chunked => write!(f, "chunked"),
            DocumentState::Embedded => write!(f, "embedded"),
            DocumentState::Indexed => write!(f, "indexed"),
            DocumentState::Failed(stage) => write!(f, "failed({stage})"),
        }
    }
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub document_id: String,
    pub status: DocumentState,
    pub chunk_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl IngestResult {
    pub fn indexed(document_id: impl Into<String>, chunk_count: usize) -> Self {
        Self {
            document_id: document_id.into(),
            status: DocumentState::Indexed,
            chunk_count,
            failure_reason: None,
        }
    }

    pub fn failed(failure: &crate::error::IngestFailure) -> Self {
        Self {
            document_id: failure.document_id.clone(),
            status: DocumentState::Failed(failure.stage),
            chunk_count: 0,
            failure_reason: Some(failure.to_string()),
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.status == DocumentState::Indexed
    }
}
