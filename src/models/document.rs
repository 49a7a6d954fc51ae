use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A unit of source content, typically a scraped article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Feed metadata used to compose a header when the source supplies none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub comment_count: Option<i64>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl ArticleMetadata {
    /// Render the `Title: ... / Author: ... / Summary:` header block.
    pub fn render_header(&self, title: &str) -> String {
        let mut parts = vec![format!("Title: {title}")];

        if let Some(author) = &self.author {
            parts.push(format!("Author: {author}"));
        }
        if let Some(score) = self.score {
            parts.push(format!("Score: {score} points"));
        }
        if let Some(comments) = self.comment_count {
            parts.push(format!("Comments: {comments}"));
        }
        if let Some(published) = &self.published_at {
            parts.push(format!("Published: {published}"));
        }
        if !self.tags.is_empty() {
            parts.push(format!("Tags: {}", self.tags.join(", ")));
        }
        if let Some(url) = &self.url {
            parts.push(format!("URL: {url}"));
        }
        if let Some(summary) = self.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            parts.push(format!("\nSummary:\n{summary}"));
        }

        parts.join("\n")
    }
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            header: None,
            body: body.into(),
            url: None,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    /// Build a document whose header is composed from feed metadata.
    pub fn from_article(
        id: impl Into<String>,
        title: impl Into<String>,
        metadata: &ArticleMetadata,
        body: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let header = metadata.render_header(&title);
        Self {
            id: id.into(),
            title,
            header: Some(header),
            body: body.into(),
            url: metadata.url.clone(),
        }
    }

    /// Header text, if the source marked one and it is not blank.
    pub fn header_text(&self) -> Option<&str> {
        self.header.as_deref().filter(|h| !h.trim().is_empty())
    }
}

/// Whether a chunk came from the header region or the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Header,
    Content,
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkKind::Header => write!(f, "header"),
            ChunkKind::Content => write!(f, "content"),
        }
    }
}

impl std::str::FromStr for ChunkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "header" => Ok(ChunkKind::Header),
            "content" => Ok(ChunkKind::Content),
            _ => Err(format!("unknown chunk kind: {}", s)),
        }
    }
}

/// A contiguous, token-bounded segment of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub kind: ChunkKind,
    pub chunk_index: u32,
    /// Title of the owning document, for citing the source.
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub text: String,
    pub token_count: u32,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn generate_id(document_id: &str, chunk_index: u32) -> String {
        use uuid::Uuid;
        let name = format!("{}:{}", document_id, chunk_index);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    pub fn new(
        document_id: &str,
        kind: ChunkKind,
        chunk_index: u32,
        text: String,
        token_count: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::generate_id(document_id, chunk_index),
            document_id: document_id.to_string(),
            kind,
            chunk_index,
            title: String::new(),
            url: None,
            text,
            token_count,
            embedding: Vec::new(),
            created_at,
        }
    }

    /// Record where the chunk came from.
    #[must_use]
    pub fn with_source(mut self, title: impl Into<String>, url: Option<String>) -> Self {
        self.title = title.into();
        self.url = url;
        self
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }
}
