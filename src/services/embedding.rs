//! Embedding capability and its HTTP client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;

/// Maps text to fixed-dimension vectors.
///
/// Implementations must fail explicitly rather than return empty or zero
/// vectors. `embed_batch` preserves input order and length.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimensionality of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Model identifier, recorded for diagnostics.
    fn model_version(&self) -> &str;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }
}

/// Check that a batch response has the expected shape and usable values.
pub fn validate_embeddings(
    expected_len: usize,
    dimension: usize,
    embeddings: &[Vec<f32>],
) -> Result<(), EmbeddingError> {
    if embeddings.len() != expected_len {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected_len,
            embeddings.len()
        )));
    }

    for (idx, embedding) in embeddings.iter().enumerate() {
        if embedding.len() != dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: embedding.len(),
            });
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::InvalidResponse(format!(
                "embedding {idx} contains non-finite values"
            )));
        }
        if embedding.iter().all(|v| *v == 0.0) {
            return Err(EmbeddingError::InvalidResponse(format!(
                "embedding {idx} is a zero vector"
            )));
        }
    }

    Ok(())
}

/// Scale a vector to unit length in place. Returns false for zero vectors.
pub fn normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return false;
    }
    for v in vector.iter_mut() {
        *v /= norm;
    }
    true
}

/// Request body for the /embed endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    model: &'a str,
    dimensions: usize,
}

/// Response from the /embed endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse(Vec<Vec<f32>>);

/// Health response from the /health endpoint.
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

/// Client for an HTTP embedding server.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl EmbeddingClient {
    /// Create a new embedding client with the given configuration.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: config.dimension as usize,
            batch_size: config.batch_size.max(1) as usize,
        })
    }

    /// Check if the embedding server is healthy and ready.
    pub async fn health_check(&self) -> Result<HealthResponse, EmbeddingError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::ServerError {
                status: status.as_u16(),
                message: "health check failed".to_string(),
            });
        }

        // Server may return an empty or non-JSON body on health check
        let text = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&text).unwrap_or(HealthResponse {
            status: Some("healthy".to_string()),
            model_id: None,
        }))
    }

    /// Get the base URL of the embedding server.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Internal method to embed a single batch.
    async fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/embed", self.base_url);
        let request = EmbedRequest {
            inputs: texts,
            model: &self.model,
            dimensions: self.dimension,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else {
                    EmbeddingError::RequestError(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError {
                status: status.as_u16(),
                message: body,
            });
        }

        let EmbedResponse(mut embeddings) = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        validate_embeddings(texts.len(), self.dimension, &embeddings)?;
        for embedding in &mut embeddings {
            normalize(embedding);
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_version(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.embed_single_batch(batch).await?;
            all_embeddings.extend(embeddings);
        }

        debug!(
            count = all_embeddings.len(),
            model = %self.model,
            "generated embeddings"
        );

        Ok(all_embeddings)
    }
}
