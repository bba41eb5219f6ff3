//! Remote embedding providers (OpenAI / Azure OpenAI)
//!
//! Speaks the `/embeddings` JSON API. Transient failures (timeouts, 429,
//! 5xx) are retried with exponential backoff before surfacing; dimension
//! mismatches surface immediately and are never retried.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{EmbeddingError, EmbeddingProvider};

/// Default OpenAI embeddings endpoint
const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

/// Configuration for a remote embedding provider
#[derive(Debug, Clone)]
pub struct RemoteEmbedderConfig {
    /// Full endpoint URL; Azure deployments pass their own
    pub endpoint: String,
    /// Bearer or api-key credential
    pub api_key: String,
    /// Model (or deployment) name
    pub model: String,
    /// Expected vector dimension
    pub dimension: usize,
    /// Use Azure's `api-key` header instead of a bearer token
    pub azure_auth: bool,
    /// Retry attempts for transient failures
    pub max_retries: u32,
    /// Base backoff delay, doubled per attempt
    pub retry_delay: Duration,
}

impl RemoteEmbedderConfig {
    /// Config for the public OpenAI API
    pub fn openai(api_key: String, model: String, dimension: usize) -> Self {
        Self {
            endpoint: OPENAI_ENDPOINT.to_string(),
            api_key,
            model,
            dimension,
            azure_auth: false,
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
        }
    }

    /// Config for an Azure OpenAI deployment
    pub fn azure(endpoint: String, api_key: String, model: String, dimension: usize) -> Self {
        Self {
            endpoint,
            api_key,
            model,
            dimension,
            azure_auth: true,
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsDatum {
    embedding: Vec<f32>,
}

/// HTTP embedding client for OpenAI-compatible APIs
pub struct RemoteEmbedder {
    client: reqwest::Client,
    config: RemoteEmbedderConfig,
}

impl RemoteEmbedder {
    /// Build a client; the HTTP timeout is enforced by the engine's
    /// embedding deadline, so the client itself stays unbounded.
    pub fn new(config: RemoteEmbedderConfig) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| EmbeddingError::Provider {
                message: format!("failed to build HTTP client: {}", e),
                retryable: false,
            })?;
        Ok(Self { client, config })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "input": texts,
        });

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        request = if self.config.azure_auth {
            request.header("api-key", &self.config.api_key)
        } else {
            request.bearer_auth(&self.config.api_key)
        };

        let response = request.send().await.map_err(|e| EmbeddingError::Provider {
            message: format!("request failed: {}", e),
            retryable: true,
        })?;

        let status = response.status();
        if !status.is_success() {
            // 429 and 5xx are worth retrying; 4xx are not
            let retryable = status.as_u16() == 429 || status.is_server_error();
            return Err(EmbeddingError::Provider {
                message: format!("provider returned HTTP {}", status),
                retryable,
            });
        }

        let parsed: EmbeddingsResponse =
            response.json().await.map_err(|e| EmbeddingError::Provider {
                message: format!("malformed response: {}", e),
                retryable: false,
            })?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::Provider {
                message: format!(
                    "provider returned {} vectors for {} inputs",
                    parsed.data.len(),
                    texts.len()
                ),
                retryable: false,
            });
        }

        let mut vectors = Vec::with_capacity(parsed.data.len());
        for datum in parsed.data {
            if datum.embedding.len() != self.config.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.config.dimension,
                    got: datum.embedding.len(),
                });
            }
            vectors.push(datum.embedding);
        }
        Ok(vectors)
    }

    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut delay = self.config.retry_delay;
        let mut attempt = 0;
        loop {
            match self.request(texts).await {
                Ok(vectors) => {
                    debug!(count = vectors.len(), "embedded batch");
                    return Ok(vectors);
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "embedding attempt failed, backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.request_with_retry(&[text.to_string()]).await?;
        Ok(vectors.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_with_retry(texts).await
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}
