//! Embedding providers
//!
//! A provider turns text into a dense vector of a fixed dimension D.
//! Contracts:
//! - Deterministic for a fixed input within a process lifetime
//! - Identical D for every call
//! - `EmbeddingError` on provider failure or dimension mismatch
//!
//! The in-process [`HashEmbedder`] needs no network and is the default;
//! OpenAI/Azure clients live behind the `remote-embeddings` feature.

mod hash;

#[cfg(feature = "remote-embeddings")]
mod remote;

pub use hash::HashEmbedder;

#[cfg(feature = "remote-embeddings")]
pub use remote::{RemoteEmbedder, RemoteEmbedderConfig};

use async_trait::async_trait;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Provider call failed (network, quota, model)
    #[error("provider error: {message}")]
    Provider {
        /// What went wrong
        message: String,
        /// Whether retrying may succeed
        retryable: bool,
    },
    /// The provider returned a vector of the wrong length
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Configured dimension
        expected: usize,
        /// Returned dimension
        got: usize,
    },
    /// Input was rejected before reaching the provider
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EmbeddingError {
    /// Whether the caller may reasonably retry
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Provider { retryable, .. } => *retryable,
            EmbeddingError::DimensionMismatch { .. } => false,
            EmbeddingError::InvalidInput(_) => false,
        }
    }
}

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// String -> dense vector of a fixed dimension
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// The fixed dimension D of every vector this provider returns
    fn dimension(&self) -> usize;
}

// ============================================================================
// SIMILARITY
// ============================================================================

/// Cosine similarity between two f32 vectors, accumulated in f64.
///
/// Mismatched lengths and zero vectors yield 0.0, never NaN.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        (dot / denominator) as f32
    } else {
        0.0
    }
}

// ============================================================================
// TESTS
// ============================================================================
