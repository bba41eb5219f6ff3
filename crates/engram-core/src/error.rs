//! Error model
//!
//! Every public operation returns `EngineResult<T>`. Leaf errors from the
//! storage adapters and embedding providers are wrapped with operation
//! context as they ascend; secrets and full embedding vectors never appear
//! in messages.

use crate::embeddings::EmbeddingError;
use crate::storage::StorageError;

/// Result alias used across the crate
pub type EngineResult<T> = Result<T, EngineError>;

/// Typed engine error with a stable kind and a retryable flag
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Operation invoked before `initialize` or after `close`
    #[error("engine is not initialized")]
    NotInitialized,

    /// Empty content, empty tenant, out-of-range numeric, oversized payload
    #[error("validation failed: {0}")]
    Validation(String),

    /// Embedding provider or dimension failure
    #[error("embedding failed: {message}")]
    Embedding {
        /// What went wrong
        message: String,
        /// Whether retrying may succeed
        retryable: bool,
    },

    /// Storage adapter I/O failure
    #[error("storage failed: {message}")]
    Storage {
        /// What went wrong
        message: String,
        /// Whether retrying may succeed
        retryable: bool,
    },

    /// In-memory index inconsistency; never retryable, degrades health
    #[error("index inconsistency: {0}")]
    Index(String),

    /// Id-addressed operation on an absent memory
    #[error("memory not found: {0}")]
    NotFound(String),

    /// External call or operation exceeded its deadline
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that was cut off
        operation: String,
        /// The deadline that expired
        timeout_ms: u64,
    },

    /// Invalid configuration, surfaced at init time only
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotInitialized => "not_initialized",
            EngineError::Validation(_) => "validation",
            EngineError::Embedding { .. } => "embedding",
            EngineError::Storage { .. } => "storage",
            EngineError::Index(_) => "index",
            EngineError::NotFound(_) => "not_found",
            EngineError::Timeout { .. } => "timeout",
            EngineError::Config(_) => "config",
        }
    }

    /// Whether the caller may reasonably retry the operation
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Embedding { retryable, .. } => *retryable,
            EngineError::Storage { retryable, .. } => *retryable,
            EngineError::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => EngineError::NotFound(id),
            other => {
                let retryable = other.is_retryable();
                EngineError::Storage {
                    message: other.to_string(),
                    retryable,
                }
            }
        }
    }
}

impl From<EmbeddingError> for EngineError {
    fn from(err: EmbeddingError) -> Self {
        let retryable = err.is_retryable();
        EngineError::Embedding {
            message: err.to_string(),
            retryable,
        }
    }
}
