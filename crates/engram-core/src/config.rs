//! Engine configuration
//!
//! All knobs are explicit and validated once, at engine construction.
//! A configuration that passes `validate` never causes an init-time
//! surprise later; mismatches (e.g. provider dimensions vs the vector
//! dimension) are rejected up front.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

// ============================================================================
// DEFAULTS
// ============================================================================

/// Default embedding dimension when no provider dictates one
pub const DEFAULT_DIMENSION: usize = 256;

/// Default per-call storage adapter timeout
pub const DEFAULT_ADAPTER_TIMEOUT_MS: u64 = 30_000;

/// Default per-call embedding timeout
pub const DEFAULT_EMBEDDING_TIMEOUT_MS: u64 = 10_000;

/// Default whole-operation deadline
pub const DEFAULT_OVERALL_TIMEOUT_MS: u64 = 60_000;

/// Default half-life for time decay, in days
pub const DEFAULT_HALF_LIFE_DAYS: f64 = 30.0;

/// Floor applied to decayed scores
pub const DEFAULT_MIN_SCORE: f64 = 0.1;

fn default_data_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "engram", "core") {
        return proj_dirs.data_dir().to_path_buf();
    }
    PathBuf::from(".engram")
}

// ============================================================================
// SECTIONS
// ============================================================================

/// Embedding provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// OpenAI embeddings API
    OpenAi,
    /// Azure OpenAI deployment
    Azure,
    /// In-process deterministic embedder, no network
    #[default]
    Local,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Which provider to construct
    pub provider: EmbeddingProviderKind,
    /// API key for remote providers; never logged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model or deployment name for remote providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Endpoint override (required for Azure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Dimensions the provider returns; must match `vector.dimension`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    /// Retry attempts before an embedding failure surfaces
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries
    pub retry_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Local,
            api_key: None,
            model: None,
            endpoint: None,
            dimensions: None,
            max_retries: 3,
            retry_delay_ms: 200,
        }
    }
}

/// Vector space configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorConfig {
    /// Fixed embedding dimension D; mismatches are fatal at init
    pub dimension: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON file per memory under per-tenant directories
    #[default]
    File,
    /// Single-table SQLite database
    Sql,
    /// Redis with secondary index keys
    Kv,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Which adapter to construct
    pub backend: StorageBackend,
    /// Backend-specific connection string (path or URL);
    /// defaults are derived from `data_path` when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
}

/// Retrieval tuning
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    /// Default similarity threshold when the caller passes none
    pub default_threshold: f64,
    /// Default result limit when the caller passes none
    pub default_limit: usize,
    /// Exponential decay half-life in days
    pub half_life_days: f64,
    /// Floor applied to decayed scores
    pub min_score: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_threshold: crate::memory::DEFAULT_RECALL_THRESHOLD,
            default_limit: crate::memory::DEFAULT_RECALL_LIMIT,
            half_life_days: DEFAULT_HALF_LIFE_DAYS,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

/// Per-call and whole-operation deadlines
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    /// Timeout for each storage adapter call
    pub adapter_ms: u64,
    /// Timeout for each embedding call
    pub embedding_ms: u64,
    /// Deadline for a whole engine operation
    pub overall_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            adapter_ms: DEFAULT_ADAPTER_TIMEOUT_MS,
            embedding_ms: DEFAULT_EMBEDDING_TIMEOUT_MS,
            overall_ms: DEFAULT_OVERALL_TIMEOUT_MS,
        }
    }
}

/// Connection pool bounds for pooled backends
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencyConfig {
    /// Maximum connections a pooled adapter may hold
    pub max_connections: u32,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
        }
    }
}

/// Security posture
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Tenant isolation; must be true in production
    pub tenant_isolation: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            tenant_isolation: true,
        }
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Root directory for file-backed state
    pub data_path: PathBuf,
    /// Embedding provider section
    pub embedding: EmbeddingConfig,
    /// Vector space section
    pub vector: VectorConfig,
    /// Storage backend section
    pub storage: StorageConfig,
    /// Retrieval tuning section
    pub retrieval: RetrievalConfig,
    /// Deadlines section
    pub timeouts: TimeoutConfig,
    /// Pool bounds section
    pub concurrency: ConcurrencyConfig,
    /// Security section
    pub security: SecurityConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            embedding: EmbeddingConfig::default(),
            vector: VectorConfig::default(),
            storage: StorageConfig::default(),
            retrieval: RetrievalConfig::default(),
            timeouts: TimeoutConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration, rejecting contradictions up front
    pub fn validate(&self) -> EngineResult<()> {
        if self.vector.dimension == 0 {
            return Err(EngineError::Config(
                "vector.dimension must be greater than zero".to_string(),
            ));
        }
        if let Some(dims) = self.embedding.dimensions {
            if dims != self.vector.dimension {
                return Err(EngineError::Config(format!(
                    "embedding.dimensions ({}) does not match vector.dimension ({})",
                    dims, self.vector.dimension
                )));
            }
        }
        match self.embedding.provider {
            EmbeddingProviderKind::OpenAi => {
                if self.embedding.api_key.as_deref().unwrap_or("").is_empty() {
                    return Err(EngineError::Config(
                        "embedding.api_key is required for the openai provider".to_string(),
                    ));
                }
            }
            EmbeddingProviderKind::Azure => {
                if self.embedding.api_key.as_deref().unwrap_or("").is_empty() {
                    return Err(EngineError::Config(
                        "embedding.api_key is required for the azure provider".to_string(),
                    ));
                }
                if self.embedding.endpoint.as_deref().unwrap_or("").is_empty() {
                    return Err(EngineError::Config(
                        "embedding.endpoint is required for the azure provider".to_string(),
                    ));
                }
            }
            EmbeddingProviderKind::Local => {}
        }
        if self.storage.backend == StorageBackend::Kv
            && self.storage.connection.as_deref().unwrap_or("").is_empty()
        {
            return Err(EngineError::Config(
                "storage.connection is required for the kv backend".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.default_threshold) {
            return Err(EngineError::Config(
                "retrieval.default_threshold must be in [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(EngineError::Config(
                "retrieval.min_score must be in [0, 1]".to_string(),
            ));
        }
        if self.retrieval.half_life_days <= 0.0 {
            return Err(EngineError::Config(
                "retrieval.half_life_days must be positive".to_string(),
            ));
        }
        if self.retrieval.default_limit == 0
            || self.retrieval.default_limit > crate::memory::MAX_RECALL_LIMIT
        {
            return Err(EngineError::Config(format!(
                "retrieval.default_limit must be in [1, {}]",
                crate::memory::MAX_RECALL_LIMIT
            )));
        }
        if self.timeouts.adapter_ms == 0
            || self.timeouts.embedding_ms == 0
            || self.timeouts.overall_ms == 0
        {
            return Err(EngineError::Config(
                "timeouts must be positive".to_string(),
            ));
        }
        if self.concurrency.max_connections == 0 {
            return Err(EngineError::Config(
                "concurrency.max_connections must be positive".to_string(),
            ));
        }
        if !self.security.tenant_isolation {
            tracing::warn!("tenant isolation is disabled; do not run this configuration in production");
        }
        Ok(())
    }

    /// Resolved SQLite database path for the sql backend
    pub fn sqlite_path(&self) -> PathBuf {
        match self.storage.connection.as_deref() {
            Some(conn) if !conn.is_empty() => PathBuf::from(conn),
            _ => self.data_path.join("memories.db"),
        }
    }

    /// Resolved root directory for the file backend
    pub fn file_root(&self) -> PathBuf {
        match self.storage.connection.as_deref() {
            Some(conn) if !conn.is_empty() => PathBuf::from(conn),
            _ => self.data_path.join("memories"),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
