//! # Engram Core
//!
//! Agent-oriented long-term memory engine. Agents deposit free-form
//! textual memories under a tenant (and optional agent) and later query
//! them by natural-language prompt for a ranked, filtered, time-decayed
//! set of recollections.
//!
//! - **Hybrid retrieval**: cosine similarity over dense embeddings,
//!   composed with type/tag secondary indices and exponential time decay
//! - **Tenant isolation**: every query is scoped by tenant; no
//!   cross-tenant read or write
//! - **Heuristic enrichment**: keyword classification into memory types
//!   and an importance score when the caller supplies neither
//! - **Pluggable persistence**: file, SQLite and Redis adapters behind
//!   one async contract
//! - **Deterministic ranking**: identical inputs against an unchanged
//!   store return identical ordering
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use engram_core::{EngineConfig, MemoryEngine, RecallOptions, RememberOptions};
//!
//! let engine = MemoryEngine::new(EngineConfig::default())?;
//! engine.initialize().await?;
//!
//! // Deposit a memory for a tenant
//! let id = engine
//!     .remember("The deploy password rotates every Friday", "acme", None,
//!               RememberOptions::default())
//!     .await?;
//!
//! // Query it back, ranked and scored
//! let hits = engine
//!     .recall("when does the password rotate?", "acme", None,
//!             RecallOptions::default())
//!     .await?;
//!
//! engine.close().await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): compile SQLite from the bundled
//!   amalgamation
//! - `kv`: Redis storage backend
//! - `remote-embeddings`: OpenAI / Azure embedding providers
//! - `full`: everything

// ============================================================================
// MODULES
// ============================================================================

pub mod classify;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod index;
pub mod memory;
pub mod search;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// The engine and its configuration
pub use config::{
    EmbeddingConfig, EmbeddingProviderKind, EngineConfig, RetrievalConfig, StorageBackend,
    StorageConfig, TimeoutConfig, VectorConfig,
};
pub use engine::MemoryEngine;
pub use error::{EngineError, EngineResult};

// Memory types
pub use memory::{
    ContextRequest, ContextResponse, EngineStats, HealthCheck, HealthReport, HealthStatus,
    IndexSizes, MemoryPatch, MemoryRecord, MemoryType, RecallHit, RecallOptions, RememberOptions,
};

// Seams for alternate implementations
pub use classify::{Classifier, HeuristicClassifier};
pub use embeddings::{cosine_similarity, EmbeddingError, EmbeddingProvider, HashEmbedder};
pub use storage::{
    AdapterHealth, FileStore, MemoryFilter, SortField, SqliteStore, StorageAdapter, StorageError,
};

#[cfg(feature = "kv")]
pub use storage::RedisStore;

#[cfg(feature = "remote-embeddings")]
pub use embeddings::{RemoteEmbedder, RemoteEmbedderConfig};
