//! Test harness
//!
//! Provides isolated engine instances over temporary storage roots plus a
//! small-vocabulary embedder whose vectors are known exactly, so score
//! assertions can be precise.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engram_core::{
    EmbeddingError, EmbeddingProvider, EngineConfig, FileStore, MemoryEngine, MemoryRecord,
    MemoryType, SqliteStore, StorageAdapter,
};

/// Embedding dimension used throughout the journey tests
pub const DIMENSION: usize = 4;

/// Embedder with a fixed vocabulary of unit vectors.
///
/// "alpha", "beta", "gamma" and "delta" map to the four axes; any other
/// text maps to a deterministic diagonal vector. Queries equal to a
/// stored word therefore score exactly 1.0 against it and 0.5 (after
/// normalization) against the other axes.
pub struct VocabEmbedder;

#[async_trait]
impl EmbeddingProvider for VocabEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(match text.trim().to_lowercase().as_str() {
            "alpha" => vec![1.0, 0.0, 0.0, 0.0],
            "beta" => vec![0.0, 1.0, 0.0, 0.0],
            "gamma" => vec![0.0, 0.0, 1.0, 0.0],
            "delta" => vec![0.0, 0.0, 0.0, 1.0],
            _ => vec![0.5, 0.5, 0.5, 0.5],
        })
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }
}

/// Engine configuration rooted in a temporary directory
pub fn test_config(dir: &tempfile::TempDir) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.data_path = dir.path().to_path_buf();
    config.vector.dimension = DIMENSION;
    config
}

/// Initialized engine over a file store, plus the store for
/// adapter-level assertions
pub async fn file_engine(dir: &tempfile::TempDir) -> (MemoryEngine, Arc<FileStore>) {
    let config = test_config(dir);
    let store = Arc::new(FileStore::new(config.file_root()));
    let engine = MemoryEngine::with_parts(
        config,
        Arc::clone(&store) as Arc<dyn StorageAdapter>,
        Arc::new(VocabEmbedder),
    )
    .expect("engine construction");
    engine.initialize().await.expect("engine initialization");
    (engine, store)
}

/// Initialized engine over a SQLite store
pub async fn sqlite_engine(dir: &tempfile::TempDir) -> (MemoryEngine, Arc<SqliteStore>) {
    let config = test_config(dir);
    let store = Arc::new(SqliteStore::open(config.sqlite_path()).expect("sqlite open"));
    let engine = MemoryEngine::with_parts(
        config,
        Arc::clone(&store) as Arc<dyn StorageAdapter>,
        Arc::new(VocabEmbedder),
    )
    .expect("engine construction");
    engine.initialize().await.expect("engine initialization");
    (engine, store)
}

/// Engine over an existing file root, without initializing it
pub fn uninitialized_file_engine(dir: &tempfile::TempDir) -> (MemoryEngine, Arc<FileStore>) {
    let config = test_config(dir);
    let store = Arc::new(FileStore::new(config.file_root()));
    let engine = MemoryEngine::with_parts(
        config,
        Arc::clone(&store) as Arc<dyn StorageAdapter>,
        Arc::new(VocabEmbedder),
    )
    .expect("engine construction");
    (engine, store)
}

/// Hand-built record for seeding storage underneath an engine
pub fn seeded_record(
    id: &str,
    tenant: &str,
    content: &str,
    embedding: Vec<f32>,
    created_at: DateTime<Utc>,
) -> MemoryRecord {
    MemoryRecord {
        id: id.to_string(),
        tenant_id: tenant.to_string(),
        agent_id: None,
        memory_type: MemoryType::Fact,
        content: content.to_string(),
        embedding,
        confidence: 1.0,
        importance: 0.5,
        emotional_weight: None,
        tags: Vec::new(),
        context: HashMap::new(),
        created_at,
        updated_at: created_at,
        last_accessed_at: None,
        access_count: 0,
        ttl: None,
    }
}
