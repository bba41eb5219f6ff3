//! Journey: boundary inputs and failure-state behavior

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use engram_core::{
    ContextRequest, EmbeddingError, EmbeddingProvider, FileStore, HealthStatus, MemoryEngine,
    MemoryType, RecallOptions, RememberOptions, StorageAdapter,
};
use engram_e2e_tests::harness::{
    file_engine, seeded_record, test_config, uninitialized_file_engine, VocabEmbedder,
};

fn wide_open() -> RecallOptions {
    RecallOptions {
        threshold: 0.0,
        time_decay: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn empty_and_whitespace_content_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _store) = file_engine(&dir).await;

    for content in ["", "   ", "\n\t"] {
        let err = engine
            .remember(content, "t1", None, RememberOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}

#[tokio::test]
async fn missing_tenant_is_a_validation_error_not_a_default() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    let err = engine
        .remember("alpha", "", None, RememberOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    // Nothing was silently stored under a fallback tenant
    assert_eq!(
        store.count(&engram_core::MemoryFilter::default()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn very_long_content_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    let content = "important detail ".repeat(700); // > 10_000 chars
    assert!(content.len() > 10_000);
    let id = engine
        .remember(&content, "t1", None, RememberOptions::default())
        .await
        .unwrap();
    let record = store.retrieve(&id).await.unwrap().unwrap();
    assert_eq!(record.content, content.trim());
}

#[tokio::test]
async fn recall_threshold_out_of_range_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _store) = file_engine(&dir).await;

    let mut opts = wide_open();
    opts.threshold = 1.5;
    let err = engine.recall("alpha", "t1", None, opts).await.unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn expired_memories_are_absent_and_lazily_removed() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    let mut opts = RememberOptions::default();
    opts.ttl = Some(Utc::now() - Duration::seconds(5));
    let dead = engine.remember("alpha", "t1", None, opts).await.unwrap();
    let live = engine
        .remember("beta", "t1", None, RememberOptions::default())
        .await
        .unwrap();

    let hits = engine.recall("alpha", "t1", None, wide_open()).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.id, live);

    // The recall dropped the expired record from storage as well
    assert!(store.retrieve(&dead).await.unwrap().is_none());
}

#[tokio::test]
async fn sweep_expired_removes_eagerly() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    let mut opts = RememberOptions::default();
    opts.ttl = Some(Utc::now() - Duration::seconds(1));
    engine.remember("alpha", "t1", None, opts.clone()).await.unwrap();
    engine.remember("beta", "t2", None, opts).await.unwrap();
    engine
        .remember("gamma", "t1", None, RememberOptions::default())
        .await
        .unwrap();

    let removed = engine.sweep_expired().await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(
        store.count(&engram_core::MemoryFilter::default()).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn init_rejects_a_dimension_mismatch_wholesale() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = uninitialized_file_engine(&dir);
    store.initialize().await.unwrap();

    let now = Utc::now();
    store
        .store(&seeded_record("ok", "t1", "alpha", vec![1.0, 0.0, 0.0, 0.0], now))
        .await
        .unwrap();
    store
        .store(&seeded_record("bad", "t1", "beta", vec![1.0, 0.0, 0.0], now))
        .await
        .unwrap();

    let err = engine.initialize().await.unwrap_err();
    assert_eq!(err.kind(), "validation");

    // The engine stays uninitialized; nothing was partially loaded
    let report = engine.health().await;
    assert!(!report.initialized);
    assert_eq!(report.status, HealthStatus::Unhealthy);
    let err = engine
        .recall("alpha", "t1", None, wide_open())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_initialized");
}

#[tokio::test]
async fn context_filters_by_type_and_reports_totals() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _store) = file_engine(&dir).await;

    let mut task_opts = RememberOptions::default();
    task_opts.memory_type = Some(MemoryType::Task);
    engine.remember("alpha", "t1", None, task_opts).await.unwrap();

    let mut fact_opts = RememberOptions::default();
    fact_opts.memory_type = Some(MemoryType::Fact);
    engine.remember("beta", "t1", None, fact_opts.clone()).await.unwrap();
    engine.remember("gamma", "t1", None, fact_opts).await.unwrap();

    let response = engine
        .context(ContextRequest {
            tenant_id: "t1".to_string(),
            agent_id: None,
            topic: Some("alpha".to_string()),
            memory_types: vec![MemoryType::Fact],
            max_memories: Some(1),
        })
        .await
        .unwrap();

    assert_eq!(response.total_count, 2);
    assert_eq!(response.memories.len(), 1);
    assert!(response
        .memories
        .iter()
        .all(|m| m.memory_type == MemoryType::Fact));
    assert!(response.summary.contains("1 fact"));
    assert!((response.confidence - 1.0).abs() < 1e-9);
}

/// Embedder that can be switched into a failing mode after setup
struct FlakyEmbedder {
    fail: AtomicBool,
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(EmbeddingError::Provider {
                message: "provider offline".to_string(),
                retryable: true,
            });
        }
        VocabEmbedder.embed(text).await
    }

    fn dimension(&self) -> usize {
        VocabEmbedder.dimension()
    }
}

#[tokio::test]
async fn embedding_outage_degrades_health_and_fails_remember() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = Arc::new(FileStore::new(config.file_root()));
    let embedder = Arc::new(FlakyEmbedder {
        fail: AtomicBool::new(false),
    });

    let engine = MemoryEngine::with_parts(
        config,
        Arc::clone(&store) as Arc<dyn StorageAdapter>,
        Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
    )
    .unwrap();
    engine.initialize().await.unwrap();
    assert_eq!(engine.health().await.status, HealthStatus::Healthy);

    embedder.fail.store(true, Ordering::Relaxed);

    let report = engine.health().await;
    assert_eq!(report.status, HealthStatus::Degraded);
    assert!(report.checks.iter().any(|c| c.name == "embedding" && !c.ok));

    let err = engine
        .remember("alpha", "t1", None, RememberOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "embedding");
    assert!(err.is_retryable());
    // The failed remember left no record behind
    assert_eq!(
        store.count(&engram_core::MemoryFilter::default()).await.unwrap(),
        0
    );
}
