//! Journey: a populated store survives an engine restart intact

use chrono::{Duration, Utc};
use engram_core::{
    HashEmbedder, MemoryEngine, RecallOptions, StorageAdapter, EmbeddingProvider, FileStore,
};
use engram_e2e_tests::harness::{seeded_record, test_config};
use std::sync::Arc;

const POPULATION: usize = 1_000;

/// Seed a large store directly through the adapter's bulk path
async fn populate(store: &FileStore, embedder: &HashEmbedder) -> Vec<String> {
    let base = Utc::now() - Duration::days(10);
    let mut batch = Vec::with_capacity(POPULATION);
    for i in 0..POPULATION {
        let content = format!("memory number {} about topic {}", i, i % 17);
        let embedding = embedder.embed(&content).await.unwrap();
        let mut record = seeded_record(
            &format!("m-{:04}", i),
            "t1",
            &content,
            embedding,
            base + Duration::minutes(i as i64),
        );
        record.importance = 0.1 + (i % 9) as f32 * 0.1;
        batch.push(record);
    }
    store.bulk_store(&batch).await.unwrap();
    batch.iter().map(|m| m.id.clone()).collect()
}

#[tokio::test]
async fn restart_preserves_population_and_ordering() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let embedder = HashEmbedder::new(engram_e2e_tests::harness::DIMENSION);

    let store = Arc::new(FileStore::new(config.file_root()));
    store.initialize().await.unwrap();
    populate(&store, &embedder).await;

    let opts = RecallOptions {
        threshold: 0.0,
        time_decay: false,
        limit: 10,
        ..Default::default()
    };

    // First engine lifetime
    let before: Vec<(String, f64)> = {
        let engine = MemoryEngine::with_parts(
            config.clone(),
            Arc::clone(&store) as Arc<dyn StorageAdapter>,
            Arc::new(HashEmbedder::new(engram_e2e_tests::harness::DIMENSION)),
        )
        .unwrap();
        engine.initialize().await.unwrap();

        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.total, POPULATION as u64);
        assert_eq!(stats.index_sizes.semantic, POPULATION);

        let hits = engine
            .recall("topic 3", "t1", None, opts.clone())
            .await
            .unwrap();
        engine.close().await.unwrap();
        hits.into_iter().map(|h| (h.memory.id, h.score)).collect()
    };
    assert_eq!(before.len(), 10);

    // Second engine lifetime over the same root
    let engine = MemoryEngine::with_parts(
        config,
        Arc::clone(&store) as Arc<dyn StorageAdapter>,
        Arc::new(HashEmbedder::new(engram_e2e_tests::harness::DIMENSION)),
    )
    .unwrap();
    engine.initialize().await.unwrap();

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.total, POPULATION as u64);

    let after: Vec<(String, f64)> = engine
        .recall("topic 3", "t1", None, opts)
        .await
        .unwrap()
        .into_iter()
        .map(|h| (h.memory.id, h.score))
        .collect();

    assert_eq!(before, after);
}

#[tokio::test]
async fn wiping_the_root_yields_an_empty_valid_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);

    {
        let store = Arc::new(FileStore::new(config.file_root()));
        store.initialize().await.unwrap();
        let embedder = HashEmbedder::new(engram_e2e_tests::harness::DIMENSION);
        populate(&store, &embedder).await;
    }

    std::fs::remove_dir_all(config.file_root()).unwrap();

    let store = Arc::new(FileStore::new(config.file_root()));
    let engine = MemoryEngine::with_parts(
        config,
        store as Arc<dyn StorageAdapter>,
        Arc::new(HashEmbedder::new(engram_e2e_tests::harness::DIMENSION)),
    )
    .unwrap();
    engine.initialize().await.unwrap();

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.avg_importance, 0.0);
}

#[tokio::test]
async fn sqlite_restart_preserves_population() {
    use engram_core::SqliteStore;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.storage.backend = engram_core::StorageBackend::Sql;

    let embedder = HashEmbedder::new(engram_e2e_tests::harness::DIMENSION);
    let base = Utc::now();
    {
        let store = SqliteStore::open(config.sqlite_path()).unwrap();
        let mut batch = Vec::new();
        for i in 0..100 {
            let content = format!("sql record {}", i);
            let embedding = embedder.embed(&content).await.unwrap();
            batch.push(seeded_record(
                &format!("s-{:03}", i),
                "t1",
                &content,
                embedding,
                base + Duration::seconds(i),
            ));
        }
        store.bulk_store(&batch).await.unwrap();
        store.close().await.unwrap();
    }

    let store = Arc::new(SqliteStore::open(config.sqlite_path()).unwrap());
    let engine = MemoryEngine::with_parts(
        config,
        store as Arc<dyn StorageAdapter>,
        Arc::new(HashEmbedder::new(engram_e2e_tests::harness::DIMENSION)),
    )
    .unwrap();
    engine.initialize().await.unwrap();
    assert_eq!(engine.stats().await.unwrap().total, 100);
}
