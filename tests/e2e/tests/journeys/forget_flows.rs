//! Journey: forgetting leaves no trace in storage or any index

use engram_core::{RecallOptions, RememberOptions, StorageAdapter};
use engram_e2e_tests::harness::{file_engine, sqlite_engine};

fn wide_open() -> RecallOptions {
    RecallOptions {
        threshold: 0.0,
        time_decay: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn forget_by_id_reports_existence() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    let id = engine
        .remember("alpha", "t1", None, RememberOptions::default())
        .await
        .unwrap();

    assert!(engine.forget_by_id(&id).await.unwrap());
    assert!(!engine.forget_by_id(&id).await.unwrap());
    assert!(store.retrieve(&id).await.unwrap().is_none());
    assert!(engine.recall("alpha", "t1", None, wide_open()).await.unwrap().is_empty());
}

#[tokio::test]
async fn forget_removes_from_tag_index() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _store) = file_engine(&dir).await;

    let mut opts = RememberOptions::default();
    opts.tags = vec!["urgent".to_string()];
    let first = engine
        .remember("alpha", "t1", None, opts.clone())
        .await
        .unwrap();
    let second = engine.remember("beta", "t1", None, opts).await.unwrap();

    assert!(engine.forget_by_id(&first).await.unwrap());

    let mut recall_opts = wide_open();
    recall_opts.tags = vec!["urgent".to_string()];
    let hits = engine.recall("beta", "t1", None, recall_opts).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.id, second);

    // A full rebuild from storage agrees with the incremental state
    engine.reindex().await.unwrap();
    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.index_sizes.semantic, 1);
    assert_eq!(stats.index_sizes.tags, 1);
}

#[tokio::test]
async fn forget_by_query_deletes_only_confirmed_matches() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    let exact = engine
        .remember("alpha", "t1", None, RememberOptions::default())
        .await
        .unwrap();
    let unrelated = engine
        .remember("beta", "t1", None, RememberOptions::default())
        .await
        .unwrap();

    // alpha scores 1.0 against itself; beta normalizes to 0.5
    let removed = engine
        .forget_by_query("alpha", "t1", None, 0.9)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(store.retrieve(&exact).await.unwrap().is_none());
    assert!(store.retrieve(&unrelated).await.unwrap().is_some());
}

#[tokio::test]
async fn forget_by_query_respects_tenants() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    engine
        .remember("alpha", "t1", None, RememberOptions::default())
        .await
        .unwrap();
    let other = engine
        .remember("alpha", "t2", None, RememberOptions::default())
        .await
        .unwrap();

    let removed = engine
        .forget_by_query("alpha", "t1", None, 0.9)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(store.retrieve(&other).await.unwrap().is_some());
}

#[tokio::test]
async fn update_restamps_and_reindexes_changed_keys() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    let id = engine
        .remember("alpha", "t1", None, RememberOptions::default())
        .await
        .unwrap();
    let before = store.retrieve(&id).await.unwrap().unwrap();

    let patch = engram_core::MemoryPatch {
        content: Some("beta".to_string()),
        tags: Some(vec!["renamed".to_string()]),
        ..Default::default()
    };
    engine.update(&id, patch).await.unwrap();

    let after = store.retrieve(&id).await.unwrap().unwrap();
    assert_eq!(after.content, "beta");
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at > before.updated_at);
    // Content change re-embedded the record
    assert_eq!(after.embedding, vec![0.0, 1.0, 0.0, 0.0]);

    // The semantic index follows the new embedding: the old query misses,
    // the new one hits with full score
    let mut opts = wide_open();
    opts.threshold = 0.9;
    assert!(engine.recall("alpha", "t1", None, opts.clone()).await.unwrap().is_empty());
    let hits = engine.recall("beta", "t1", None, opts).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.id, id);
}

#[tokio::test]
async fn forget_leaves_no_trace_on_the_sql_backend() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = sqlite_engine(&dir).await;

    let mut opts = RememberOptions::default();
    opts.tags = vec!["urgent".to_string()];
    let first = engine
        .remember("alpha", "t1", None, opts.clone())
        .await
        .unwrap();
    let second = engine.remember("beta", "t1", None, opts).await.unwrap();

    assert!(engine.forget_by_id(&first).await.unwrap());
    assert!(store.retrieve(&first).await.unwrap().is_none());

    let mut recall_opts = wide_open();
    recall_opts.tags = vec!["urgent".to_string()];
    let hits = engine.recall("beta", "t1", None, recall_opts).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.id, second);
}

#[tokio::test]
async fn update_of_missing_memory_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _store) = file_engine(&dir).await;

    let err = engine
        .update(
            "does-not-exist",
            engram_core::MemoryPatch {
                importance: Some(0.9),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
