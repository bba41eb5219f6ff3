//! Journey: deposit a memory and get it back, exactly once and intact

use engram_core::{MemoryType, RecallOptions, RememberOptions, StorageAdapter};
use engram_e2e_tests::harness::{file_engine, DIMENSION};

fn exact_opts(threshold: f64) -> RecallOptions {
    RecallOptions {
        threshold,
        time_decay: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn single_memory_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _store) = file_engine(&dir).await;

    let id = engine
        .remember("alpha", "t1", None, RememberOptions::default())
        .await
        .unwrap();

    // The matching query scores ~1.0
    let hits = engine.recall("alpha", "t1", None, exact_opts(0.5)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.id, id);
    assert!((hits[0].score - 1.0).abs() < 1e-6);

    // An orthogonal query normalizes to 0.5 and falls below a 0.6 bar
    let hits = engine.recall("beta", "t1", None, exact_opts(0.6)).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn stored_record_is_intact_at_the_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    let mut opts = RememberOptions::default();
    opts.tags = vec!["greek".to_string(), "first".to_string()];
    opts.context
        .insert("source".to_string(), serde_json::json!("unit"));
    let id = engine.remember("alpha", "t1", None, opts).await.unwrap();

    let record = store.retrieve(&id).await.unwrap().unwrap();
    assert_eq!(record.content, "alpha");
    assert_eq!(record.tenant_id, "t1");
    assert_eq!(record.tags, vec!["greek", "first"]);
    assert_eq!(record.embedding.len(), DIMENSION);
    assert_eq!(record.embedding, vec![1.0, 0.0, 0.0, 0.0]);
    assert_eq!(record.context.get("source").unwrap(), "unit");
}

#[tokio::test]
async fn repeated_remember_yields_distinct_independent_ids() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    let first = engine
        .remember("alpha", "t1", None, RememberOptions::default())
        .await
        .unwrap();
    let second = engine
        .remember("alpha", "t1", None, RememberOptions::default())
        .await
        .unwrap();

    assert_ne!(first, second);
    assert!(store.retrieve(&first).await.unwrap().is_some());
    assert!(store.retrieve(&second).await.unwrap().is_some());

    let hits = engine.recall("alpha", "t1", None, exact_opts(0.9)).await.unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn caller_supplied_type_and_importance_win() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    let mut opts = RememberOptions::default();
    opts.memory_type = Some(MemoryType::Preference);
    opts.importance = Some(0.95);
    let id = engine
        .remember("the deadline is friday", "t1", None, opts)
        .await
        .unwrap();

    let record = store.retrieve(&id).await.unwrap().unwrap();
    // The classifier would have said Task; the caller overrode it
    assert_eq!(record.memory_type, MemoryType::Preference);
    assert_eq!(record.importance, 0.95);
}

#[tokio::test]
async fn derived_type_and_importance_when_absent() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    let id = engine
        .remember(
            "the password for prod is hunter2, deadline tomorrow",
            "t1",
            None,
            RememberOptions::default(),
        )
        .await
        .unwrap();

    let record = store.retrieve(&id).await.unwrap().unwrap();
    assert_eq!(record.memory_type, MemoryType::Task);
    assert!(record.importance >= 0.9);
}

#[tokio::test]
async fn scores_sort_non_increasing_and_meet_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _store) = file_engine(&dir).await;

    for content in ["alpha", "beta", "gamma", "something else entirely"] {
        engine
            .remember(content, "t1", None, RememberOptions::default())
            .await
            .unwrap();
    }

    let opts = exact_opts(0.4);
    let threshold = opts.threshold;
    let hits = engine.recall("alpha", "t1", None, opts).await.unwrap();
    assert!(!hits.is_empty());
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for hit in &hits {
        assert!(hit.score >= threshold);
    }
}
