//! Journey: importance heuristics and time-decayed ranking

use chrono::{Duration, Utc};
use engram_core::{RecallOptions, RememberOptions, StorageAdapter};
use engram_e2e_tests::harness::{
    file_engine, seeded_record, uninitialized_file_engine,
};

#[tokio::test]
async fn importance_heuristics_through_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    let critical = engine
        .remember(
            "The password for prod is X, deadline tomorrow",
            "t1",
            None,
            RememberOptions::default(),
        )
        .await
        .unwrap();
    let chatter = engine
        .remember(
            "the weather is nice and everything is fine",
            "t1",
            None,
            RememberOptions::default(),
        )
        .await
        .unwrap();

    let critical = store.retrieve(&critical).await.unwrap().unwrap();
    let chatter = store.retrieve(&chatter).await.unwrap().unwrap();
    assert!(critical.importance >= 0.9);
    assert!(chatter.importance <= 0.4);
}

#[tokio::test]
async fn fresh_memory_outranks_stale_twin() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();

    // Two memories with identical embeddings, 60 days apart
    let (engine, store) = uninitialized_file_engine(&dir);
    store.initialize().await.unwrap();
    store
        .store(&seeded_record(
            "fresh",
            "t1",
            "alpha",
            vec![1.0, 0.0, 0.0, 0.0],
            now,
        ))
        .await
        .unwrap();
    store
        .store(&seeded_record(
            "stale",
            "t1",
            "alpha",
            vec![1.0, 0.0, 0.0, 0.0],
            now - Duration::days(60),
        ))
        .await
        .unwrap();
    engine.initialize().await.unwrap();

    let opts = RecallOptions {
        threshold: 0.0,
        time_decay: true,
        ..Default::default()
    };
    let hits = engine.recall("alpha", "t1", None, opts).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].memory.id, "fresh");
    assert_eq!(hits[1].memory.id, "stale");

    // Fresh: similarity 1.0, no decay. Stale: two half-lives of decay.
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    let expected_stale = (1.0_f64 * (-2.0_f64).exp()).max(0.1);
    assert!((hits[1].score - expected_stale).abs() < 1e-3);
}

#[tokio::test]
async fn year_old_memory_is_floored_not_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();

    let (engine, store) = uninitialized_file_engine(&dir);
    store.initialize().await.unwrap();
    store
        .store(&seeded_record(
            "ancient",
            "t1",
            "alpha",
            vec![1.0, 0.0, 0.0, 0.0],
            now - Duration::days(365),
        ))
        .await
        .unwrap();
    engine.initialize().await.unwrap();

    let opts = RecallOptions {
        threshold: 0.05,
        time_decay: true,
        ..Default::default()
    };
    let hits = engine.recall("alpha", "t1", None, opts).await.unwrap();
    assert_eq!(hits.len(), 1);
    // Decay to effectively zero, clamped at the floor
    assert!((hits[0].score - 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn threshold_one_keeps_only_exact_matches() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _store) = file_engine(&dir).await;

    engine
        .remember("alpha", "t1", None, RememberOptions::default())
        .await
        .unwrap();
    engine
        .remember("beta", "t1", None, RememberOptions::default())
        .await
        .unwrap();

    let opts = RecallOptions {
        threshold: 1.0,
        time_decay: false,
        ..Default::default()
    };
    let hits = engine.recall("alpha", "t1", None, opts).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.content, "alpha");
}

#[tokio::test]
async fn decay_reference_follows_last_access() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();

    let (engine, store) = uninitialized_file_engine(&dir);
    store.initialize().await.unwrap();
    store
        .store(&seeded_record(
            "old",
            "t1",
            "alpha",
            vec![1.0, 0.0, 0.0, 0.0],
            now - Duration::days(90),
        ))
        .await
        .unwrap();
    engine.initialize().await.unwrap();

    let opts = RecallOptions {
        threshold: 0.0,
        time_decay: true,
        ..Default::default()
    };

    // First recall sees 90 days of decay and floors out
    let first = engine.recall("alpha", "t1", None, opts.clone()).await.unwrap();
    assert!((first[0].score - 0.1).abs() < 1e-6);

    // The surfacing bumped last_accessed_at, so a second recall decays
    // from the access, not from creation
    let second = engine.recall("alpha", "t1", None, opts).await.unwrap();
    assert!(second[0].score > 0.9);
    assert!(second[0].memory.last_accessed_at.is_some());
    assert_eq!(second[0].memory.access_count, 2);
}
