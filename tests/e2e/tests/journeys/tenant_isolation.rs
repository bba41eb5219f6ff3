//! Journey: tenants never see each other's memories

use engram_core::{RecallOptions, RememberOptions};
use engram_e2e_tests::harness::file_engine;

fn wide_open() -> RecallOptions {
    RecallOptions {
        threshold: 0.0,
        time_decay: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn identical_content_stays_within_its_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _store) = file_engine(&dir).await;

    let t1_id = engine
        .remember("alpha", "t1", None, RememberOptions::default())
        .await
        .unwrap();
    let t2_id = engine
        .remember("alpha", "t2", None, RememberOptions::default())
        .await
        .unwrap();

    let t2_hits = engine.recall("alpha", "t2", None, wide_open()).await.unwrap();
    assert_eq!(t2_hits.len(), 1);
    assert_eq!(t2_hits[0].memory.id, t2_id);

    let t1_hits = engine.recall("alpha", "t1", None, wide_open()).await.unwrap();
    assert_eq!(t1_hits.len(), 1);
    assert_eq!(t1_hits[0].memory.id, t1_id);
}

#[tokio::test]
async fn unknown_tenant_sees_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _store) = file_engine(&dir).await;

    engine
        .remember("alpha", "t1", None, RememberOptions::default())
        .await
        .unwrap();

    let hits = engine.recall("alpha", "t3", None, wide_open()).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn agent_scope_narrows_within_a_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _store) = file_engine(&dir).await;

    let scoped = engine
        .remember("alpha", "t1", Some("agent-a"), RememberOptions::default())
        .await
        .unwrap();
    engine
        .remember("alpha", "t1", Some("agent-b"), RememberOptions::default())
        .await
        .unwrap();
    engine
        .remember("alpha", "t1", None, RememberOptions::default())
        .await
        .unwrap();

    let scoped_hits = engine
        .recall("alpha", "t1", Some("agent-a"), wide_open())
        .await
        .unwrap();
    assert_eq!(scoped_hits.len(), 1);
    assert_eq!(scoped_hits[0].memory.id, scoped);

    // Without an agent the whole tenant is in scope
    let tenant_hits = engine.recall("alpha", "t1", None, wide_open()).await.unwrap();
    assert_eq!(tenant_hits.len(), 3);
}

#[tokio::test]
async fn forget_tenant_wipes_exactly_one_tenant() {
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
    engine
        .remember("alpha", "t2", None, RememberOptions::default())
        .await
        .unwrap();

    let removed = engine.forget_tenant("t1").await.unwrap();
    assert_eq!(removed, 2);

    assert!(engine.recall("alpha", "t1", None, wide_open()).await.unwrap().is_empty());
    assert_eq!(engine.recall("alpha", "t2", None, wide_open()).await.unwrap().len(), 1);
}
