//! Whole-service scenarios, run against both the in-memory store and the
//! embedded SurrealDB engine.

use std::sync::Arc;
use std::time::Duration;

use agentmem_core::{
    LocalChange, MemoryConfig, MemoryError, MemoryService, SnapshotType, SyncState,
};
use agentmem_state::{InMemoryRepository, MemoryRepository, SurrealMemoryRepository};
use serde_json::json;

const HOUR: Duration = Duration::from_secs(3600);

async fn surreal() -> Arc<dyn MemoryRepository> {
    Arc::new(SurrealMemoryRepository::in_memory().await.unwrap())
}

fn in_memory() -> Arc<dyn MemoryRepository> {
    Arc::new(InMemoryRepository::new())
}

// ============================================================================
// Scenarios
// ============================================================================

async fn store_update_stale_update(repo: Arc<dyn MemoryRepository>) {
    let svc = MemoryService::new(repo);
    let wm = svc.working();

    let v1 = wm.store("agent-1", "task", json!({"step": 1}), HOUR).await.unwrap();
    assert_eq!(v1.version, 1);

    let v2 = wm
        .update("agent-1", "task", json!({"step": 2}), v1.version)
        .await
        .unwrap();
    assert_eq!(v2.version, 2);

    let err = wm
        .update("agent-1", "task", json!({"step": 99}), v1.version)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MemoryError::VersionConflict {
            expected: 1,
            actual: 2,
            ..
        }
    ));

    let current = wm.retrieve("agent-1", "task").await.unwrap();
    assert_eq!(current.value, json!({"step": 2}));
    assert_eq!(current.version, 2);

    let m = svc.metrics().snapshot();
    assert_eq!(m.stores, 1);
    assert_eq!(m.updates, 1);
    assert_eq!(m.version_conflicts, 1);
}

async fn snapshot_restore_round_trip(repo: Arc<dyn MemoryRepository>) {
    let svc = MemoryService::new(repo);
    svc.working()
        .store("agent-1", "context", json!({"files": ["a.rs", "b.rs"]}), HOUR)
        .await
        .unwrap();
    svc.longterm()
        .remember("agent-1", "style", json!("terse"), Some("preferences"), None)
        .await
        .unwrap();

    let snap = svc
        .snapshots()
        .create("agent-1", SnapshotType::PreShutdown, "deploy")
        .await
        .unwrap();
    let loaded = svc.snapshots().get(&snap.id).await.unwrap();
    assert!(loaded.verify_checksum());

    svc.working().clear("agent-1").await.unwrap();
    let report = svc.snapshots().restore("agent-1", &snap.id).await.unwrap();
    assert_eq!(report.restored, 1);
    assert_eq!(
        svc.working().retrieve("agent-1", "context").await.unwrap().value,
        json!({"files": ["a.rs", "b.rs"]})
    );
}

async fn sync_and_housekeeping(repo: Arc<dyn MemoryRepository>) {
    let svc = MemoryService::new(repo);
    let coordinator = svc.coordinator(&MemoryConfig {
        instance_id: Some("node-a".into()),
        ..MemoryConfig::default()
    });

    let entry = svc
        .working()
        .store("agent-1", "note", json!("hello"), HOUR)
        .await
        .unwrap();
    coordinator
        .record_local_change("agent-1", LocalChange::from(&entry))
        .await
        .unwrap();
    svc.working()
        .store("agent-1", "blip", json!(0), Duration::from_millis(20))
        .await
        .unwrap();

    let result = coordinator.sync_agent("agent-1").await.unwrap();
    assert!(result.success);
    assert_eq!(result.items_synced, 2);
    assert_eq!(
        coordinator.status("agent-1").await.unwrap().status,
        SyncState::Synced
    );

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(svc.cleanup_expired().await.unwrap(), 1);

    let stats = svc.memory_stats("agent-1").await.unwrap();
    assert_eq!(stats.working_memory_count, 1);
    assert!(stats.last_sync_at.is_some());
    assert_eq!(svc.metrics().snapshot().syncs, 1);
}

// ============================================================================
// Runners
// ============================================================================

#[tokio::test]
async fn in_memory_store_update_stale_update() {
    store_update_stale_update(in_memory()).await;
}

#[tokio::test]
async fn surreal_store_update_stale_update() {
    store_update_stale_update(surreal().await).await;
}

#[tokio::test]
async fn in_memory_snapshot_restore_round_trip() {
    snapshot_restore_round_trip(in_memory()).await;
}

#[tokio::test]
async fn surreal_snapshot_restore_round_trip() {
    snapshot_restore_round_trip(surreal().await).await;
}

#[tokio::test]
async fn in_memory_sync_and_housekeeping() {
    sync_and_housekeeping(in_memory()).await;
}

#[tokio::test]
async fn surreal_sync_and_housekeeping() {
    sync_and_housekeeping(surreal().await).await;
}
