use std::sync::Arc;
use std::time::Duration;

use agentmem_core::{LocalChange, MemoryConfig, MemoryError, SyncCoordinator};
use agentmem_state::{InMemoryRepository, MemoryRepository, SyncState};
use serde_json::json;

fn coordinator() -> (SyncCoordinator, InMemoryRepository) {
    let repo = InMemoryRepository::new();
    let shared: Arc<dyn MemoryRepository> = Arc::new(repo.clone());
    let config = MemoryConfig {
        instance_id: Some("node-a".into()),
        ..MemoryConfig::default()
    };
    (SyncCoordinator::new(shared, &config), repo)
}

// ---- periodic loop ----

#[tokio::test]
async fn stop_without_start_is_not_running() {
    let (coord, _) = coordinator();
    let err = coord.stop_periodic_sync().await.unwrap_err();
    assert!(matches!(err, MemoryError::NotRunning));
}

#[tokio::test]
async fn double_start_is_already_running() {
    let (coord, _) = coordinator();
    coord
        .start_periodic_sync("a", Duration::from_secs(60))
        .await
        .unwrap();
    assert!(coord.is_running().await);

    let err = coord
        .start_periodic_sync("b", Duration::from_secs(60))
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::AlreadyRunning { ref agent_id } if agent_id == "a"));

    coord.stop_periodic_sync().await.unwrap();
    assert!(!coord.is_running().await);
    assert!(matches!(
        coord.stop_periodic_sync().await.unwrap_err(),
        MemoryError::NotRunning
    ));

    // restart after a clean stop
    coord
        .start_periodic_sync("a", Duration::from_secs(60))
        .await
        .unwrap();
    coord.stop_periodic_sync().await.unwrap();
}

#[tokio::test]
async fn zero_interval_is_rejected() {
    let (coord, _) = coordinator();
    let err = coord
        .start_periodic_sync("a", Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Config(_)));
    assert!(!coord.is_running().await);
}

#[tokio::test(start_paused = true)]
async fn periodic_loop_syncs_every_interval() {
    let (coord, _) = coordinator();
    coord
        .start_periodic_sync("a", Duration::from_secs(10))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(35)).await;
    coord.stop_periodic_sync().await.unwrap();

    let status = coord.status("a").await.unwrap();
    assert!(status.sync_version >= 3, "got {}", status.sync_version);
    assert_eq!(status.status, SyncState::Synced);
    assert!(status.last_sync_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn periodic_loop_survives_failed_passes() {
    let (coord, repo) = coordinator();
    repo.fail_operation("upsert_sync_status");
    coord
        .start_periodic_sync("a", Duration::from_secs(10))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(coord.is_running().await);

    repo.clear_failures();
    tokio::time::sleep(Duration::from_secs(10)).await;
    coord.stop_periodic_sync().await.unwrap();

    assert!(coord.status("a").await.unwrap().sync_version >= 1);
}

// ---- single pass ----

#[tokio::test]
async fn sync_pass_counts_items_and_bumps_version() {
    let (coord, repo) = coordinator();
    repo.store_working(agentmem_state::WorkingMemory::new(
        "a",
        "w",
        json!(1),
        Duration::from_secs(60),
    ))
    .await
    .unwrap();
    repo.store_longterm(agentmem_state::LongtermMemory::new(
        "a",
        "l",
        json!(2),
        "general",
        Default::default(),
    ))
    .await
    .unwrap();

    let first = coord.sync_agent("a").await.unwrap();
    assert!(first.success);
    assert_eq!(first.items_synced, 2);
    assert_eq!(first.agent_id, "a");

    coord.sync_agent("a").await.unwrap();
    let status = coord.status("a").await.unwrap();
    assert_eq!(status.sync_version, 2);
    assert_eq!(status.instance_id, "node-a");
    assert_eq!(coord.instance_id(), "node-a");
}

#[tokio::test]
async fn store_failure_marks_status_error() {
    let (coord, repo) = coordinator();
    repo.fail_operation("list_working");

    let result = coord.sync_agent("a").await.unwrap();
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);

    let status = coord.status("a").await.unwrap();
    assert_eq!(status.status, SyncState::Error);
    assert_eq!(status.sync_version, 1);

    repo.clear_failures();
    coord.sync_agent("a").await.unwrap();
    assert_eq!(coord.status("a").await.unwrap().status, SyncState::Synced);
}

#[tokio::test]
async fn status_write_failure_is_returned() {
    let (coord, repo) = coordinator();
    repo.fail_operation("upsert_sync_status");

    let err = coord.sync_agent("a").await.unwrap_err();
    assert!(matches!(err, MemoryError::Repository { operation: "save", .. }));
}

#[tokio::test]
async fn pending_changes_are_counted_per_key() {
    let (coord, _) = coordinator();
    coord
        .record_local_change("a", LocalChange::working("x", json!(1), 1))
        .await
        .unwrap();
    coord
        .record_local_change("a", LocalChange::working("y", json!(1), 1))
        .await
        .unwrap();
    coord
        .record_local_change("a", LocalChange::working("x", json!(2), 2))
        .await
        .unwrap();
    assert_eq!(coord.status("a").await.unwrap().pending_changes, 2);

    coord.sync_agent("a").await.unwrap();
    assert_eq!(coord.status("a").await.unwrap().pending_changes, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pending_count_matches_queue_under_concurrent_syncs() {
    let (coord, _) = coordinator();
    let mut tasks = Vec::new();
    for i in 0..40 {
        let coord = coord.clone();
        tasks.push(tokio::spawn(async move {
            if i % 8 == 0 {
                coord.sync_agent("a").await.map(|_| ())
            } else {
                coord
                    .record_local_change("a", LocalChange::working(format!("k{i}"), json!(i), 1))
                    .await
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let recorded = coord.status("a").await.unwrap().pending_changes;
    let queued = coord.force_pull("a").await.unwrap();
    assert_eq!(recorded, queued as u64);
}

#[tokio::test]
async fn blank_agent_is_rejected() {
    let (coord, _) = coordinator();
    assert!(matches!(
        coord.sync_agent(" ").await.unwrap_err(),
        MemoryError::Validation { field: "agent_id" }
    ));
}
