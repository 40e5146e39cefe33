use std::sync::Arc;
use std::time::Duration;

use agentmem_core::{
    ArchiveCriteria, LongtermMemoryManager, MemoryError, MemoryFilters, MemoryMetadata,
    MemoryQuery,
};
use agentmem_state::{InMemoryRepository, MemoryRepository};
use serde_json::json;

fn manager() -> (LongtermMemoryManager, InMemoryRepository) {
    let repo = InMemoryRepository::new();
    let shared: Arc<dyn MemoryRepository> = Arc::new(repo.clone());
    (LongtermMemoryManager::new(shared), repo)
}

fn importance(level: u8) -> Option<MemoryMetadata> {
    Some(MemoryMetadata {
        importance: level,
        ..MemoryMetadata::default()
    })
}

/// Access bumps run in the background; poll until `key` reaches `count`.
async fn wait_for_access(repo: &InMemoryRepository, key: &str, count: u64) -> u64 {
    let mut seen = 0;
    for _ in 0..50 {
        seen = repo.get_longterm("a", key).await.unwrap().access_count;
        if seen >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    seen
}

// ---- remember / recall ----

#[tokio::test]
async fn remember_applies_defaults() {
    let (lt, _) = manager();
    let stored = lt
        .remember("a", "fact", json!("water is wet"), None, None)
        .await
        .unwrap();

    assert_eq!(stored.category, "general");
    assert_eq!(stored.metadata.importance, 5);
    assert_eq!(stored.metadata.confidence, 1.0);
    assert_eq!(stored.metadata.source, "manual");
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn recall_returns_entry_and_tracks_access() {
    let (lt, repo) = manager();
    lt.remember("a", "fact", json!(42), Some("science"), None)
        .await
        .unwrap();

    let got = lt.recall("a", "fact").await.unwrap();
    assert_eq!(got.value, json!(42));
    assert_eq!(got.category, "science");

    assert_eq!(wait_for_access(&repo, "fact", 1).await, 1);
}

#[tokio::test]
async fn forget_missing_is_not_found() {
    let (lt, _) = manager();
    lt.remember("a", "fact", json!(1), None, None).await.unwrap();
    lt.forget("a", "fact").await.unwrap();

    assert!(lt.forget("a", "fact").await.unwrap_err().is_not_found());
    assert!(lt.recall("a", "fact").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn revise_uses_optimistic_locking() {
    let (lt, _) = manager();
    lt.remember("a", "fact", json!("v1"), None, None).await.unwrap();

    let revised = lt.revise("a", "fact", json!("v2"), 1).await.unwrap();
    assert_eq!(revised.version, 2);

    let err = lt.revise("a", "fact", json!("v3"), 1).await.unwrap_err();
    assert!(matches!(err, MemoryError::VersionConflict { actual: 2, .. }));
}

// ---- search ----

#[tokio::test]
async fn search_orders_by_importance_then_recency() {
    let (lt, _) = manager();
    lt.remember("a", "low", json!("x"), None, importance(2)).await.unwrap();
    lt.remember("a", "high", json!("x"), None, importance(9)).await.unwrap();
    lt.remember("a", "mid", json!("x"), None, importance(5)).await.unwrap();

    let keys: Vec<String> = lt
        .search("a", &MemoryQuery::default())
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.key)
        .collect();
    assert_eq!(keys, vec!["high", "mid", "low"]);
}

#[tokio::test]
async fn search_combines_text_and_filters() {
    let (lt, _) = manager();
    lt.remember("a", "rust-tips", json!("Prefer iterators"), Some("coding"), importance(7))
        .await
        .unwrap();
    lt.remember("a", "go-tips", json!("Prefer channels"), Some("coding"), importance(3))
        .await
        .unwrap();
    lt.remember("a", "recipe", json!("prefer butter"), Some("cooking"), importance(8))
        .await
        .unwrap();

    let query = MemoryQuery::text("PREFER").with_filters(
        MemoryFilters::default()
            .with_category("coding")
            .with_min_importance(5),
    );
    let found = lt.search("a", &query).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, "rust-tips");

    let by_key = lt.search("a", &MemoryQuery::text("recipe")).await.unwrap();
    assert_eq!(by_key.len(), 1);
}

// ---- archive ----

#[tokio::test]
async fn archive_importance_ceiling_is_inclusive() {
    let (lt, _) = manager();
    lt.remember("a", "two", json!(2), None, importance(2)).await.unwrap();
    lt.remember("a", "five", json!(5), None, importance(5)).await.unwrap();
    lt.remember("a", "nine", json!(9), None, importance(9)).await.unwrap();

    let report = lt
        .archive(
            "a",
            &ArchiveCriteria {
                max_importance: Some(3),
                ..ArchiveCriteria::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(report.eligible, vec!["two"]);
    assert_eq!(report.archived, 1);
    assert!(lt.recall("a", "two").await.unwrap_err().is_not_found());
    assert!(lt.recall("a", "five").await.is_ok());
    assert!(lt.recall("a", "nine").await.is_ok());
}

#[tokio::test]
async fn archive_dry_run_is_idempotent() {
    let (lt, _) = manager();
    for (key, level) in [("a1", 1), ("a2", 2), ("a8", 8)] {
        lt.remember("a", key, json!(key), None, importance(level))
            .await
            .unwrap();
    }
    let criteria = ArchiveCriteria {
        max_importance: Some(4),
        dry_run: true,
        ..ArchiveCriteria::default()
    };

    let first = lt.archive("a", &criteria).await.unwrap();
    let second = lt.archive("a", &criteria).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.eligible, vec!["a1", "a2"]);
    assert_eq!(first.archived, 0);
    assert!(first.dry_run);
    assert_eq!(lt.list("a", &MemoryFilters::default()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn archive_access_ceiling_is_inclusive() {
    let (lt, repo) = manager();
    for key in ["cold", "warm", "hot"] {
        lt.remember("a", key, json!(key), None, None).await.unwrap();
    }
    lt.recall("a", "warm").await.unwrap();
    assert_eq!(wait_for_access(&repo, "warm", 1).await, 1);
    lt.recall("a", "hot").await.unwrap();
    assert_eq!(wait_for_access(&repo, "hot", 1).await, 1);
    lt.recall("a", "hot").await.unwrap();
    assert_eq!(wait_for_access(&repo, "hot", 2).await, 2);

    let report = lt
        .archive(
            "a",
            &ArchiveCriteria {
                max_access_count: Some(1),
                ..ArchiveCriteria::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(report.eligible, vec!["cold", "warm"]);
    assert_eq!(report.archived, 2);
    assert_eq!(lt.recall("a", "hot").await.unwrap().value, json!("hot"));
}

#[tokio::test]
async fn dry_run_predicts_real_archive() {
    let (lt, repo) = manager();
    for key in ["a1", "a2", "b"] {
        lt.remember("a", key, json!(1), None, importance(3)).await.unwrap();
    }
    lt.recall("a", "b").await.unwrap();
    assert_eq!(wait_for_access(&repo, "b", 1).await, 1);

    let mut criteria = ArchiveCriteria {
        max_access_count: Some(0),
        max_importance: Some(3),
        dry_run: true,
        ..ArchiveCriteria::default()
    };
    let preview = lt.archive("a", &criteria).await.unwrap();
    assert_eq!(preview.eligible, vec!["a1", "a2"]);
    assert_eq!(preview.archived, 0);

    criteria.dry_run = false;
    let report = lt.archive("a", &criteria).await.unwrap();
    assert_eq!(report.eligible, preview.eligible);
    assert_eq!(report.archived, preview.eligible.len());
    assert!(!report.dry_run);

    let left: Vec<String> = lt
        .list("a", &MemoryFilters::default())
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.key)
        .collect();
    assert_eq!(left, vec!["b"]);
}

#[tokio::test]
async fn archive_requires_every_bound() {
    let (lt, _) = manager();
    lt.remember("a", "old-trivia", json!(1), Some("trivia"), importance(1))
        .await
        .unwrap();
    lt.remember("a", "old-core", json!(1), Some("core"), importance(1))
        .await
        .unwrap();

    let report = lt
        .archive(
            "a",
            &ArchiveCriteria {
                max_importance: Some(2),
                categories: vec!["trivia".into()],
                ..ArchiveCriteria::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(report.eligible, vec!["old-trivia"]);

    // nothing was created a day ago
    let report = lt
        .archive(
            "a",
            &ArchiveCriteria {
                older_than: Some(Duration::from_secs(86_400)),
                ..ArchiveCriteria::default()
            },
        )
        .await
        .unwrap();
    assert!(report.eligible.is_empty());
}

#[tokio::test]
async fn archive_skips_failed_deletes() {
    let (lt, repo) = manager();
    lt.remember("a", "x", json!(1), None, importance(1)).await.unwrap();
    repo.fail_operation("delete_longterm");

    let report = lt
        .archive(
            "a",
            &ArchiveCriteria {
                max_importance: Some(1),
                ..ArchiveCriteria::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(report.eligible, vec!["x"]);
    assert_eq!(report.archived, 0);
}
