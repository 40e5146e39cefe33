//! In-memory `MemoryRepository` (tests and the daemon's default store)
//!
//! Entries live in sharded `DashMap`s keyed by `(agent_id, key)`, so
//! compare-and-swap happens under a single shard lock and unrelated keys never
//! contend on a global mutex. Failure injection lets tests drive the error
//! paths of the domain layer without a real backend.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde_json::Value;

use crate::error::StorageError;
use crate::filters::{MemoryFilters, MemoryQuery, SnapshotFilters};
use crate::model::{LongtermMemory, MemoryStats, StateSnapshot, SyncStatus, WorkingMemory};
use crate::storage_traits::*;

type AgentKey = (String, String);

fn agent_key(agent_id: &str, key: &str) -> AgentKey {
    (agent_id.to_string(), key.to_string())
}

/// In-memory repository backed by `DashMap`s.
///
/// Cloning shares the underlying maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    working: Arc<DashMap<AgentKey, WorkingMemory>>,
    longterm: Arc<DashMap<AgentKey, LongtermMemory>>,
    snapshots: Arc<DashMap<String, StateSnapshot>>,
    sync: Arc<DashMap<AgentKey, SyncStatus>>,
    failing: Arc<DashSet<String>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `operation` (the trait method name, e.g.
    /// `"upsert_sync_status"`) fail with a backend error until cleared.
    pub fn fail_operation(&self, operation: &str) {
        self.failing.insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.clear();
    }

    /// Number of working entries across all agents, expired ones included.
    pub fn working_len(&self) -> usize {
        self.working.len()
    }

    fn check(&self, operation: &str) -> StorageResult<()> {
        if self.failing.contains(operation) {
            return Err(StorageError::Backend(format!(
                "injected failure in {operation}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MemoryRepository for InMemoryRepository {
    async fn store_working(&self, mut memory: WorkingMemory) -> StorageResult<WorkingMemory> {
        self.check("store_working")?;
        memory.version = 1;
        self.working
            .insert(agent_key(&memory.agent_id, &memory.key), memory.clone());
        Ok(memory)
    }

    async fn get_working(&self, agent_id: &str, key: &str) -> StorageResult<WorkingMemory> {
        self.check("get_working")?;
        self.working
            .get(&agent_key(agent_id, key))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound {
                entity: "working_memory",
                key: key.to_string(),
            })
    }

    async fn update_working(
        &self,
        agent_id: &str,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> StorageResult<WorkingMemory> {
        self.check("update_working")?;
        let mut entry = self
            .working
            .get_mut(&agent_key(agent_id, key))
            .ok_or_else(|| StorageError::NotFound {
                entity: "working_memory",
                key: key.to_string(),
            })?;
        if entry.version != expected_version {
            return Err(StorageError::VersionConflict {
                entity: "working_memory",
                key: key.to_string(),
                expected: expected_version,
                actual: entry.version,
            });
        }
        entry.value = value;
        entry.version += 1;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn delete_working(&self, agent_id: &str, key: &str) -> StorageResult<bool> {
        self.check("delete_working")?;
        Ok(self.working.remove(&agent_key(agent_id, key)).is_some())
    }

    async fn delete_working_if_expired(
        &self,
        agent_id: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        self.check("delete_working_if_expired")?;
        Ok(self
            .working
            .remove_if(&agent_key(agent_id, key), |_, mem| mem.is_expired_at(now))
            .is_some())
    }

    async fn list_working(
        &self,
        agent_id: &str,
        filters: &MemoryFilters,
    ) -> StorageResult<Vec<WorkingMemory>> {
        self.check("list_working")?;
        let entries = self
            .working
            .iter()
            .filter(|e| e.key().0 == agent_id)
            .map(|e| e.value().clone())
            .collect();
        Ok(filters.apply_working(entries))
    }

    async fn clear_working(&self, agent_id: &str) -> StorageResult<u64> {
        self.check("clear_working")?;
        let mut removed = 0u64;
        self.working.retain(|(agent, _), _| {
            let keep = agent != agent_id;
            removed += u64::from(!keep);
            keep
        });
        Ok(removed)
    }

    async fn record_working_access(&self, agent_id: &str, key: &str) -> StorageResult<()> {
        self.check("record_working_access")?;
        if let Some(mut entry) = self.working.get_mut(&agent_key(agent_id, key)) {
            entry.access_count += 1;
            entry.accessed_at = Utc::now();
        }
        Ok(())
    }

    async fn store_longterm(&self, mut memory: LongtermMemory) -> StorageResult<LongtermMemory> {
        self.check("store_longterm")?;
        memory.version = 1;
        self.longterm
            .insert(agent_key(&memory.agent_id, &memory.key), memory.clone());
        Ok(memory)
    }

    async fn get_longterm(&self, agent_id: &str, key: &str) -> StorageResult<LongtermMemory> {
        self.check("get_longterm")?;
        self.longterm
            .get(&agent_key(agent_id, key))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound {
                entity: "longterm_memory",
                key: key.to_string(),
            })
    }

    async fn update_longterm(
        &self,
        agent_id: &str,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> StorageResult<LongtermMemory> {
        self.check("update_longterm")?;
        let mut entry = self
            .longterm
            .get_mut(&agent_key(agent_id, key))
            .ok_or_else(|| StorageError::NotFound {
                entity: "longterm_memory",
                key: key.to_string(),
            })?;
        if entry.version != expected_version {
            return Err(StorageError::VersionConflict {
                entity: "longterm_memory",
                key: key.to_string(),
                expected: expected_version,
                actual: entry.version,
            });
        }
        entry.value = value;
        entry.version += 1;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn delete_longterm(&self, agent_id: &str, key: &str) -> StorageResult<bool> {
        self.check("delete_longterm")?;
        Ok(self.longterm.remove(&agent_key(agent_id, key)).is_some())
    }

    async fn list_longterm(
        &self,
        agent_id: &str,
        filters: &MemoryFilters,
    ) -> StorageResult<Vec<LongtermMemory>> {
        self.check("list_longterm")?;
        let entries = self
            .longterm
            .iter()
            .filter(|e| e.key().0 == agent_id)
            .map(|e| e.value().clone())
            .collect();
        Ok(filters.apply_longterm(entries))
    }

    async fn search_longterm(
        &self,
        agent_id: &str,
        query: &MemoryQuery,
    ) -> StorageResult<Vec<LongtermMemory>> {
        self.check("search_longterm")?;
        let entries = self
            .longterm
            .iter()
            .filter(|e| e.key().0 == agent_id)
            .map(|e| e.value().clone())
            .collect();
        Ok(query.apply(entries))
    }

    async fn record_longterm_access(&self, agent_id: &str, key: &str) -> StorageResult<()> {
        self.check("record_longterm_access")?;
        if let Some(mut entry) = self.longterm.get_mut(&agent_key(agent_id, key)) {
            entry.access_count += 1;
            entry.last_accessed = Utc::now();
        }
        Ok(())
    }

    async fn create_snapshot(&self, snapshot: StateSnapshot) -> StorageResult<StateSnapshot> {
        self.check("create_snapshot")?;
        self.snapshots.insert(snapshot.id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> StorageResult<StateSnapshot> {
        self.check("get_snapshot")?;
        self.snapshots
            .get(snapshot_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound {
                entity: "snapshot",
                key: snapshot_id.to_string(),
            })
    }

    async fn list_snapshots(
        &self,
        agent_id: &str,
        filters: &SnapshotFilters,
    ) -> StorageResult<Vec<StateSnapshot>> {
        self.check("list_snapshots")?;
        let snapshots = self
            .snapshots
            .iter()
            .filter(|e| e.agent_id == agent_id)
            .map(|e| e.value().clone())
            .collect();
        Ok(filters.apply(snapshots))
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> StorageResult<bool> {
        self.check("delete_snapshot")?;
        Ok(self.snapshots.remove(snapshot_id).is_some())
    }

    async fn get_sync_status(
        &self,
        agent_id: &str,
        instance_id: &str,
    ) -> StorageResult<SyncStatus> {
        self.check("get_sync_status")?;
        Ok(self
            .sync
            .get(&agent_key(agent_id, instance_id))
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| SyncStatus::new(agent_id, instance_id)))
    }

    async fn upsert_sync_status(&self, status: &SyncStatus) -> StorageResult<()> {
        self.check("upsert_sync_status")?;
        self.sync.insert(
            agent_key(&status.agent_id, &status.instance_id),
            status.clone(),
        );
        Ok(())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        self.check("cleanup_expired")?;
        let mut removed = 0u64;
        self.working.retain(|_, mem| {
            let keep = mem.expires_at >= now;
            removed += u64::from(!keep);
            keep
        });
        self.snapshots.retain(|_, snap| {
            let keep = snap.expires_at >= now;
            removed += u64::from(!keep);
            keep
        });
        Ok(removed)
    }

    async fn memory_stats(&self, agent_id: &str) -> StorageResult<MemoryStats> {
        self.check("memory_stats")?;
        let mut stats = MemoryStats {
            agent_id: agent_id.to_string(),
            ..Default::default()
        };
        for entry in self.working.iter().filter(|e| e.key().0 == agent_id) {
            stats.working_memory_count += 1;
            stats.working_memory_size_bytes += entry.approx_size_bytes();
        }
        for entry in self.longterm.iter().filter(|e| e.key().0 == agent_id) {
            stats.longterm_memory_count += 1;
            stats.longterm_memory_size_bytes += entry.approx_size_bytes();
        }
        for snap in self.snapshots.iter().filter(|s| s.agent_id == agent_id) {
            stats.snapshot_count += 1;
            stats.last_snapshot_at = stats.last_snapshot_at.max(Some(snap.created_at));
        }
        stats.last_sync_at = self
            .sync
            .iter()
            .filter(|e| e.key().0 == agent_id)
            .filter_map(|e| e.last_sync_at)
            .max();
        stats.total_size_bytes = stats.working_memory_size_bytes + stats.longterm_memory_size_bytes;
        Ok(stats)
    }
}
