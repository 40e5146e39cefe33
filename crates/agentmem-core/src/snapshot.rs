//! Checksummed point-in-time captures of agent memory.
//!
//! A snapshot holds the full working memory plus a summary of long-term
//! memory (per-category counts). Restoring replaces working memory only;
//! long-term memory is never touched by a restore.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use agentmem_state::{
    MemoryFilters, MemoryRepository, SnapshotFilters, SnapshotType, StateSnapshot, WorkingMemory,
};

use crate::error::{require, MemoryError, Result};
use crate::obs;

const ENTITY: &str = "snapshot";

/// Trigger recorded on snapshots taken through the manager.
pub const SERVICE_TRIGGER: &str = "service";
/// Trigger recorded on the safety snapshot taken before a restore.
pub const RESTORE_TRIGGER: &str = "restore";

/// Typed shape of `StateSnapshot::state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    pub working_memory_keys: Vec<String>,
    pub working_memory_count: u64,
    #[serde(default)]
    pub working_memory: Vec<WorkingMemory>,
    pub longterm_memory_categories: BTreeMap<String, u64>,
    pub longterm_memory_count: u64,
    pub snapshot_time: DateTime<Utc>,
}

/// Outcome of a restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub snapshot_id: String,
    /// Pre-update snapshot of the state that was replaced
    pub safety_snapshot_id: String,
    pub restored: usize,
    /// Entries in the snapshot whose TTL had already lapsed
    pub skipped_expired: usize,
}

#[derive(Clone)]
pub struct SnapshotManager {
    repo: Arc<dyn MemoryRepository>,
}

impl SnapshotManager {
    pub fn new(repo: Arc<dyn MemoryRepository>) -> Self {
        Self { repo }
    }

    /// Capture the agent's current state. An empty `reason` is recorded as
    /// "manual snapshot".
    #[instrument(skip(self), fields(agent_id = %agent_id, snapshot_type = %snapshot_type))]
    pub async fn create(
        &self,
        agent_id: &str,
        snapshot_type: SnapshotType,
        reason: &str,
    ) -> Result<StateSnapshot> {
        require("agent_id", agent_id)?;
        let reason = if reason.trim().is_empty() {
            "manual snapshot"
        } else {
            reason
        };
        self.capture(agent_id, snapshot_type, SERVICE_TRIGGER, reason)
            .await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, snapshot_id: &str) -> Result<StateSnapshot> {
        require("snapshot_id", snapshot_id)?;
        self.repo
            .get_snapshot(snapshot_id)
            .await
            .map_err(|e| MemoryError::storage("get", ENTITY, snapshot_id, e))
    }

    /// Newest first.
    #[instrument(skip(self, filters), fields(agent_id = %agent_id))]
    pub async fn list(
        &self,
        agent_id: &str,
        filters: &SnapshotFilters,
    ) -> Result<Vec<StateSnapshot>> {
        require("agent_id", agent_id)?;
        self.repo
            .list_snapshots(agent_id, filters)
            .await
            .map_err(|e| MemoryError::storage("list", ENTITY, agent_id, e))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, snapshot_id: &str) -> Result<()> {
        require("snapshot_id", snapshot_id)?;
        let existed = self
            .repo
            .delete_snapshot(snapshot_id)
            .await
            .map_err(|e| MemoryError::storage("delete", ENTITY, snapshot_id, e))?;
        if !existed {
            return Err(MemoryError::NotFound {
                entity: ENTITY,
                key: snapshot_id.to_string(),
            });
        }
        Ok(())
    }

    /// Replace the agent's working memory with the snapshot's.
    ///
    /// Checks ownership, then the checksum, before anything is written. The
    /// current state is saved as a `pre-update` snapshot first. Restored
    /// entries start a fresh version lineage at 1 and keep their original
    /// expiry; entries already past it are skipped.
    #[instrument(skip(self), fields(agent_id = %agent_id, snapshot_id = %snapshot_id))]
    pub async fn restore(&self, agent_id: &str, snapshot_id: &str) -> Result<RestoreReport> {
        require("agent_id", agent_id)?;
        require("snapshot_id", snapshot_id)?;

        let snapshot = self.get(snapshot_id).await?;
        if snapshot.agent_id != agent_id {
            return Err(MemoryError::Ownership {
                snapshot_id: snapshot_id.to_string(),
                agent_id: agent_id.to_string(),
            });
        }

        let actual = StateSnapshot::checksum_of(&snapshot.state)?;
        if actual != snapshot.checksum {
            return Err(MemoryError::Integrity {
                snapshot_id: snapshot_id.to_string(),
                expected: snapshot.checksum.to_string(),
                actual: actual.to_string(),
            });
        }
        let state: SnapshotState = serde_json::from_value(snapshot.state)?;

        let safety = self
            .capture(
                agent_id,
                SnapshotType::PreUpdate,
                RESTORE_TRIGGER,
                &format!("before restoring snapshot {snapshot_id}"),
            )
            .await?;

        let cleared = self
            .repo
            .clear_working(agent_id)
            .await
            .map_err(|e| MemoryError::storage("restore", "working_memory", agent_id, e))?;

        let now = Utc::now();
        let mut report = RestoreReport {
            snapshot_id: snapshot_id.to_string(),
            safety_snapshot_id: safety.id,
            restored: 0,
            skipped_expired: 0,
        };
        for mut entry in state.working_memory {
            if entry.is_expired_at(now) {
                report.skipped_expired += 1;
                continue;
            }
            entry.agent_id = agent_id.to_string();
            entry.version = 1;
            entry.updated_at = now;
            let key = entry.key.clone();
            self.repo
                .store_working(entry)
                .await
                .map_err(|e| MemoryError::storage("restore", "working_memory", key, e))?;
            report.restored += 1;
        }

        if report.skipped_expired > 0 {
            warn!(skipped = report.skipped_expired, "expired entries not restored");
        }
        info!(
            cleared,
            restored = report.restored,
            safety_snapshot_id = %report.safety_snapshot_id,
            "snapshot restored"
        );
        Ok(report)
    }

    async fn capture(
        &self,
        agent_id: &str,
        snapshot_type: SnapshotType,
        trigger: &str,
        reason: &str,
    ) -> Result<StateSnapshot> {
        let now = Utc::now();
        let working: Vec<WorkingMemory> = self
            .repo
            .list_working(agent_id, &MemoryFilters::default())
            .await
            .map_err(|e| MemoryError::storage("snapshot", "working_memory", agent_id, e))?
            .into_iter()
            .filter(|m| !m.is_expired_at(now))
            .collect();
        let longterm = self
            .repo
            .list_longterm(agent_id, &MemoryFilters::default())
            .await
            .map_err(|e| MemoryError::storage("snapshot", "longterm_memory", agent_id, e))?;

        let mut categories = BTreeMap::new();
        for memory in &longterm {
            *categories.entry(memory.category.clone()).or_insert(0u64) += 1;
        }

        let state = SnapshotState {
            working_memory_keys: working.iter().map(|m| m.key.clone()).collect(),
            working_memory_count: working.len() as u64,
            working_memory: working,
            longterm_memory_categories: categories,
            longterm_memory_count: longterm.len() as u64,
            snapshot_time: now,
        };

        let snapshot = StateSnapshot::new(
            agent_id,
            snapshot_type,
            serde_json::to_value(&state)?,
            trigger,
            reason,
        )?;
        let created = self
            .repo
            .create_snapshot(snapshot)
            .await
            .map_err(|e| MemoryError::storage("create", ENTITY, agent_id, e))?;

        obs::emit_snapshot_created(
            agent_id,
            &created.id,
            created.snapshot_type,
            created.metadata.size_bytes,
        );
        Ok(created)
    }
}
