//! SurrealDB-backed `MemoryRepository`
//!
//! Uses the row types from `schema` for persistence, converting to/from the
//! `model` types at the boundary. Record ids are derived from the natural key
//! (`type::thing('working_memory', [agent_id, key])`), so create-or-replace is
//! a single `UPSERT` and the versioned update is a single conditional `UPDATE`.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::filters::{MemoryFilters, MemoryQuery, SnapshotFilters};
use crate::handle::{self, CloudConfig};
use crate::model::{LongtermMemory, MemoryStats, StateSnapshot, SyncStatus, WorkingMemory};
use crate::schema::{LongtermMemoryRow, SnapshotRow, SyncStatusRow, WorkingMemoryRow};
use crate::storage_traits::{MemoryRepository, StorageResult};

/// SurrealDB-backed implementation of [`MemoryRepository`].
#[derive(Clone)]
pub struct SurrealMemoryRepository {
    db: Surreal<Any>,
}

impl SurrealMemoryRepository {
    /// Wrap an existing connection. The schema must already be initialized.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = handle::connect_memory().await?;
        info!("SurrealMemoryRepository connected (in-memory)");
        Ok(Self { db })
    }

    /// Open (or create) an on-disk `surrealkv` store.
    pub async fn local(path: impl AsRef<Path>) -> crate::Result<Self> {
        Ok(Self {
            db: handle::connect_local(path).await?,
        })
    }

    pub async fn cloud(config: &CloudConfig) -> crate::Result<Self> {
        Ok(Self {
            db: handle::connect_cloud(config).await?,
        })
    }

    /// Create from environment variables; see [`handle::connect_from_env`].
    pub async fn from_env() -> crate::Result<Self> {
        Ok(Self {
            db: handle::connect_from_env().await?,
        })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_working(
        &self,
        agent_id: &str,
        key: &str,
    ) -> StorageResult<Option<WorkingMemoryRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('working_memory', [$agent_id, $key])")
            .bind(("agent_id", agent_id.to_string()))
            .bind(("key", key.to_string()))
            .await?;
        let rows: Vec<WorkingMemoryRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_longterm(
        &self,
        agent_id: &str,
        key: &str,
    ) -> StorageResult<Option<LongtermMemoryRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('longterm_memory', [$agent_id, $key])")
            .bind(("agent_id", agent_id.to_string()))
            .bind(("key", key.to_string()))
            .await?;
        let rows: Vec<LongtermMemoryRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn all_working(&self, agent_id: &str) -> StorageResult<Vec<WorkingMemory>> {
        let mut res = self
            .db
            .query("SELECT * FROM working_memory WHERE agent_id = $agent_id")
            .bind(("agent_id", agent_id.to_string()))
            .await?;
        let rows: Vec<WorkingMemoryRow> = res.take(0)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn all_longterm(&self, agent_id: &str) -> StorageResult<Vec<LongtermMemory>> {
        let mut res = self
            .db
            .query("SELECT * FROM longterm_memory WHERE agent_id = $agent_id")
            .bind(("agent_id", agent_id.to_string()))
            .await?;
        let rows: Vec<LongtermMemoryRow> = res.take(0)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn all_snapshots(&self, agent_id: &str) -> StorageResult<Vec<StateSnapshot>> {
        let mut res = self
            .db
            .query("SELECT * FROM snapshots WHERE agent_id = $agent_id ORDER BY created_at DESC")
            .bind(("agent_id", agent_id.to_string()))
            .await?;
        let rows: Vec<SnapshotRow> = res.take(0)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

fn conflict_or_missing(
    entity: &'static str,
    key: &str,
    expected: u64,
    current: Option<u64>,
) -> StorageError {
    match current {
        Some(actual) => StorageError::VersionConflict {
            entity,
            key: key.to_string(),
            expected,
            actual,
        },
        None => StorageError::NotFound {
            entity,
            key: key.to_string(),
        },
    }
}

#[async_trait]
impl MemoryRepository for SurrealMemoryRepository {
    async fn store_working(&self, mut memory: WorkingMemory) -> StorageResult<WorkingMemory> {
        memory.version = 1;
        let mut res = self
            .db
            .query("UPSERT type::thing('working_memory', [$agent_id, $key]) CONTENT $row RETURN AFTER")
            .bind(("agent_id", memory.agent_id.clone()))
            .bind(("key", memory.key.clone()))
            .bind(("row", WorkingMemoryRow::from(memory.clone())))
            .await?;
        let _stored: Vec<WorkingMemoryRow> = res.take(0)?;

        debug!(agent_id = %memory.agent_id, key = %memory.key, "working memory stored");
        Ok(memory)
    }

    async fn get_working(&self, agent_id: &str, key: &str) -> StorageResult<WorkingMemory> {
        self.fetch_working(agent_id, key)
            .await?
            .map(Into::into)
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
        let mut res = self
            .db
            .query(
                "UPDATE type::thing('working_memory', [$agent_id, $key]) \
                 SET payload = $payload, version = version + 1, updated_at = time::now() \
                 WHERE version = $expected RETURN AFTER",
            )
            .bind(("agent_id", agent_id.to_string()))
            .bind(("key", key.to_string()))
            .bind(("payload", value))
            .bind(("expected", expected_version))
            .await?;
        let rows: Vec<WorkingMemoryRow> = res.take(0)?;

        match rows.into_iter().next() {
            Some(row) => Ok(row.into()),
            None => {
                let current = self.fetch_working(agent_id, key).await?.map(|r| r.version);
                Err(conflict_or_missing(
                    "working_memory",
                    key,
                    expected_version,
                    current,
                ))
            }
        }
    }

    async fn delete_working(&self, agent_id: &str, key: &str) -> StorageResult<bool> {
        let mut res = self
            .db
            .query("DELETE type::thing('working_memory', [$agent_id, $key]) RETURN BEFORE")
            .bind(("agent_id", agent_id.to_string()))
            .bind(("key", key.to_string()))
            .await?;
        let rows: Vec<WorkingMemoryRow> = res.take(0)?;
        Ok(!rows.is_empty())
    }

    async fn delete_working_if_expired(
        &self,
        agent_id: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut res = self
            .db
            .query(
                "DELETE type::thing('working_memory', [$agent_id, $key]) \
                 WHERE expires_at < $now RETURN BEFORE",
            )
            .bind(("agent_id", agent_id.to_string()))
            .bind(("key", key.to_string()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;
        let rows: Vec<WorkingMemoryRow> = res.take(0)?;
        Ok(!rows.is_empty())
    }

    async fn list_working(
        &self,
        agent_id: &str,
        filters: &MemoryFilters,
    ) -> StorageResult<Vec<WorkingMemory>> {
        Ok(filters.apply_working(self.all_working(agent_id).await?))
    }

    async fn clear_working(&self, agent_id: &str) -> StorageResult<u64> {
        let mut res = self
            .db
            .query("DELETE working_memory WHERE agent_id = $agent_id RETURN BEFORE")
            .bind(("agent_id", agent_id.to_string()))
            .await?;
        let rows: Vec<WorkingMemoryRow> = res.take(0)?;
        Ok(rows.len() as u64)
    }

    async fn record_working_access(&self, agent_id: &str, key: &str) -> StorageResult<()> {
        self.db
            .query(
                "UPDATE type::thing('working_memory', [$agent_id, $key]) \
                 SET access_count += 1, accessed_at = time::now()",
            )
            .bind(("agent_id", agent_id.to_string()))
            .bind(("key", key.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    async fn store_longterm(&self, mut memory: LongtermMemory) -> StorageResult<LongtermMemory> {
        memory.version = 1;
        let mut res = self
            .db
            .query("UPSERT type::thing('longterm_memory', [$agent_id, $key]) CONTENT $row RETURN AFTER")
            .bind(("agent_id", memory.agent_id.clone()))
            .bind(("key", memory.key.clone()))
            .bind(("row", LongtermMemoryRow::from(memory.clone())))
            .await?;
        let _stored: Vec<LongtermMemoryRow> = res.take(0)?;

        debug!(agent_id = %memory.agent_id, key = %memory.key, "long-term memory stored");
        Ok(memory)
    }

    async fn get_longterm(&self, agent_id: &str, key: &str) -> StorageResult<LongtermMemory> {
        self.fetch_longterm(agent_id, key)
            .await?
            .map(Into::into)
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
        let mut res = self
            .db
            .query(
                "UPDATE type::thing('longterm_memory', [$agent_id, $key]) \
                 SET payload = $payload, version = version + 1, updated_at = time::now() \
                 WHERE version = $expected RETURN AFTER",
            )
            .bind(("agent_id", agent_id.to_string()))
            .bind(("key", key.to_string()))
            .bind(("payload", value))
            .bind(("expected", expected_version))
            .await?;
        let rows: Vec<LongtermMemoryRow> = res.take(0)?;

        match rows.into_iter().next() {
            Some(row) => Ok(row.into()),
            None => {
                let current = self.fetch_longterm(agent_id, key).await?.map(|r| r.version);
                Err(conflict_or_missing(
                    "longterm_memory",
                    key,
                    expected_version,
                    current,
                ))
            }
        }
    }

    async fn delete_longterm(&self, agent_id: &str, key: &str) -> StorageResult<bool> {
        let mut res = self
            .db
            .query("DELETE type::thing('longterm_memory', [$agent_id, $key]) RETURN BEFORE")
            .bind(("agent_id", agent_id.to_string()))
            .bind(("key", key.to_string()))
            .await?;
        let rows: Vec<LongtermMemoryRow> = res.take(0)?;
        Ok(!rows.is_empty())
    }

    async fn list_longterm(
        &self,
        agent_id: &str,
        filters: &MemoryFilters,
    ) -> StorageResult<Vec<LongtermMemory>> {
        Ok(filters.apply_longterm(self.all_longterm(agent_id).await?))
    }

    async fn search_longterm(
        &self,
        agent_id: &str,
        query: &MemoryQuery,
    ) -> StorageResult<Vec<LongtermMemory>> {
        Ok(query.apply(self.all_longterm(agent_id).await?))
    }

    async fn record_longterm_access(&self, agent_id: &str, key: &str) -> StorageResult<()> {
        self.db
            .query(
                "UPDATE type::thing('longterm_memory', [$agent_id, $key]) \
                 SET access_count += 1, last_accessed = time::now()",
            )
            .bind(("agent_id", agent_id.to_string()))
            .bind(("key", key.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    async fn create_snapshot(&self, snapshot: StateSnapshot) -> StorageResult<StateSnapshot> {
        let mut res = self
            .db
            .query("CREATE type::thing('snapshots', $snapshot_id) CONTENT $row")
            .bind(("snapshot_id", snapshot.id.clone()))
            .bind(("row", SnapshotRow::from(snapshot.clone())))
            .await?;
        let _created: Vec<SnapshotRow> = res.take(0)?;

        info!(
            agent_id = %snapshot.agent_id,
            snapshot_id = %snapshot.id,
            snapshot_type = %snapshot.snapshot_type,
            size_bytes = snapshot.metadata.size_bytes,
            "snapshot persisted"
        );
        Ok(snapshot)
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> StorageResult<StateSnapshot> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('snapshots', $snapshot_id)")
            .bind(("snapshot_id", snapshot_id.to_string()))
            .await?;
        let rows: Vec<SnapshotRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(Into::into)
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
        Ok(filters.apply(self.all_snapshots(agent_id).await?))
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> StorageResult<bool> {
        let mut res = self
            .db
            .query("DELETE type::thing('snapshots', $snapshot_id) RETURN BEFORE")
            .bind(("snapshot_id", snapshot_id.to_string()))
            .await?;
        let rows: Vec<SnapshotRow> = res.take(0)?;
        Ok(!rows.is_empty())
    }

    async fn get_sync_status(
        &self,
        agent_id: &str,
        instance_id: &str,
    ) -> StorageResult<SyncStatus> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('sync_status', [$agent_id, $instance_id])")
            .bind(("agent_id", agent_id.to_string()))
            .bind(("instance_id", instance_id.to_string()))
            .await?;
        let rows: Vec<SyncStatusRow> = res.take(0)?;
        Ok(rows
            .into_iter()
            .next()
            .map(Into::into)
            .unwrap_or_else(|| SyncStatus::new(agent_id, instance_id)))
    }

    async fn upsert_sync_status(&self, status: &SyncStatus) -> StorageResult<()> {
        self.db
            .query("UPSERT type::thing('sync_status', [$agent_id, $instance_id]) CONTENT $row")
            .bind(("agent_id", status.agent_id.clone()))
            .bind(("instance_id", status.instance_id.clone()))
            .bind(("row", SyncStatusRow::from(status)))
            .await?
            .check()?;
        Ok(())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let mut res = self
            .db
            .query(
                "DELETE working_memory WHERE expires_at < $now RETURN BEFORE; \
                 DELETE snapshots WHERE expires_at < $now RETURN BEFORE;",
            )
            .bind(("now", SurrealDatetime::from(now)))
            .await?;
        let working: Vec<WorkingMemoryRow> = res.take(0)?;
        let snapshots: Vec<SnapshotRow> = res.take(1)?;

        let removed = (working.len() + snapshots.len()) as u64;
        if removed > 0 {
            info!(
                working = working.len(),
                snapshots = snapshots.len(),
                "expired records removed"
            );
        }
        Ok(removed)
    }

    async fn memory_stats(&self, agent_id: &str) -> StorageResult<MemoryStats> {
        let working = self.all_working(agent_id).await?;
        let longterm = self.all_longterm(agent_id).await?;
        let snapshots = self.all_snapshots(agent_id).await?;

        let mut res = self
            .db
            .query("SELECT * FROM sync_status WHERE agent_id = $agent_id")
            .bind(("agent_id", agent_id.to_string()))
            .await?;
        let statuses: Vec<SyncStatusRow> = res.take(0)?;

        let working_bytes: u64 = working.iter().map(WorkingMemory::approx_size_bytes).sum();
        let longterm_bytes: u64 = longterm.iter().map(LongtermMemory::approx_size_bytes).sum();

        Ok(MemoryStats {
            agent_id: agent_id.to_string(),
            working_memory_count: working.len() as u64,
            working_memory_size_bytes: working_bytes,
            longterm_memory_count: longterm.len() as u64,
            longterm_memory_size_bytes: longterm_bytes,
            snapshot_count: snapshots.len() as u64,
            total_size_bytes: working_bytes + longterm_bytes,
            last_sync_at: statuses.iter().filter_map(|s| s.last_sync_at).max(),
            last_snapshot_at: snapshots.iter().map(|s| s.created_at).max(),
        })
    }
}
