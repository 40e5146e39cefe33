//! Row definitions for the agentmem SurrealDB tables
//!
//! Tables:
//! - working_memory: TTL-bounded entries, id `[agent_id, key]`
//! - longterm_memory: durable entries, id `[agent_id, key]`
//! - snapshots: immutable state captures, id `snapshot_id`
//! - sync_status: one row per `[agent_id, instance_id]`
//!
//! Timestamps that SurrealQL compares (`expires_at`, `created_at`) are stored
//! as native datetimes; conversions to the `model` types happen here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{
    LongtermMemory, MemoryConflict, MemoryMetadata, Metadata, SnapshotMetadata, SnapshotType,
    StateSnapshot, SyncState, SyncStatus, WorkingMemory,
};
use crate::storage_traits::ContentDigest;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde::Serialize::serialize(&SurrealDatetime::from(*date), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(DateTime::from(SurrealDatetime::deserialize(deserializer)?))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde::Serialize::serialize(&date.map(SurrealDatetime::from), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

// ---------------------------------------------------------------------------
// working_memory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemoryRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    pub memory_id: String,
    pub agent_id: String,
    pub key: String,
    pub payload: Value,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub accessed_at: DateTime<Utc>,
    pub access_count: u64,
    #[serde(with = "surreal_datetime")]
    pub expires_at: DateTime<Utc>,
    pub version: u64,
}

impl From<WorkingMemory> for WorkingMemoryRow {
    fn from(m: WorkingMemory) -> Self {
        Self {
            id: None,
            memory_id: m.id,
            agent_id: m.agent_id,
            key: m.key,
            payload: m.value,
            metadata: m.metadata,
            created_at: m.created_at,
            updated_at: m.updated_at,
            accessed_at: m.accessed_at,
            access_count: m.access_count,
            expires_at: m.expires_at,
            version: m.version,
        }
    }
}

impl From<WorkingMemoryRow> for WorkingMemory {
    fn from(r: WorkingMemoryRow) -> Self {
        Self {
            id: r.memory_id,
            agent_id: r.agent_id,
            key: r.key,
            value: r.payload,
            metadata: r.metadata,
            created_at: r.created_at,
            updated_at: r.updated_at,
            accessed_at: r.accessed_at,
            access_count: r.access_count,
            expires_at: r.expires_at,
            version: r.version,
        }
    }
}

// ---------------------------------------------------------------------------
// longterm_memory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongtermMemoryRow {
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    pub memory_id: String,
    pub agent_id: String,
    pub category: String,
    pub key: String,
    pub payload: Value,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    pub metadata: MemoryMetadata,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub version: u64,
}

impl From<LongtermMemory> for LongtermMemoryRow {
    fn from(m: LongtermMemory) -> Self {
        Self {
            id: None,
            memory_id: m.id,
            agent_id: m.agent_id,
            category: m.category,
            key: m.key,
            payload: m.value,
            embedding: m.embedding,
            metadata: m.metadata,
            created_at: m.created_at,
            updated_at: m.updated_at,
            last_accessed: m.last_accessed,
            access_count: m.access_count,
            version: m.version,
        }
    }
}

impl From<LongtermMemoryRow> for LongtermMemory {
    fn from(r: LongtermMemoryRow) -> Self {
        Self {
            id: r.memory_id,
            agent_id: r.agent_id,
            category: r.category,
            key: r.key,
            value: r.payload,
            embedding: r.embedding,
            metadata: r.metadata,
            created_at: r.created_at,
            updated_at: r.updated_at,
            last_accessed: r.last_accessed,
            access_count: r.access_count,
            version: r.version,
        }
    }
}

// ---------------------------------------------------------------------------
// snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRow {
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    pub snapshot_id: String,
    pub agent_id: String,
    pub snapshot_type: SnapshotType,
    pub state: Value,
    pub checksum: ContentDigest,
    pub metadata: SnapshotMetadata,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub expires_at: DateTime<Utc>,
    pub version: u64,
}

impl From<StateSnapshot> for SnapshotRow {
    fn from(s: StateSnapshot) -> Self {
        Self {
            id: None,
            snapshot_id: s.id,
            agent_id: s.agent_id,
            snapshot_type: s.snapshot_type,
            state: s.state,
            checksum: s.checksum,
            metadata: s.metadata,
            created_at: s.created_at,
            expires_at: s.expires_at,
            version: s.version,
        }
    }
}

impl From<SnapshotRow> for StateSnapshot {
    fn from(r: SnapshotRow) -> Self {
        Self {
            id: r.snapshot_id,
            agent_id: r.agent_id,
            snapshot_type: r.snapshot_type,
            state: r.state,
            checksum: r.checksum,
            metadata: r.metadata,
            created_at: r.created_at,
            expires_at: r.expires_at,
            version: r.version,
        }
    }
}

// ---------------------------------------------------------------------------
// sync_status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatusRow {
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    pub agent_id: String,
    pub instance_id: String,
    #[serde(default, with = "surreal_datetime_opt")]
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_version: u64,
    pub pending_changes: u64,
    #[serde(default)]
    pub conflicts: Vec<MemoryConflict>,
    pub status: SyncState,
    #[serde(default)]
    pub metadata: Metadata,
}

impl From<&SyncStatus> for SyncStatusRow {
    fn from(s: &SyncStatus) -> Self {
        Self {
            id: None,
            agent_id: s.agent_id.clone(),
            instance_id: s.instance_id.clone(),
            last_sync_at: s.last_sync_at,
            sync_version: s.sync_version,
            pending_changes: s.pending_changes,
            conflicts: s.conflicts.clone(),
            status: s.status,
            metadata: s.metadata.clone(),
        }
    }
}

impl From<SyncStatusRow> for SyncStatus {
    fn from(r: SyncStatusRow) -> Self {
        Self {
            agent_id: r.agent_id,
            instance_id: r.instance_id,
            last_sync_at: r.last_sync_at,
            sync_version: r.sync_version,
            pending_changes: r.pending_changes,
            conflicts: r.conflicts,
            status: r.status,
            metadata: r.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn working_row_round_trips_model() {
        let mem = WorkingMemory::new("a", "k", json!({"x": 1}), std::time::Duration::from_secs(5));
        let row = WorkingMemoryRow::from(mem.clone());
        assert_eq!(row.payload, json!({"x": 1}));
        assert_eq!(WorkingMemory::from(row), mem);
    }

    #[test]
    fn sync_row_serializes_state_lowercase() {
        let status = SyncStatus::new("a", "i");
        let json = serde_json::to_value(SyncStatusRow::from(&status)).unwrap();
        assert_eq!(json["status"], "synced");
        assert!(json.get("id").is_none());
    }
}
