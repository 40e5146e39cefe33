//! Entity definitions for agent memory.
//!
//! - `WorkingMemory`: short-lived, TTL-bounded key/value entries
//! - `LongtermMemory`: durable, categorized knowledge with ranking metadata
//! - `StateSnapshot`: immutable, checksummed point-in-time capture
//! - `SyncStatus` / `MemoryConflict`: per-instance synchronization bookkeeping
//!
//! Every mutable entry carries a `version` starting at 1. Stores bump it by
//! exactly one per successful update and reject writes carrying a stale one.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::storage_traits::ContentDigest;

/// Free-form metadata map attached to working memory.
pub type Metadata = BTreeMap<String, Value>;

/// Category assigned to long-term memories stored without one.
pub const DEFAULT_CATEGORY: &str = "general";

/// Add a std duration to a timestamp, saturating instead of overflowing.
pub fn expiry_after(now: DateTime<Utc>, ttl: std::time::Duration) -> DateTime<Utc> {
    Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Which memory tier an entry (or a conflict) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Working,
    Longterm,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Working => "working",
            MemoryType::Longterm => "longterm",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Working memory
// ---------------------------------------------------------------------------

/// Short-term memory for active task context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingMemory {
    pub id: String,
    pub agent_id: String,
    pub key: String,
    pub value: Value,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub expires_at: DateTime<Utc>,
    pub version: u64,
}

impl WorkingMemory {
    /// Create a fresh entry at version 1 expiring `ttl` from now.
    pub fn new(
        agent_id: impl Into<String>,
        key: impl Into<String>,
        value: Value,
        ttl: std::time::Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            key: key.into(),
            value,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
            accessed_at: now,
            access_count: 0,
            expires_at: expiry_after(now, ttl),
            version: 1,
        }
    }

    /// Attach a metadata map.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// True when `now` is strictly past `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Tags stored under `metadata["tags"]`, ignoring non-string items.
    pub fn tags(&self) -> Vec<&str> {
        self.metadata
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Approximate payload footprint (serialized value + metadata).
    pub fn approx_size_bytes(&self) -> u64 {
        json_len(&self.value) + serde_json::to_vec(&self.metadata).map_or(0, |b| b.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Long-term memory
// ---------------------------------------------------------------------------

/// Ranking and provenance metadata for long-term memories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// Where the memory came from
    pub source: String,
    /// 1 (trivial) ..= 10 (critical)
    pub importance: u8,
    /// 0.0 ..= 1.0
    pub confidence: f64,
    pub tags: Vec<String>,
    /// Keys of related memories
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl Default for MemoryMetadata {
    fn default() -> Self {
        Self {
            source: "manual".to_string(),
            importance: 5,
            confidence: 1.0,
            tags: Vec::new(),
            references: Vec::new(),
        }
    }
}

/// Persistent knowledge and experiences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongtermMemory {
    pub id: String,
    pub agent_id: String,
    pub category: String,
    pub key: String,
    pub value: Value,
    /// Reserved for semantic retrieval; not consulted by filter search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub metadata: MemoryMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub version: u64,
}

impl LongtermMemory {
    pub fn new(
        agent_id: impl Into<String>,
        key: impl Into<String>,
        value: Value,
        category: impl Into<String>,
        metadata: MemoryMetadata,
    ) -> Self {
        let now = Utc::now();
        let category = category.into();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            category: if category.is_empty() {
                DEFAULT_CATEGORY.to_string()
            } else {
                category
            },
            key: key.into(),
            value,
            embedding: None,
            metadata,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            access_count: 0,
            version: 1,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn approx_size_bytes(&self) -> u64 {
        json_len(&self.value)
    }
}

// ---------------------------------------------------------------------------
// State snapshots
// ---------------------------------------------------------------------------

/// Why a snapshot was taken; drives its retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotType {
    Periodic,
    Manual,
    PreUpdate,
    PreShutdown,
}

impl SnapshotType {
    /// Default retention: periodic 7d, manual 30d, pre-update/pre-shutdown 90d.
    pub fn retention(&self) -> Duration {
        match self {
            SnapshotType::Periodic => Duration::days(7),
            SnapshotType::Manual => Duration::days(30),
            SnapshotType::PreUpdate | SnapshotType::PreShutdown => Duration::days(90),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotType::Periodic => "periodic",
            SnapshotType::Manual => "manual",
            SnapshotType::PreUpdate => "pre-update",
            SnapshotType::PreShutdown => "pre-shutdown",
        }
    }
}

impl fmt::Display for SnapshotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "periodic" => Ok(SnapshotType::Periodic),
            "manual" => Ok(SnapshotType::Manual),
            "pre-update" => Ok(SnapshotType::PreUpdate),
            "pre-shutdown" => Ok(SnapshotType::PreShutdown),
            other => Err(format!("unknown snapshot type: {other}")),
        }
    }
}

/// Snapshot-specific metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// What caused the snapshot (e.g. "service", "sync", "restore")
    pub trigger: String,
    /// Human-readable context
    pub reason: String,
    pub size_bytes: u64,
    pub compressed: bool,
}

/// Point-in-time capture of agent state.
///
/// Immutable once created. `checksum` is the SHA-256 of the serialized
/// `state` taken at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub id: String,
    pub agent_id: String,
    pub snapshot_type: SnapshotType,
    pub state: Value,
    pub checksum: ContentDigest,
    pub metadata: SnapshotMetadata,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub version: u64,
}

impl StateSnapshot {
    /// Seal `state` into a snapshot: checksum, size and expiry are derived here.
    pub fn new(
        agent_id: impl Into<String>,
        snapshot_type: SnapshotType,
        state: Value,
        trigger: impl Into<String>,
        reason: impl Into<String>,
    ) -> serde_json::Result<Self> {
        let bytes = canonical_json(&state)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            snapshot_type,
            checksum: ContentDigest::from_bytes(&bytes),
            metadata: SnapshotMetadata {
                trigger: trigger.into(),
                reason: reason.into(),
                size_bytes: bytes.len() as u64,
                compressed: false,
            },
            state,
            created_at: now,
            expires_at: now
                .checked_add_signed(snapshot_type.retention())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            version: 1,
        })
    }

    /// Digest of a state payload as it would be stored.
    pub fn checksum_of(state: &Value) -> serde_json::Result<ContentDigest> {
        Ok(ContentDigest::from_bytes(&canonical_json(state)?))
    }

    /// Re-hash the stored state and compare it with `checksum`.
    pub fn verify_checksum(&self) -> bool {
        Self::checksum_of(&self.state)
            .map(|digest| digest == self.checksum)
            .unwrap_or(false)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Synchronization
// ---------------------------------------------------------------------------

/// Synchronization state of one agent instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Synced,
    Syncing,
    Conflict,
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Synced => "synced",
            SyncState::Syncing => "syncing",
            SyncState::Conflict => "conflict",
            SyncState::Error => "error",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A divergence between this instance's copy of a key and the shared store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConflict {
    pub key: String,
    pub memory_type: MemoryType,
    pub local_version: u64,
    pub remote_version: u64,
    pub local_value: Value,
    pub remote_value: Value,
    pub local_time: DateTime<Utc>,
    pub remote_time: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
}

impl MemoryConflict {
    /// True when both conflicts concern the same key in the same tier.
    pub fn same_target(&self, other: &MemoryConflict) -> bool {
        self.key == other.key && self.memory_type == other.memory_type
    }
}

/// Per-(agent, instance) synchronization record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub agent_id: String,
    pub instance_id: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_version: u64,
    pub pending_changes: u64,
    pub conflicts: Vec<MemoryConflict>,
    pub status: SyncState,
    pub metadata: Metadata,
}

impl SyncStatus {
    /// The record handed out for an instance that has never synced.
    pub fn new(agent_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            instance_id: instance_id.into(),
            last_sync_at: None,
            sync_version: 0,
            pending_changes: 0,
            conflicts: Vec::new(),
            status: SyncState::Synced,
            metadata: Metadata::new(),
        }
    }
}

/// Memory usage summary for one agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub agent_id: String,
    pub working_memory_count: u64,
    pub working_memory_size_bytes: u64,
    pub longterm_memory_count: u64,
    pub longterm_memory_size_bytes: u64,
    pub snapshot_count: u64,
    pub total_size_bytes: u64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_snapshot_at: Option<DateTime<Utc>>,
}

/// Serialize with object keys sorted at every level, so the bytes do not
/// depend on map ordering (e.g. after a store round-trip or with
/// `serde_json/preserve_order` enabled).
pub fn canonical_json(value: &Value) -> serde_json::Result<Vec<u8>> {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                Value::Object(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k.clone(), sorted(v)))
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_vec(&sorted(value))
}

fn json_len(value: &Value) -> u64 {
    serde_json::to_vec(value).map_or(0, |b| b.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_type_retention_table() {
        assert_eq!(SnapshotType::Periodic.retention(), Duration::days(7));
        assert_eq!(SnapshotType::Manual.retention(), Duration::days(30));
        assert_eq!(SnapshotType::PreUpdate.retention(), Duration::days(90));
        assert_eq!(SnapshotType::PreShutdown.retention(), Duration::days(90));
    }

    #[test]
    fn snapshot_type_serializes_kebab_case() {
        let json = serde_json::to_string(&SnapshotType::PreShutdown).unwrap();
        assert_eq!(json, "\"pre-shutdown\"");
        assert_eq!(
            "pre-update".parse::<SnapshotType>().unwrap(),
            SnapshotType::PreUpdate
        );
        assert!("weekly".parse::<SnapshotType>().is_err());
    }

    #[test]
    fn snapshot_checksum_matches_state() {
        let snap = StateSnapshot::new(
            "agent-1",
            SnapshotType::Manual,
            json!({"working_memory_keys": ["a", "b"], "longterm_memory_count": 3}),
            "service",
            "test",
        )
        .unwrap();

        assert!(snap.verify_checksum());
        assert_eq!(
            snap.metadata.size_bytes,
            serde_json::to_vec(&snap.state).unwrap().len() as u64
        );

        // key order does not matter
        let reordered: Value =
            serde_json::from_str(r#"{"longterm_memory_count":3,"working_memory_keys":["a","b"]}"#)
                .unwrap();
        assert_eq!(StateSnapshot::checksum_of(&reordered).unwrap(), snap.checksum);

        let mut tampered = snap.clone();
        tampered.state = json!({"working_memory_keys": []});
        assert!(!tampered.verify_checksum());
    }

    #[test]
    fn working_memory_expiry_is_strict() {
        let mem = WorkingMemory::new("a", "k", json!(1), std::time::Duration::from_secs(60));
        assert_eq!(mem.version, 1);
        assert!(!mem.is_expired_at(mem.expires_at));
        assert!(mem.is_expired_at(mem.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn working_memory_tags_from_metadata() {
        let mut meta = Metadata::new();
        meta.insert("tags".into(), json!(["plan", 7, "urgent"]));
        let mem = WorkingMemory::new("a", "k", json!(null), std::time::Duration::from_secs(1))
            .with_metadata(meta);
        assert_eq!(mem.tags(), vec!["plan", "urgent"]);
    }

    #[test]
    fn huge_ttl_saturates() {
        let now = Utc::now();
        assert_eq!(
            expiry_after(now, std::time::Duration::from_secs(u64::MAX)),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn longterm_empty_category_defaults_to_general() {
        let mem = LongtermMemory::new("a", "k", json!("v"), "", MemoryMetadata::default());
        assert_eq!(mem.category, DEFAULT_CATEGORY);
        assert_eq!(mem.metadata.importance, 5);
        assert_eq!(mem.metadata.confidence, 1.0);
    }
}
