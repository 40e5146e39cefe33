//! Storage trait definitions for agent memory
//!
//! `MemoryRepository` is the single persistence capability the domain layer
//! depends on. It covers:
//! - working memory (create-or-replace, versioned update, TTL-aware cleanup)
//! - long-term memory (same write path plus filter search)
//! - immutable state snapshots
//! - per-instance sync status
//!
//! All methods are async and backend-agnostic. An in-memory fake lives in the
//! `fakes` module; `SurrealMemoryRepository` is the durable implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::error::StorageError;
use crate::filters::{MemoryFilters, MemoryQuery, SnapshotFilters};
use crate::model::{LongtermMemory, MemoryStats, StateSnapshot, SyncStatus, WorkingMemory};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        ContentDigest(hex::encode(Sha256::digest(data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MemoryRepository
// ---------------------------------------------------------------------------

/// Persistence capability for agent memory.
///
/// Guarantees:
/// - `(agent_id, key)` is unique per tier.
/// - `store_*` creates or replaces; the stored entry starts at version 1.
/// - `update_*` succeeds only when the stored version equals
///   `expected_version`, and then bumps it by exactly one. The check and the
///   write are a single atomic step per key.
/// - Snapshots are immutable once created.
/// - `get_sync_status` never fails for a missing record; it returns
///   `SyncStatus::new` instead.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    // -- working memory ----------------------------------------------------

    /// Create or replace an entry. Returns the stored entry.
    async fn store_working(&self, memory: WorkingMemory) -> StorageResult<WorkingMemory>;

    /// Fetch an entry regardless of expiry; callers decide what expired means.
    async fn get_working(&self, agent_id: &str, key: &str) -> StorageResult<WorkingMemory>;

    /// Compare-and-swap the value. `VersionConflict` on a stale version.
    async fn update_working(
        &self,
        agent_id: &str,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> StorageResult<WorkingMemory>;

    /// Returns whether an entry existed.
    async fn delete_working(&self, agent_id: &str, key: &str) -> StorageResult<bool>;

    /// Delete the entry only if it is still expired at `now`, checked
    /// atomically with the removal. A concurrent replace survives.
    async fn delete_working_if_expired(
        &self,
        agent_id: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<bool>;

    async fn list_working(
        &self,
        agent_id: &str,
        filters: &MemoryFilters,
    ) -> StorageResult<Vec<WorkingMemory>>;

    /// Delete every working entry of an agent. Returns the count removed.
    async fn clear_working(&self, agent_id: &str) -> StorageResult<u64>;

    /// Bump `access_count` and `accessed_at`. Does not change `version`.
    async fn record_working_access(&self, agent_id: &str, key: &str) -> StorageResult<()>;

    // -- long-term memory --------------------------------------------------

    async fn store_longterm(&self, memory: LongtermMemory) -> StorageResult<LongtermMemory>;

    async fn get_longterm(&self, agent_id: &str, key: &str) -> StorageResult<LongtermMemory>;

    async fn update_longterm(
        &self,
        agent_id: &str,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> StorageResult<LongtermMemory>;

    async fn delete_longterm(&self, agent_id: &str, key: &str) -> StorageResult<bool>;

    async fn list_longterm(
        &self,
        agent_id: &str,
        filters: &MemoryFilters,
    ) -> StorageResult<Vec<LongtermMemory>>;

    async fn search_longterm(
        &self,
        agent_id: &str,
        query: &MemoryQuery,
    ) -> StorageResult<Vec<LongtermMemory>>;

    /// Bump `access_count` and `last_accessed`. Does not change `version`.
    async fn record_longterm_access(&self, agent_id: &str, key: &str) -> StorageResult<()>;

    // -- snapshots ---------------------------------------------------------

    async fn create_snapshot(&self, snapshot: StateSnapshot) -> StorageResult<StateSnapshot>;

    async fn get_snapshot(&self, snapshot_id: &str) -> StorageResult<StateSnapshot>;

    /// Newest first.
    async fn list_snapshots(
        &self,
        agent_id: &str,
        filters: &SnapshotFilters,
    ) -> StorageResult<Vec<StateSnapshot>>;

    async fn delete_snapshot(&self, snapshot_id: &str) -> StorageResult<bool>;

    // -- sync status -------------------------------------------------------

    async fn get_sync_status(&self, agent_id: &str, instance_id: &str)
        -> StorageResult<SyncStatus>;

    async fn upsert_sync_status(&self, status: &SyncStatus) -> StorageResult<()>;

    // -- maintenance -------------------------------------------------------

    /// Delete working memory and snapshots whose expiry is strictly before
    /// `now`. Returns the number of records removed.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> StorageResult<u64>;

    async fn memory_stats(&self, agent_id: &str) -> StorageResult<MemoryStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_sha256_hex() {
        let d = ContentDigest::from_bytes(b"hello");
        assert_eq!(
            d.as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(d.short(), "2cf24dba5fb0");
    }

    #[test]
    fn digest_rejects_non_hex() {
        assert!(ContentDigest::try_from("xyz".to_string()).is_err());
        let upper = "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824";
        let d = ContentDigest::try_from(upper.to_string()).unwrap();
        assert_eq!(d, ContentDigest::from_bytes(b"hello"));
    }

    #[test]
    fn digest_serde_validates() {
        let d = ContentDigest::from_bytes(b"x");
        let json = serde_json::to_string(&d).unwrap();
        let back: ContentDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
        assert!(serde_json::from_str::<ContentDigest>("\"nothex\"").is_err());
    }
}
