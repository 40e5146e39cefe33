//! Error taxonomy for the memory subsystem.

use agentmem_state::{MemoryType, StorageError};

/// Errors produced by memory managers and the sync coordinator.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("validation failed: {field} is required")]
    Validation { field: &'static str },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("working memory {key} for agent {agent_id} has expired")]
    Expired { agent_id: String, key: String },

    #[error("version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("snapshot {snapshot_id} does not belong to agent {agent_id}")]
    Ownership {
        snapshot_id: String,
        agent_id: String,
    },

    #[error("conflict on {memory_type} key {key} requires manual resolution")]
    ManualResolutionRequired { key: String, memory_type: MemoryType },

    #[error("periodic sync already running for agent {agent_id}")]
    AlreadyRunning { agent_id: String },

    #[error("periodic sync is not running")]
    NotRunning,

    #[error("snapshot {snapshot_id} failed integrity check: expected {expected}, got {actual}")]
    Integrity {
        snapshot_id: String,
        expected: String,
        actual: String,
    },

    #[error("failed to resolve {failed} conflicts (of {total})")]
    UnresolvedConflicts { failed: usize, total: usize },

    #[error("failed to {operation} {entity} {key}: {source}")]
    Repository {
        entity: &'static str,
        key: String,
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MemoryError {
    /// Wrap a storage failure with the operation context.
    ///
    /// `NotFound` and `VersionConflict` become their domain variants so
    /// callers can match on them without knowing the backend.
    pub fn storage(
        operation: &'static str,
        entity: &'static str,
        key: impl Into<String>,
        source: StorageError,
    ) -> Self {
        match source {
            StorageError::NotFound { entity, key } => MemoryError::NotFound { entity, key },
            StorageError::VersionConflict {
                key,
                expected,
                actual,
                ..
            } => MemoryError::VersionConflict {
                key,
                expected,
                actual,
            },
            source => MemoryError::Repository {
                entity,
                key: key.into(),
                operation,
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MemoryError::NotFound { .. })
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, MemoryError::VersionConflict { .. })
    }
}

/// Result type for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Reject empty identifiers before touching the store.
pub(crate) fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MemoryError::Validation { field });
    }
    Ok(())
}
