//! Error types for agentmem-state

use thiserror::Error;

/// Errors that can occur while connecting to or preparing a backing store
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by [`crate::MemoryRepository`] implementations.
///
/// Variants carry the entity kind and key so callers can report failures
/// without knowing which backend produced them.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No record exists under the given key
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Optimistic-lock failure: the stored version moved past the caller's
    #[error("{entity} version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        entity: &'static str,
        key: String,
        expected: u64,
        actual: u64,
    },

    /// Digest string is not 64 hex characters
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Record could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
