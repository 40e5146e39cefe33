//! agentmem-state: persistence layer for agent memory
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: the data model, per-key optimistic locking, and backend-agnostic
//! storage behind one async trait.
//!
//! ## Key Components
//!
//! - `model`: working memory, long-term memory, snapshots, sync status
//! - `filters`: list/search/archive descriptors with shared semantics
//! - `MemoryRepository`: the persistence capability injected into managers
//! - `InMemoryRepository`: `DashMap`-backed store for tests and ephemeral use
//! - `SurrealMemoryRepository`: durable store (`mem://`, `surrealkv://`, cloud)

mod error;
pub mod fakes;
pub mod filters;
mod handle;
pub mod migrations;
pub mod model;
mod schema;
pub mod storage_traits;
pub mod surreal_repository;

pub use error::{StateError, StorageError};
pub use fakes::InMemoryRepository;
pub use filters::{ArchiveCriteria, MemoryFilters, MemoryQuery, SnapshotFilters, SortField};
pub use handle::{
    connect_cloud, connect_from_env, connect_local, connect_memory, connect_url, CloudConfig,
    DEFAULT_DATABASE, DEFAULT_LOCAL_PATH, DEFAULT_NAMESPACE,
};
pub use model::{
    canonical_json, LongtermMemory, MemoryConflict, MemoryMetadata, MemoryStats, MemoryType,
    Metadata, SnapshotMetadata, SnapshotType, StateSnapshot, SyncState, SyncStatus,
    WorkingMemory, DEFAULT_CATEGORY,
};
pub use schema::{LongtermMemoryRow, SnapshotRow, SyncStatusRow, WorkingMemoryRow};
pub use storage_traits::{ContentDigest, MemoryRepository, StorageResult};
pub use surreal_repository::SurrealMemoryRepository;

/// Result type for agentmem-state setup operations
pub type Result<T> = std::result::Result<T, StateError>;
