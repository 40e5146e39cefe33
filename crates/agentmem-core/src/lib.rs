//! agentmem-core: domain logic for agent memory
//!
//! ## Layer 1 - Memory Services
//!
//! Built on `agentmem-state`. Everything here talks to storage through an
//! injected `Arc<dyn MemoryRepository>`; there is no global state.
//!
//! ## Key Components
//!
//! - `WorkingMemoryManager`: TTL-bounded entries with optimistic locking
//! - `LongtermMemoryManager`: categorized knowledge, search and archival
//! - `SnapshotManager`: checksummed captures and restore
//! - `ConflictResolver` / `SyncCoordinator`: cross-instance synchronization
//! - `MemoryService`: façade wiring the above to one repository

pub mod config;
pub mod error;
pub mod longterm;
pub mod metrics;
pub mod obs;
pub mod resolver;
pub mod service;
pub mod snapshot;
pub mod sync;
pub mod telemetry;
pub mod working;

pub use config::MemoryConfig;
pub use error::{MemoryError, Result};
pub use longterm::{ArchiveReport, LongtermMemoryManager};
pub use metrics::{MemoryMetrics, MetricsSnapshot};
pub use resolver::{ConflictResolver, ConflictStrategy, Resolution, Winner};
pub use service::MemoryService;
pub use snapshot::{RestoreReport, SnapshotManager, SnapshotState};
pub use sync::{LocalChange, SyncCoordinator, SyncResult};
pub use telemetry::init_tracing;
pub use working::{WorkingMemoryManager, DEFAULT_WORKING_TTL};

pub use agentmem_state::{
    ArchiveCriteria, InMemoryRepository, LongtermMemory, MemoryConflict, MemoryFilters,
    MemoryMetadata, MemoryQuery, MemoryRepository, MemoryStats, MemoryType, Metadata,
    SnapshotFilters, SnapshotType, SortField, StateSnapshot, SurrealMemoryRepository, SyncState,
    SyncStatus, WorkingMemory,
};
