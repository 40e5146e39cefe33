//! `MemoryService`: one repository, shared by every manager it hands out.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use agentmem_state::{MemoryRepository, MemoryStats};

use crate::config::MemoryConfig;
use crate::error::{require, MemoryError, Result};
use crate::longterm::LongtermMemoryManager;
use crate::metrics::MemoryMetrics;
use crate::snapshot::SnapshotManager;
use crate::sync::SyncCoordinator;
use crate::working::WorkingMemoryManager;

/// Entry point for embedding agent memory in a process.
///
/// ```ignore
/// let repo: Arc<dyn MemoryRepository> = Arc::new(InMemoryRepository::new());
/// let service = MemoryService::new(repo);
/// let entry = service.working().store("agent-1", "goal", json!("ship"), ttl).await?;
/// ```
#[derive(Clone)]
pub struct MemoryService {
    repo: Arc<dyn MemoryRepository>,
    config: MemoryConfig,
    metrics: Arc<MemoryMetrics>,
    working: WorkingMemoryManager,
    longterm: LongtermMemoryManager,
    snapshots: SnapshotManager,
}

impl MemoryService {
    pub fn new(repo: Arc<dyn MemoryRepository>) -> Self {
        Self::with_config(repo, MemoryConfig::default())
    }

    pub fn with_config(repo: Arc<dyn MemoryRepository>, config: MemoryConfig) -> Self {
        let metrics = Arc::new(MemoryMetrics::new());
        Self {
            working: WorkingMemoryManager::with_metrics(Arc::clone(&repo), Arc::clone(&metrics))
                .with_default_ttl(config.default_working_ttl()),
            longterm: LongtermMemoryManager::with_metrics(Arc::clone(&repo), Arc::clone(&metrics)),
            snapshots: SnapshotManager::new(Arc::clone(&repo)),
            repo,
            config,
            metrics,
        }
    }

    pub fn working(&self) -> &WorkingMemoryManager {
        &self.working
    }

    pub fn longterm(&self) -> &LongtermMemoryManager {
        &self.longterm
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    /// A new coordinator over this service's repository and metrics.
    pub fn coordinator(&self, config: &MemoryConfig) -> SyncCoordinator {
        SyncCoordinator::with_metrics(Arc::clone(&self.repo), config, Arc::clone(&self.metrics))
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MemoryMetrics {
        &self.metrics
    }

    pub fn repository(&self) -> Arc<dyn MemoryRepository> {
        Arc::clone(&self.repo)
    }

    /// Sweep working memory and snapshots whose expiry has passed.
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let removed = self
            .repo
            .cleanup_expired(Utc::now())
            .await
            .map_err(|e| MemoryError::storage("cleanup", "expired", "*", e))?;
        self.metrics.add_expirations(removed);
        debug!(removed, "expiry sweep finished");
        Ok(removed)
    }

    #[instrument(skip(self))]
    pub async fn memory_stats(&self, agent_id: &str) -> Result<MemoryStats> {
        require("agent_id", agent_id)?;
        self.repo
            .memory_stats(agent_id)
            .await
            .map_err(|e| MemoryError::storage("stats", "agent", agent_id, e))
    }
}
