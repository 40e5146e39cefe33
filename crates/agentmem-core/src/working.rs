//! Working memory: short-lived, TTL-bounded context for active tasks.
//!
//! Expiry is enforced on read. A read that finds an expired entry reports
//! [`MemoryError::Expired`] and removes the entry in the background; the
//! periodic sweep ([`crate::MemoryService::cleanup_expired`]) catches the rest.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument};

use agentmem_state::{MemoryFilters, MemoryRepository, Metadata, WorkingMemory};

use crate::error::{require, MemoryError, Result};
use crate::metrics::MemoryMetrics;
use crate::obs;

const ENTITY: &str = "working_memory";

/// TTL used by [`WorkingMemoryManager::store_default`] unless configured.
pub const DEFAULT_WORKING_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct WorkingMemoryManager {
    repo: Arc<dyn MemoryRepository>,
    metrics: Arc<MemoryMetrics>,
    default_ttl: Duration,
}

impl WorkingMemoryManager {
    pub fn new(repo: Arc<dyn MemoryRepository>) -> Self {
        Self::with_metrics(repo, Arc::new(MemoryMetrics::new()))
    }

    pub fn with_metrics(repo: Arc<dyn MemoryRepository>, metrics: Arc<MemoryMetrics>) -> Self {
        Self {
            repo,
            metrics,
            default_ttl: DEFAULT_WORKING_TTL,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Create or replace `key`. The stored entry starts at version 1.
    #[instrument(skip(self, value), fields(agent_id = %agent_id, key = %key))]
    pub async fn store(
        &self,
        agent_id: &str,
        key: &str,
        value: Value,
        ttl: Duration,
    ) -> Result<WorkingMemory> {
        self.store_with_metadata(agent_id, key, value, ttl, Metadata::new())
            .await
    }

    /// [`store`](Self::store) with the manager's default TTL.
    pub async fn store_default(
        &self,
        agent_id: &str,
        key: &str,
        value: Value,
    ) -> Result<WorkingMemory> {
        self.store(agent_id, key, value, self.default_ttl).await
    }

    /// Store with a metadata map; `metadata["tags"]` drives tag filters.
    #[instrument(skip(self, value, metadata), fields(agent_id = %agent_id, key = %key))]
    pub async fn store_with_metadata(
        &self,
        agent_id: &str,
        key: &str,
        value: Value,
        ttl: Duration,
        metadata: Metadata,
    ) -> Result<WorkingMemory> {
        require("agent_id", agent_id)?;
        require("key", key)?;

        let memory = WorkingMemory::new(agent_id, key, value, ttl).with_metadata(metadata);
        let stored = self
            .repo
            .store_working(memory)
            .await
            .map_err(|e| MemoryError::storage("store", ENTITY, key, e))?;

        self.metrics.inc_stores();
        debug!(expires_at = %stored.expires_at, "working memory stored");
        Ok(stored)
    }

    /// Fetch the live entry for `key`.
    ///
    /// Expired entries yield [`MemoryError::Expired`] and are deleted in the
    /// background. Successful reads bump access tracking in the background.
    #[instrument(skip(self), fields(agent_id = %agent_id, key = %key))]
    pub async fn retrieve(&self, agent_id: &str, key: &str) -> Result<WorkingMemory> {
        require("agent_id", agent_id)?;
        require("key", key)?;

        let memory = self
            .repo
            .get_working(agent_id, key)
            .await
            .map_err(|e| MemoryError::storage("retrieve", ENTITY, key, e))?;

        if memory.is_expired_at(Utc::now()) {
            self.spawn_expire(agent_id, key);
            return Err(MemoryError::Expired {
                agent_id: agent_id.to_string(),
                key: key.to_string(),
            });
        }

        self.spawn_access(agent_id, key);
        Ok(memory)
    }

    /// Compare-and-swap update. Fails with `VersionConflict` when
    /// `expected_version` is stale and `Expired` when the entry has lapsed.
    #[instrument(skip(self, value), fields(agent_id = %agent_id, key = %key))]
    pub async fn update(
        &self,
        agent_id: &str,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> Result<WorkingMemory> {
        require("agent_id", agent_id)?;
        require("key", key)?;

        let current = self
            .repo
            .get_working(agent_id, key)
            .await
            .map_err(|e| MemoryError::storage("update", ENTITY, key, e))?;
        if current.is_expired_at(Utc::now()) {
            self.spawn_expire(agent_id, key);
            return Err(MemoryError::Expired {
                agent_id: agent_id.to_string(),
                key: key.to_string(),
            });
        }

        match self
            .repo
            .update_working(agent_id, key, value, expected_version)
            .await
        {
            Ok(updated) => {
                self.metrics.inc_updates();
                debug!(version = updated.version, "working memory updated");
                Ok(updated)
            }
            Err(e) => {
                let err = MemoryError::storage("update", ENTITY, key, e);
                if err.is_version_conflict() {
                    self.metrics.inc_version_conflicts();
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self), fields(agent_id = %agent_id, key = %key))]
    pub async fn delete(&self, agent_id: &str, key: &str) -> Result<()> {
        require("agent_id", agent_id)?;
        require("key", key)?;

        let existed = self
            .repo
            .delete_working(agent_id, key)
            .await
            .map_err(|e| MemoryError::storage("delete", ENTITY, key, e))?;
        if !existed {
            return Err(MemoryError::NotFound {
                entity: ENTITY,
                key: key.to_string(),
            });
        }
        debug!("working memory deleted");
        Ok(())
    }

    /// Remove every working entry of the agent. Returns the count removed.
    #[instrument(skip(self), fields(agent_id = %agent_id))]
    pub async fn clear(&self, agent_id: &str) -> Result<u64> {
        require("agent_id", agent_id)?;

        let count = self
            .repo
            .clear_working(agent_id)
            .await
            .map_err(|e| MemoryError::storage("clear", ENTITY, agent_id, e))?;
        info!(agent_id = %agent_id, count, "working memory cleared");
        Ok(count)
    }

    /// Live entries matching `filters`. Pagination counts live entries only.
    #[instrument(skip(self, filters), fields(agent_id = %agent_id))]
    pub async fn list(
        &self,
        agent_id: &str,
        filters: &MemoryFilters,
    ) -> Result<Vec<WorkingMemory>> {
        require("agent_id", agent_id)?;

        let unpaged = MemoryFilters {
            limit: None,
            offset: 0,
            ..filters.clone()
        };
        let now = Utc::now();
        let entries = self
            .repo
            .list_working(agent_id, &unpaged)
            .await
            .map_err(|e| MemoryError::storage("list", ENTITY, agent_id, e))?;

        let limit = filters.limit.filter(|l| *l > 0).unwrap_or(usize::MAX);
        Ok(entries
            .into_iter()
            .filter(|m| !m.is_expired_at(now))
            .skip(filters.offset)
            .take(limit)
            .collect())
    }

    fn spawn_access(&self, agent_id: &str, key: &str) {
        let repo = Arc::clone(&self.repo);
        let (agent_id, key) = (agent_id.to_string(), key.to_string());
        tokio::spawn(async move {
            if let Err(e) = repo.record_working_access(&agent_id, &key).await {
                debug!(agent_id = %agent_id, key = %key, error = %e, "access tracking failed");
            }
        });
    }

    /// Delete in the background. The store re-checks expiry atomically with
    /// the removal, so a fresh store under the same key is left alone.
    fn spawn_expire(&self, agent_id: &str, key: &str) {
        let repo = Arc::clone(&self.repo);
        let metrics = Arc::clone(&self.metrics);
        let (agent_id, key) = (agent_id.to_string(), key.to_string());
        tokio::spawn(async move {
            match repo
                .delete_working_if_expired(&agent_id, &key, Utc::now())
                .await
            {
                Ok(true) => {
                    metrics.add_expirations(1);
                    obs::emit_memory_expired(&agent_id, &key);
                }
                Ok(false) => {}
                Err(e) => debug!(
                    agent_id = %agent_id,
                    key = %key,
                    error = %e,
                    "expired entry cleanup failed"
                ),
            }
        });
    }
}
