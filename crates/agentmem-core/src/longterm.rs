//! Long-term memory: durable, categorized knowledge ranked by importance.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use agentmem_state::{
    ArchiveCriteria, LongtermMemory, MemoryFilters, MemoryMetadata, MemoryQuery,
    MemoryRepository, DEFAULT_CATEGORY,
};

use crate::error::{require, MemoryError, Result};
use crate::metrics::MemoryMetrics;

const ENTITY: &str = "longterm_memory";

/// Outcome of an archive pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReport {
    /// Keys matching the criteria, sorted
    pub eligible: Vec<String>,
    /// Entries actually removed (always 0 on a dry run)
    pub archived: usize,
    pub dry_run: bool,
}

#[derive(Clone)]
pub struct LongtermMemoryManager {
    repo: Arc<dyn MemoryRepository>,
    metrics: Arc<MemoryMetrics>,
}

impl LongtermMemoryManager {
    pub fn new(repo: Arc<dyn MemoryRepository>) -> Self {
        Self::with_metrics(repo, Arc::new(MemoryMetrics::new()))
    }

    pub fn with_metrics(repo: Arc<dyn MemoryRepository>, metrics: Arc<MemoryMetrics>) -> Self {
        Self { repo, metrics }
    }

    /// Create or replace `key`.
    ///
    /// `category` defaults to `"general"` and `metadata` to
    /// [`MemoryMetadata::default`]. Importance is clamped to `1..=10` and
    /// confidence to `0.0..=1.0`.
    #[instrument(skip(self, value, metadata), fields(agent_id = %agent_id, key = %key))]
    pub async fn remember(
        &self,
        agent_id: &str,
        key: &str,
        value: Value,
        category: Option<&str>,
        metadata: Option<MemoryMetadata>,
    ) -> Result<LongtermMemory> {
        require("agent_id", agent_id)?;
        require("key", key)?;

        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY);
        let memory = LongtermMemory::new(
            agent_id,
            key,
            value,
            category,
            normalize(metadata.unwrap_or_default()),
        );

        let stored = self
            .repo
            .store_longterm(memory)
            .await
            .map_err(|e| MemoryError::storage("remember", ENTITY, key, e))?;

        self.metrics.inc_stores();
        debug!(
            category = %stored.category,
            importance = stored.metadata.importance,
            "long-term memory stored"
        );
        Ok(stored)
    }

    /// Fetch an entry; access tracking is bumped in the background.
    #[instrument(skip(self), fields(agent_id = %agent_id, key = %key))]
    pub async fn recall(&self, agent_id: &str, key: &str) -> Result<LongtermMemory> {
        require("agent_id", agent_id)?;
        require("key", key)?;

        let memory = self
            .repo
            .get_longterm(agent_id, key)
            .await
            .map_err(|e| MemoryError::storage("recall", ENTITY, key, e))?;

        let repo = Arc::clone(&self.repo);
        let (agent, k) = (agent_id.to_string(), key.to_string());
        tokio::spawn(async move {
            if let Err(e) = repo.record_longterm_access(&agent, &k).await {
                debug!(agent_id = %agent, key = %k, error = %e, "access tracking failed");
            }
        });

        Ok(memory)
    }

    /// Filter-based search; a non-empty `query.text` also requires a
    /// case-insensitive match on the key or value.
    #[instrument(skip(self, query), fields(agent_id = %agent_id, text = %query.text))]
    pub async fn search(
        &self,
        agent_id: &str,
        query: &MemoryQuery,
    ) -> Result<Vec<LongtermMemory>> {
        require("agent_id", agent_id)?;

        let found = self
            .repo
            .search_longterm(agent_id, query)
            .await
            .map_err(|e| MemoryError::storage("search", ENTITY, agent_id, e))?;
        debug!(results = found.len(), "long-term search");
        Ok(found)
    }

    #[instrument(skip(self, filters), fields(agent_id = %agent_id))]
    pub async fn list(
        &self,
        agent_id: &str,
        filters: &MemoryFilters,
    ) -> Result<Vec<LongtermMemory>> {
        require("agent_id", agent_id)?;

        self.repo
            .list_longterm(agent_id, filters)
            .await
            .map_err(|e| MemoryError::storage("list", ENTITY, agent_id, e))
    }

    /// Compare-and-swap update of the value.
    #[instrument(skip(self, value), fields(agent_id = %agent_id, key = %key))]
    pub async fn revise(
        &self,
        agent_id: &str,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> Result<LongtermMemory> {
        require("agent_id", agent_id)?;
        require("key", key)?;

        match self
            .repo
            .update_longterm(agent_id, key, value, expected_version)
            .await
        {
            Ok(updated) => {
                self.metrics.inc_updates();
                Ok(updated)
            }
            Err(e) => {
                let err = MemoryError::storage("revise", ENTITY, key, e);
                if err.is_version_conflict() {
                    self.metrics.inc_version_conflicts();
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self), fields(agent_id = %agent_id, key = %key))]
    pub async fn forget(&self, agent_id: &str, key: &str) -> Result<()> {
        require("agent_id", agent_id)?;
        require("key", key)?;

        let existed = self
            .repo
            .delete_longterm(agent_id, key)
            .await
            .map_err(|e| MemoryError::storage("forget", ENTITY, key, e))?;
        if !existed {
            return Err(MemoryError::NotFound {
                entity: ENTITY,
                key: key.to_string(),
            });
        }
        info!(agent_id = %agent_id, key = %key, "long-term memory forgotten");
        Ok(())
    }

    /// Remove entries matching every bound in `criteria`.
    ///
    /// A dry run only reports. Failed deletes are logged and skipped.
    #[instrument(skip(self, criteria), fields(agent_id = %agent_id, dry_run = criteria.dry_run))]
    pub async fn archive(
        &self,
        agent_id: &str,
        criteria: &ArchiveCriteria,
    ) -> Result<ArchiveReport> {
        require("agent_id", agent_id)?;

        let now = Utc::now();
        let entries = self
            .repo
            .list_longterm(agent_id, &MemoryFilters::default())
            .await
            .map_err(|e| MemoryError::storage("archive", ENTITY, agent_id, e))?;

        let mut eligible: Vec<String> = entries
            .into_iter()
            .filter(|m| criteria.is_eligible(m, now))
            .map(|m| m.key)
            .collect();
        eligible.sort();

        let mut report = ArchiveReport {
            eligible,
            archived: 0,
            dry_run: criteria.dry_run,
        };
        if criteria.dry_run {
            info!(eligible = report.eligible.len(), "archive dry run");
            return Ok(report);
        }

        for key in &report.eligible {
            match self.repo.delete_longterm(agent_id, key).await {
                Ok(true) => report.archived += 1,
                Ok(false) => debug!(key = %key, "already gone"),
                Err(e) => warn!(key = %key, error = %e, "archive delete failed, skipping"),
            }
        }
        info!(
            eligible = report.eligible.len(),
            archived = report.archived,
            "long-term memories archived"
        );
        Ok(report)
    }
}

fn normalize(mut metadata: MemoryMetadata) -> MemoryMetadata {
    metadata.importance = metadata.importance.clamp(1, 10);
    metadata.confidence = if metadata.confidence.is_nan() {
        1.0
    } else {
        metadata.confidence.clamp(0.0, 1.0)
    };
    if metadata.source.trim().is_empty() {
        metadata.source = MemoryMetadata::default().source;
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_ranges() {
        let m = normalize(MemoryMetadata {
            source: " ".into(),
            importance: 42,
            confidence: 3.5,
            ..MemoryMetadata::default()
        });
        assert_eq!(m.importance, 10);
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.source, "manual");

        let m = normalize(MemoryMetadata {
            importance: 0,
            confidence: -1.0,
            ..MemoryMetadata::default()
        });
        assert_eq!(m.importance, 1);
        assert_eq!(m.confidence, 0.0);
    }
}
