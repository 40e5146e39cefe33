//! Multi-instance synchronization.
//!
//! Each process runs one [`SyncCoordinator`] per agent it serves, identified by
//! an instance id. Writes made by this instance are reported with
//! [`SyncCoordinator::record_local_change`]; a sync pass compares them with the
//! shared store and records a [`MemoryConflict`] wherever another instance has
//! since written a different value under a higher version.
//!
//! Status moves `synced -> syncing -> {synced | conflict | error}` on every
//! pass. Status writes for one agent are serialized by an async mutex.

use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use agentmem_state::{
    LongtermMemory, MemoryConflict, MemoryFilters, MemoryMetadata, MemoryRepository, MemoryType,
    StorageError, StorageResult, SyncState, SyncStatus, WorkingMemory, DEFAULT_CATEGORY,
};

use crate::config::MemoryConfig;
use crate::error::{require, MemoryError, Result};
use crate::metrics::MemoryMetrics;
use crate::obs;
use crate::resolver::{ConflictResolver, ConflictStrategy, Resolution, Winner};

const STATUS_ENTITY: &str = "sync_status";
const FORCE_PUSH_ATTEMPTS: u32 = 3;

/// A write made by this instance, awaiting comparison with the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalChange {
    pub memory_type: MemoryType,
    pub key: String,
    pub value: Value,
    /// Version this instance wrote
    pub version: u64,
    pub changed_at: DateTime<Utc>,
}

impl LocalChange {
    pub fn working(key: impl Into<String>, value: Value, version: u64) -> Self {
        Self::new(MemoryType::Working, key, value, version)
    }

    pub fn longterm(key: impl Into<String>, value: Value, version: u64) -> Self {
        Self::new(MemoryType::Longterm, key, value, version)
    }

    fn new(memory_type: MemoryType, key: impl Into<String>, value: Value, version: u64) -> Self {
        Self {
            memory_type,
            key: key.into(),
            value,
            version,
            changed_at: Utc::now(),
        }
    }

    fn same_target(&self, memory_type: MemoryType, key: &str) -> bool {
        self.memory_type == memory_type && self.key == key
    }
}

impl From<&WorkingMemory> for LocalChange {
    fn from(memory: &WorkingMemory) -> Self {
        Self {
            memory_type: MemoryType::Working,
            key: memory.key.clone(),
            value: memory.value.clone(),
            version: memory.version,
            changed_at: memory.updated_at,
        }
    }
}

impl From<&LongtermMemory> for LocalChange {
    fn from(memory: &LongtermMemory) -> Self {
        Self {
            memory_type: MemoryType::Longterm,
            key: memory.key.clone(),
            value: memory.value.clone(),
            version: memory.version,
            changed_at: memory.updated_at,
        }
    }
}

/// Outcome of one sync pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub agent_id: String,
    pub instance_id: String,
    pub synced_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Working plus long-term entries seen in the store
    pub items_synced: u64,
    /// Conflicts still open after the pass
    pub conflicts: usize,
    pub errors: Vec<String>,
    pub success: bool,
}

/// One value `force_push` will write, with the queued change it came from.
struct PushWrite {
    memory_type: MemoryType,
    key: String,
    value: Value,
    change: Option<LocalChange>,
}

struct LoopHandle {
    agent_id: String,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    repo: Arc<dyn MemoryRepository>,
    resolver: ConflictResolver,
    instance_id: String,
    strategy: RwLock<ConflictStrategy>,
    auto_resolve: bool,
    default_ttl: Duration,
    status_lock: Mutex<()>,
    pending: DashMap<String, Vec<LocalChange>>,
    periodic: Mutex<Option<LoopHandle>>,
    metrics: Arc<MemoryMetrics>,
}

/// Per-instance sync driver. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    pub fn new(repo: Arc<dyn MemoryRepository>, config: &MemoryConfig) -> Self {
        Self::with_metrics(repo, config, Arc::new(MemoryMetrics::new()))
    }

    pub fn with_metrics(
        repo: Arc<dyn MemoryRepository>,
        config: &MemoryConfig,
        metrics: Arc<MemoryMetrics>,
    ) -> Self {
        let instance_id = config
            .instance_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            inner: Arc::new(Inner {
                repo,
                resolver: ConflictResolver::new(),
                instance_id,
                strategy: RwLock::new(config.conflict_strategy),
                auto_resolve: config.auto_resolve,
                default_ttl: config.default_working_ttl(),
                status_lock: Mutex::new(()),
                pending: DashMap::new(),
                periodic: Mutex::new(None),
                metrics,
            }),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    pub fn strategy(&self) -> ConflictStrategy {
        *self
            .inner
            .strategy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_strategy(&self, strategy: ConflictStrategy) {
        *self
            .inner
            .strategy
            .write()
            .unwrap_or_else(PoisonError::into_inner) = strategy;
        info!(strategy = %strategy, "conflict strategy changed");
    }

    // -----------------------------------------------------------------------
    // Periodic loop
    // -----------------------------------------------------------------------

    /// Run [`sync_agent`](Self::sync_agent) every `interval` on a background
    /// task. Failed passes are logged and retried on the next tick.
    pub async fn start_periodic_sync(&self, agent_id: &str, interval: Duration) -> Result<()> {
        require("agent_id", agent_id)?;
        if interval.is_zero() {
            return Err(MemoryError::Config("sync interval must be > 0".into()));
        }

        let mut slot = self.inner.periodic.lock().await;
        if let Some(running) = slot.as_ref() {
            if !running.handle.is_finished() {
                return Err(MemoryError::AlreadyRunning {
                    agent_id: running.agent_id.clone(),
                });
            }
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let span = tracing::info_span!(
            "agentmem.periodic_sync",
            agent_id = %agent_id,
            instance_id = %self.inner.instance_id
        );
        let handle = tokio::spawn(
            periodic_loop(
                Arc::downgrade(&self.inner),
                agent_id.to_string(),
                interval,
                stop_rx,
            )
            .instrument(span),
        );
        *slot = Some(LoopHandle {
            agent_id: agent_id.to_string(),
            stop_tx,
            handle,
        });
        info!(
            agent_id = %agent_id,
            interval_ms = interval.as_millis() as u64,
            "periodic sync started"
        );
        Ok(())
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop_periodic_sync(&self) -> Result<()> {
        let running = self.inner.periodic.lock().await.take();
        let Some(running) = running else {
            return Err(MemoryError::NotRunning);
        };

        let _ = running.stop_tx.send(true);
        if let Err(e) = running.handle.await {
            warn!(agent_id = %running.agent_id, error = %e, "periodic sync task ended abnormally");
        }
        info!(agent_id = %running.agent_id, "periodic sync stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.inner
            .periodic
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    // -----------------------------------------------------------------------
    // Local changes
    // -----------------------------------------------------------------------

    /// Queue a write made by this instance for the next sync pass. A newer
    /// change to the same key replaces the queued one.
    pub async fn record_local_change(&self, agent_id: &str, change: LocalChange) -> Result<()> {
        require("agent_id", agent_id)?;
        require("key", &change.key)?;

        let _guard = self.inner.status_lock.lock().await;
        let pending = self.enqueue(agent_id, change);
        let mut status = self.load_status(agent_id).await?;
        status.pending_changes = pending;
        self.save_status(&status).await
    }

    /// Replace any queued change for the same target. Returns the queue
    /// length. Callers hold `status_lock`.
    fn enqueue(&self, agent_id: &str, change: LocalChange) -> u64 {
        let mut queue = self.inner.pending.entry(agent_id.to_string()).or_default();
        queue.retain(|c| !c.same_target(change.memory_type, &change.key));
        queue.push(change);
        queue.len() as u64
    }

    fn take_pending(&self, agent_id: &str) -> Vec<LocalChange> {
        self.inner
            .pending
            .remove(agent_id)
            .map(|(_, changes)| changes)
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Sync pass
    // -----------------------------------------------------------------------

    /// One synchronization pass for `agent_id`.
    ///
    /// Per-item failures are collected into the result and leave status
    /// `error` unless conflicts are open. Only status persistence failures
    /// are returned as `Err`.
    pub async fn sync_agent(&self, agent_id: &str) -> Result<SyncResult> {
        require("agent_id", agent_id)?;
        let span = obs::sync_span(agent_id, &self.inner.instance_id);
        self.run_sync(agent_id).instrument(span).await
    }

    async fn run_sync(&self, agent_id: &str) -> Result<SyncResult> {
        let inner = &self.inner;
        let started = Instant::now();
        let _guard = inner.status_lock.lock().await;
        obs::emit_sync_started(agent_id, &inner.instance_id);

        let mut status = self.load_status(agent_id).await?;
        status.status = SyncState::Syncing;
        self.save_status(&status).await?;

        let mut errors = Vec::new();
        let mut items_synced = 0u64;
        let all = MemoryFilters::default();
        match inner.repo.list_working(agent_id, &all).await {
            Ok(entries) => items_synced += entries.len() as u64,
            Err(e) => errors.push(format!("list working memory: {e}")),
        }
        match inner.repo.list_longterm(agent_id, &all).await {
            Ok(entries) => items_synced += entries.len() as u64,
            Err(e) => errors.push(format!("list long-term memory: {e}")),
        }

        let changes = self.take_pending(agent_id);
        let detected = self.detect_conflicts(agent_id, &changes, &mut errors).await;
        inner.metrics.add_conflicts_detected(detected.len() as u64);
        for conflict in detected {
            obs::emit_conflict_detected(agent_id, &conflict.key, conflict.memory_type);
            match status.conflicts.iter_mut().find(|c| c.same_target(&conflict)) {
                Some(existing) => *existing = conflict,
                None => status.conflicts.push(conflict),
            }
        }

        if inner.auto_resolve
            && self.strategy() != ConflictStrategy::Manual
            && !status.conflicts.is_empty()
        {
            let (resolved, failed) = self.resolve_open(agent_id, &mut status).await;
            debug!(resolved, failed, "auto-resolve finished");
        }

        let synced_at = Utc::now();
        status.status = if !status.conflicts.is_empty() {
            SyncState::Conflict
        } else if !errors.is_empty() {
            SyncState::Error
        } else {
            SyncState::Synced
        };
        status.pending_changes = 0;
        status.sync_version += 1;
        status.last_sync_at = Some(synced_at);
        self.save_status(&status).await?;
        inner.metrics.inc_syncs();

        let duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_sync_finished(
            agent_id,
            duration_ms,
            items_synced,
            status.conflicts.len(),
            status.status,
        );
        Ok(SyncResult {
            agent_id: agent_id.to_string(),
            instance_id: inner.instance_id.clone(),
            synced_at,
            duration_ms,
            items_synced,
            conflicts: status.conflicts.len(),
            success: errors.is_empty(),
            errors,
        })
    }

    /// A change conflicts when the store now holds a higher version with a
    /// different value.
    async fn detect_conflicts(
        &self,
        agent_id: &str,
        changes: &[LocalChange],
        errors: &mut Vec<String>,
    ) -> Vec<MemoryConflict> {
        let repo = &self.inner.repo;
        let now = Utc::now();
        let mut found = Vec::new();

        for change in changes {
            let remote = match change.memory_type {
                MemoryType::Working => repo
                    .get_working(agent_id, &change.key)
                    .await
                    .map(|m| (m.version, m.value, m.updated_at)),
                MemoryType::Longterm => repo
                    .get_longterm(agent_id, &change.key)
                    .await
                    .map(|m| (m.version, m.value, m.updated_at)),
            };
            match remote {
                Ok((version, value, updated_at)) => {
                    if version > change.version && value != change.value {
                        found.push(MemoryConflict {
                            key: change.key.clone(),
                            memory_type: change.memory_type,
                            local_version: change.version,
                            remote_version: version,
                            local_value: change.value.clone(),
                            remote_value: value,
                            local_time: change.changed_at,
                            remote_time: updated_at,
                            detected_at: now,
                        });
                    }
                }
                Err(StorageError::NotFound { .. }) => {
                    debug!(key = %change.key, "changed key no longer stored")
                }
                Err(e) => errors.push(format!(
                    "check {} {}: {e}",
                    change.memory_type, change.key
                )),
            }
        }
        found
    }

    // -----------------------------------------------------------------------
    // Conflict resolution
    // -----------------------------------------------------------------------

    pub async fn conflicts(&self, agent_id: &str) -> Result<Vec<MemoryConflict>> {
        require("agent_id", agent_id)?;
        Ok(self.load_status(agent_id).await?.conflicts)
    }

    pub async fn status(&self, agent_id: &str) -> Result<SyncStatus> {
        require("agent_id", agent_id)?;
        self.load_status(agent_id).await
    }

    /// Resolve every open conflict with the current strategy. Returns how
    /// many were resolved; fails with `UnresolvedConflicts` if any remain.
    pub async fn resolve_conflicts(&self, agent_id: &str) -> Result<usize> {
        require("agent_id", agent_id)?;
        let _guard = self.inner.status_lock.lock().await;

        let mut status = self.load_status(agent_id).await?;
        let total = status.conflicts.len();
        if total == 0 {
            return Ok(0);
        }

        let (resolved, failed) = self.resolve_open(agent_id, &mut status).await;
        if failed > 0 {
            status.status = SyncState::Conflict;
        } else if status.status == SyncState::Conflict {
            status.status = SyncState::Synced;
        }
        self.save_status(&status).await?;

        if failed > 0 {
            return Err(MemoryError::UnresolvedConflicts { failed, total });
        }
        Ok(resolved)
    }

    /// Settle one conflict with a caller-chosen value, written over the
    /// store's copy with a version check against the conflicting version.
    pub async fn resolve_manually(
        &self,
        agent_id: &str,
        key: &str,
        memory_type: MemoryType,
        value: Value,
    ) -> Result<()> {
        require("agent_id", agent_id)?;
        require("key", key)?;
        let _guard = self.inner.status_lock.lock().await;

        let mut status = self.load_status(agent_id).await?;
        let idx = status
            .conflicts
            .iter()
            .position(|c| c.key == key && c.memory_type == memory_type)
            .ok_or_else(|| MemoryError::NotFound {
                entity: "conflict",
                key: key.to_string(),
            })?;

        let expected = status.conflicts[idx].remote_version;
        match self
            .write_value(agent_id, memory_type, key, value, expected)
            .await
        {
            Ok(()) => {}
            Err(StorageError::NotFound { .. }) => debug!(key = %key, "entry deleted, conflict dropped"),
            Err(e) => return Err(MemoryError::storage("resolve", entity_of(memory_type), key, e)),
        }

        status.conflicts.remove(idx);
        if status.conflicts.is_empty() && status.status == SyncState::Conflict {
            status.status = SyncState::Synced;
        }
        self.save_status(&status).await?;

        self.inner.metrics.inc_conflicts_resolved();
        obs::emit_conflict_resolved(agent_id, key, ConflictStrategy::Manual, None);
        Ok(())
    }

    /// Returns (resolved, failed); unresolved conflicts stay in `status`.
    async fn resolve_open(&self, agent_id: &str, status: &mut SyncStatus) -> (usize, usize) {
        let strategy = self.strategy();
        let open = std::mem::take(&mut status.conflicts);
        let mut remaining = Vec::new();
        let mut resolved = 0;

        for conflict in open {
            let outcome = match self.inner.resolver.resolve(&conflict, strategy) {
                Ok(resolution) => self
                    .apply_resolution(agent_id, &conflict, &resolution)
                    .await
                    .map(|()| resolution.winner),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(winner) => {
                    resolved += 1;
                    self.inner.metrics.inc_conflicts_resolved();
                    obs::emit_conflict_resolved(agent_id, &conflict.key, strategy, Some(winner));
                }
                Err(e) => {
                    warn!(key = %conflict.key, error = %e, "conflict left open");
                    remaining.push(conflict);
                }
            }
        }

        let failed = remaining.len();
        status.conflicts = remaining;
        (resolved, failed)
    }

    /// The store already holds the remote value; only a local win writes.
    async fn apply_resolution(
        &self,
        agent_id: &str,
        conflict: &MemoryConflict,
        resolution: &Resolution,
    ) -> Result<()> {
        if resolution.winner == Winner::Remote {
            return Ok(());
        }
        match self
            .write_value(
                agent_id,
                conflict.memory_type,
                &conflict.key,
                resolution.value.clone(),
                conflict.remote_version,
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound { .. }) => {
                debug!(key = %conflict.key, "entry deleted, conflict obsolete");
                Ok(())
            }
            Err(e) => Err(MemoryError::storage(
                "resolve",
                entity_of(conflict.memory_type),
                &conflict.key,
                e,
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Forced sync
    // -----------------------------------------------------------------------

    /// Write this instance's values over the store without conflict checks:
    /// open conflicts take their local side and pending changes override
    /// them. Returns the number of values written.
    ///
    /// A write that fails keeps its conflict open and its pending change
    /// queued, so a later push retries it.
    pub async fn force_push(&self, agent_id: &str) -> Result<usize> {
        require("agent_id", agent_id)?;
        let _guard = self.inner.status_lock.lock().await;

        let mut status = self.load_status(agent_id).await?;
        let mut writes: Vec<PushWrite> = status
            .conflicts
            .iter()
            .map(|c| PushWrite {
                memory_type: c.memory_type,
                key: c.key.clone(),
                value: c.local_value.clone(),
                change: None,
            })
            .collect();
        for change in self.take_pending(agent_id) {
            match writes
                .iter_mut()
                .find(|w| change.same_target(w.memory_type, &w.key))
            {
                Some(write) => {
                    write.value = change.value.clone();
                    write.change = Some(change);
                }
                None => writes.push(PushWrite {
                    memory_type: change.memory_type,
                    key: change.key.clone(),
                    value: change.value.clone(),
                    change: Some(change),
                }),
            }
        }

        let mut pushed = 0;
        let mut first_error = None;
        for write in writes {
            match self
                .push_value(agent_id, write.memory_type, &write.key, write.value)
                .await
            {
                Ok(()) => {
                    pushed += 1;
                    status
                        .conflicts
                        .retain(|c| !(c.memory_type == write.memory_type && c.key == write.key));
                }
                Err(e) => {
                    warn!(key = %write.key, error = %e, "force push write failed");
                    if let Some(change) = write.change {
                        self.enqueue(agent_id, change);
                    }
                    first_error.get_or_insert(e);
                }
            }
        }

        let now = Utc::now();
        status.pending_changes = self
            .inner
            .pending
            .get(agent_id)
            .map_or(0, |queue| queue.len() as u64);
        status.sync_version += 1;
        status.last_sync_at = Some(now);
        status
            .metadata
            .insert("last_force_push".into(), json!(now.to_rfc3339()));
        status.status = if !status.conflicts.is_empty() {
            SyncState::Conflict
        } else if first_error.is_some() {
            SyncState::Error
        } else {
            SyncState::Synced
        };
        self.save_status(&status).await?;
        info!(agent_id = %agent_id, pushed, "force push finished");

        match first_error {
            Some(e) => Err(e),
            None => Ok(pushed),
        }
    }

    /// Accept the store as-is: pending local changes are discarded and
    /// conflicts cleared. Returns the number of discarded changes.
    pub async fn force_pull(&self, agent_id: &str) -> Result<usize> {
        require("agent_id", agent_id)?;
        let _guard = self.inner.status_lock.lock().await;

        let discarded = self.take_pending(agent_id).len();
        let mut status = self.load_status(agent_id).await?;
        let now = Utc::now();
        status.conflicts.clear();
        status.pending_changes = 0;
        status.sync_version += 1;
        status.last_sync_at = Some(now);
        status.status = SyncState::Synced;
        status
            .metadata
            .insert("last_force_pull".into(), json!(now.to_rfc3339()));
        self.save_status(&status).await?;
        info!(agent_id = %agent_id, discarded, "force pull finished");
        Ok(discarded)
    }

    /// Read-then-CAS with a few retries; creates the entry if it is gone.
    async fn push_value(
        &self,
        agent_id: &str,
        memory_type: MemoryType,
        key: &str,
        value: Value,
    ) -> Result<()> {
        let repo = &self.inner.repo;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = match memory_type {
                MemoryType::Working => repo.get_working(agent_id, key).await.map(|m| m.version),
                MemoryType::Longterm => repo.get_longterm(agent_id, key).await.map(|m| m.version),
            };
            let written = match current {
                Ok(version) => {
                    self.write_value(agent_id, memory_type, key, value.clone(), version)
                        .await
                }
                Err(StorageError::NotFound { .. }) => {
                    self.create_value(agent_id, memory_type, key, value.clone())
                        .await
                }
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => return Ok(()),
                Err(e @ (StorageError::VersionConflict { .. } | StorageError::NotFound { .. }))
                    if attempt < FORCE_PUSH_ATTEMPTS =>
                {
                    debug!(key = %key, attempt, error = %e, "force push retry");
                }
                Err(e) => {
                    return Err(MemoryError::storage(
                        "force_push",
                        entity_of(memory_type),
                        key,
                        e,
                    ))
                }
            }
        }
    }

    async fn write_value(
        &self,
        agent_id: &str,
        memory_type: MemoryType,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> StorageResult<()> {
        let repo = &self.inner.repo;
        match memory_type {
            MemoryType::Working => repo
                .update_working(agent_id, key, value, expected_version)
                .await
                .map(|_| ()),
            MemoryType::Longterm => repo
                .update_longterm(agent_id, key, value, expected_version)
                .await
                .map(|_| ()),
        }
    }

    async fn create_value(
        &self,
        agent_id: &str,
        memory_type: MemoryType,
        key: &str,
        value: Value,
    ) -> StorageResult<()> {
        let repo = &self.inner.repo;
        match memory_type {
            MemoryType::Working => repo
                .store_working(WorkingMemory::new(
                    agent_id,
                    key,
                    value,
                    self.inner.default_ttl,
                ))
                .await
                .map(|_| ()),
            MemoryType::Longterm => repo
                .store_longterm(LongtermMemory::new(
                    agent_id,
                    key,
                    value,
                    DEFAULT_CATEGORY,
                    MemoryMetadata::default(),
                ))
                .await
                .map(|_| ()),
        }
    }

    // -----------------------------------------------------------------------
    // Status persistence
    // -----------------------------------------------------------------------

    async fn load_status(&self, agent_id: &str) -> Result<SyncStatus> {
        self.inner
            .repo
            .get_sync_status(agent_id, &self.inner.instance_id)
            .await
            .map_err(|e| MemoryError::storage("load", STATUS_ENTITY, agent_id, e))
    }

    async fn save_status(&self, status: &SyncStatus) -> Result<()> {
        self.inner
            .repo
            .upsert_sync_status(status)
            .await
            .map_err(|e| MemoryError::storage("save", STATUS_ENTITY, &status.agent_id, e))
    }
}

fn entity_of(memory_type: MemoryType) -> &'static str {
    match memory_type {
        MemoryType::Working => "working_memory",
        MemoryType::Longterm => "longterm_memory",
    }
}

/// Holds only a weak reference so dropping every coordinator handle ends
/// the loop.
async fn periodic_loop(
    inner: Weak<Inner>,
    agent_id: String,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(strong) = inner.upgrade() else { break };
                let coordinator = SyncCoordinator { inner: strong };
                if let Err(e) = coordinator.sync_agent(&agent_id).await {
                    obs::emit_background_error("sync", &agent_id, &e);
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
    debug!(agent_id = %agent_id, "periodic sync loop exited");
}
