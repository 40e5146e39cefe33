//! Structured observability hooks for memory and sync lifecycle events.
//!
//! Events carry a stable `event` field (`sync.started`, `snapshot.created`, ...)
//! so log pipelines can filter on it regardless of message text.

use tracing::{info, warn};

use agentmem_state::{MemoryType, SnapshotType, SyncState};

use crate::resolver::{ConflictStrategy, Winner};

/// Span covering one sync pass. Attach it with `tracing::Instrument` so it
/// stays correct across `.await` points.
///
/// ```ignore
/// coordinator.sync_agent("agent-1").instrument(sync_span("agent-1", "instance-a")).await
/// ```
pub fn sync_span(agent_id: &str, instance_id: &str) -> tracing::Span {
    tracing::info_span!("agentmem.sync", agent_id = %agent_id, instance_id = %instance_id)
}

pub fn emit_sync_started(agent_id: &str, instance_id: &str) {
    info!(event = "sync.started", agent_id = %agent_id, instance_id = %instance_id);
}

pub fn emit_sync_finished(
    agent_id: &str,
    duration_ms: u64,
    items_synced: u64,
    conflicts: usize,
    status: SyncState,
) {
    info!(
        event = "sync.finished",
        agent_id = %agent_id,
        duration_ms = duration_ms,
        items_synced = items_synced,
        conflicts = conflicts,
        status = %status,
    );
}

/// Warn level: a conflict needs attention.
pub fn emit_conflict_detected(agent_id: &str, key: &str, memory_type: MemoryType) {
    warn!(
        event = "sync.conflict_detected",
        agent_id = %agent_id,
        key = %key,
        memory_type = %memory_type,
    );
}

/// `winner` is `None` when an operator supplied the value.
pub fn emit_conflict_resolved(
    agent_id: &str,
    key: &str,
    strategy: ConflictStrategy,
    winner: Option<Winner>,
) {
    info!(
        event = "conflict.resolved",
        agent_id = %agent_id,
        key = %key,
        strategy = %strategy,
        winner = winner_label(winner),
    );
}

fn winner_label(winner: Option<Winner>) -> &'static str {
    match winner {
        Some(Winner::Local) => "local",
        Some(Winner::Remote) => "remote",
        None => "operator",
    }
}

pub fn emit_snapshot_created(
    agent_id: &str,
    snapshot_id: &str,
    snapshot_type: SnapshotType,
    size_bytes: u64,
) {
    info!(
        event = "snapshot.created",
        agent_id = %agent_id,
        snapshot_id = %snapshot_id,
        snapshot_type = %snapshot_type,
        size_bytes = size_bytes,
    );
}

pub fn emit_memory_expired(agent_id: &str, key: &str) {
    info!(event = "memory.expired", agent_id = %agent_id, key = %key);
}

/// Warn level: a background pass failed and will be retried next tick.
pub fn emit_background_error(task: &str, agent_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "background.error", task = %task, agent_id = %agent_id, error = %error);
}
