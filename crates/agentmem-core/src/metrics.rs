//! Atomic counters for memory and sync activity.
//!
//! Each `MemoryService` owns its own `MemoryMetrics`; there is no process-wide
//! singleton. Counters are bumped silently at the call site. Call
//! [`MemoryMetrics::flush`] to emit current values as one `tracing::info!`
//! event (e.g. on a daemon tick).

use std::sync::atomic::{AtomicU64, Ordering};

/// Lightweight atomic counters: no allocations, no locking.
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    stores: AtomicU64,
    updates: AtomicU64,
    version_conflicts: AtomicU64,
    expirations: AtomicU64,
    syncs: AtomicU64,
    conflicts_detected: AtomicU64,
    conflicts_resolved: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub stores: u64,
    pub updates: u64,
    pub version_conflicts: u64,
    pub expirations: u64,
    pub syncs: u64,
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
}

impl MemoryMetrics {
    pub const fn new() -> Self {
        Self {
            stores: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            version_conflicts: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
            conflicts_detected: AtomicU64::new(0),
            conflicts_resolved: AtomicU64::new(0),
        }
    }

    pub fn inc_stores(&self) {
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_updates(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_version_conflicts(&self) {
        self.version_conflicts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "version_conflicts", "counter incremented");
    }

    pub fn add_expirations(&self, n: u64) {
        self.expirations.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_syncs(&self) {
        self.syncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_conflicts_detected(&self, n: u64) {
        self.conflicts_detected.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_conflicts_resolved(&self) {
        self.conflicts_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            stores: self.stores.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            version_conflicts: self.version_conflicts.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
            conflicts_detected: self.conflicts_detected.load(Ordering::Relaxed),
            conflicts_resolved: self.conflicts_resolved.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let m = self.snapshot();
        tracing::info!(
            metric = "flush",
            stores = m.stores,
            updates = m.updates,
            version_conflicts = m.version_conflicts,
            expirations = m.expirations,
            syncs = m.syncs,
            conflicts_detected = m.conflicts_detected,
            conflicts_resolved = m.conflicts_resolved,
        );
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.stores,
            &self.updates,
            &self.version_conflicts,
            &self.expirations,
            &self.syncs,
            &self.conflicts_detected,
            &self.conflicts_resolved,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = MemoryMetrics::new();
        m.inc_stores();
        m.inc_stores();
        m.inc_version_conflicts();
        m.add_expirations(3);
        let s = m.snapshot();
        assert_eq!(s.stores, 2);
        assert_eq!(s.version_conflicts, 1);
        assert_eq!(s.expirations, 3);
        assert_eq!(s.syncs, 0);
    }

    #[test]
    fn instances_are_independent() {
        let a = MemoryMetrics::new();
        let b = MemoryMetrics::new();
        a.inc_syncs();
        assert_eq!(a.snapshot().syncs, 1);
        assert_eq!(b.snapshot().syncs, 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = MemoryMetrics::new();
        m.inc_updates();
        m.inc_conflicts_resolved();
        m.add_conflicts_detected(2);
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
