//! Engine statistics: lock-free counters with immutable snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for engine activity. Updated outside the engine-wide
/// lock where possible; all loads are `Relaxed` since the values are
/// observability-only.
#[derive(Debug, Default)]
pub struct EngineStats {
    txns_begun: AtomicU64,
    txns_committed: AtomicU64,
    txns_rolled_back: AtomicU64,
    validation_failures: AtomicU64,
    lock_conflicts: AtomicU64,
    one_shot_ops: AtomicU64,
}

impl EngineStats {
    pub fn record_begin(&self) {
        self.txns_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.txns_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.txns_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_conflict(&self) {
        self.lock_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_one_shot(&self) {
        self.one_shot_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            txns_begun: self.txns_begun.load(Ordering::Relaxed),
            txns_committed: self.txns_committed.load(Ordering::Relaxed),
            txns_rolled_back: self.txns_rolled_back.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            lock_conflicts: self.lock_conflicts.load(Ordering::Relaxed),
            one_shot_ops: self.one_shot_ops.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of engine statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub txns_begun: u64,
    pub txns_committed: u64,
    pub txns_rolled_back: u64,
    /// Optimistic commits aborted by version validation.
    pub validation_failures: u64,
    /// Operations refused because another transaction held a lock.
    pub lock_conflicts: u64,
    /// Operations executed in one-shot auto-commit mode.
    pub one_shot_ops: u64,
}
