//! Engine core: public operations, scheme dispatch, and the engine-wide
//! lock.

use std::collections::HashMap;

use parking_lot::Mutex;

use kvt_common::config::EngineConfig;
use kvt_common::error::{KvtError, KvtResult};
use kvt_common::types::{ByteString, CcScheme, Partitioning, TableId, TxnId};

use crate::catalog::Catalog;
use crate::stats::{EngineStats, EngineStatsSnapshot};
use crate::txn::TxnContext;

/// Everything the engine-wide lock protects: the table registry, every
/// table's data, and the transaction context table.
#[derive(Debug)]
pub(crate) struct EngineInner {
    pub(crate) catalog: Catalog,
    pub(crate) txns: HashMap<TxnId, TxnContext>,
    pub(crate) next_txn_id: u64,
    /// Serialized scheme: the single transaction allowed to be live.
    pub(crate) current_txn: Option<TxnId>,
}

impl EngineInner {
    fn new() -> Self {
        Self {
            catalog: Catalog::new(),
            txns: HashMap::new(),
            next_txn_id: 1,
            current_txn: None,
        }
    }

    pub(crate) fn ensure_txn(&self, tx_id: TxnId) -> KvtResult<()> {
        if self.txns.contains_key(&tx_id) {
            Ok(())
        } else {
            Err(KvtError::TxnNotFound(tx_id))
        }
    }

    pub(crate) fn ensure_table(&self, table: TableId) -> KvtResult<()> {
        if self.catalog.contains(table) {
            Ok(())
        } else {
            Err(KvtError::TableNotFound(table))
        }
    }
}

/// The transactional key-value engine. One instance per deployment; all
/// public operations are synchronous and acquire the engine-wide lock on
/// entry. Contention never blocks inside the engine: conflicting
/// operations fail with an error and the caller retries or rolls back.
pub struct KvtEngine {
    scheme: CcScheme,
    inner: Mutex<EngineInner>,
    stats: EngineStats,
}

impl KvtEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_scheme(config.cc_scheme)
    }

    pub fn with_scheme(scheme: CcScheme) -> Self {
        tracing::debug!(%scheme, "engine created");
        Self {
            scheme,
            inner: Mutex::new(EngineInner::new()),
            stats: EngineStats::default(),
        }
    }

    pub fn scheme(&self) -> CcScheme {
        self.scheme
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    // ── Table management ─────────────────────────────────────────────

    pub fn create_table(&self, name: &str, partitioning: Partitioning) -> KvtResult<TableId> {
        let mut inner = self.inner.lock();
        let id = inner.catalog.create(name, partitioning)?;
        tracing::debug!(table = name, %id, %partitioning, "table created");
        Ok(id)
    }

    pub fn lookup_table(&self, name: &str) -> KvtResult<TableId> {
        self.inner.lock().catalog.lookup(name)
    }

    /// Create-or-lookup convenience for callers that treat an existing
    /// table as success. Fails if the table exists with a different
    /// partitioning than requested.
    pub fn open_table(&self, name: &str, partitioning: Partitioning) -> KvtResult<TableId> {
        let mut inner = self.inner.lock();
        match inner.catalog.create(name, partitioning) {
            Ok(id) => {
                tracing::debug!(table = name, %id, %partitioning, "table created");
                Ok(id)
            }
            Err(KvtError::TableAlreadyExists(_)) => {
                let id = inner.catalog.lookup(name)?;
                let existing = inner.catalog.table(id)?.partitioning;
                if existing != partitioning {
                    return Err(KvtError::InvalidPartitionMethod(partitioning.to_string()));
                }
                Ok(id)
            }
            Err(e) => Err(e),
        }
    }

    // ── Transaction lifecycle ────────────────────────────────────────

    /// Begin a transaction. Always returns a fresh non-zero id; ids are
    /// never reused. Under the serialized scheme a second concurrent
    /// begin fails `TxnAlreadyRunning`.
    pub fn begin(&self) -> KvtResult<TxnId> {
        let mut inner = self.inner.lock();
        if self.scheme == CcScheme::Serialized && inner.current_txn.is_some() {
            return Err(KvtError::TxnAlreadyRunning);
        }
        let tx_id = TxnId(inner.next_txn_id);
        inner.next_txn_id += 1;
        inner.txns.insert(tx_id, TxnContext::new(tx_id));
        if self.scheme == CcScheme::Serialized {
            inner.current_txn = Some(tx_id);
        }
        self.stats.record_begin();
        tracing::debug!(%tx_id, scheme = %self.scheme, "transaction begin");
        Ok(tx_id)
    }

    /// Commit: validate (scheme-dependent) and install the buffered
    /// writes and deletes atomically. The context is destroyed whether
    /// the commit succeeds or fails validation.
    pub fn commit(&self, tx_id: TxnId) -> KvtResult<()> {
        if tx_id.is_auto_commit() {
            return Err(KvtError::TxnNotFound(tx_id));
        }
        let mut inner = self.inner.lock();
        let ctx = inner.txns.remove(&tx_id).ok_or(KvtError::TxnNotFound(tx_id))?;
        ctx.debug_validate();
        if inner.current_txn == Some(tx_id) {
            inner.current_txn = None;
        }
        let result = match self.scheme {
            // Nothing is ever buffered without coordination.
            CcScheme::NoCc => Ok(()),
            CcScheme::Serialized => {
                inner.install_serialized(ctx);
                Ok(())
            }
            CcScheme::TwoPhaseLocking => {
                inner.commit_locking(ctx);
                Ok(())
            }
            CcScheme::Optimistic => inner.commit_optimistic(ctx),
        };
        match &result {
            Ok(()) => {
                self.stats.record_commit();
                tracing::debug!(%tx_id, "transaction committed");
            }
            Err(e) => {
                self.stats.record_validation_failure();
                tracing::warn!(%tx_id, error = %e, "commit failed, context discarded");
            }
        }
        result
    }

    /// Discard the context; under the locking scheme, release every lock
    /// it holds. Always succeeds for a live transaction.
    pub fn rollback(&self, tx_id: TxnId) -> KvtResult<()> {
        if tx_id.is_auto_commit() {
            return Err(KvtError::TxnNotFound(tx_id));
        }
        let mut inner = self.inner.lock();
        let ctx = inner.txns.remove(&tx_id).ok_or(KvtError::TxnNotFound(tx_id))?;
        if inner.current_txn == Some(tx_id) {
            inner.current_txn = None;
        }
        if self.scheme == CcScheme::TwoPhaseLocking {
            inner.release_locks(&ctx);
        }
        self.stats.record_rollback();
        tracing::debug!(%tx_id, "transaction rolled back");
        Ok(())
    }

    /// Number of live transaction contexts.
    pub fn active_txn_count(&self) -> usize {
        self.inner.lock().txns.len()
    }

    // ── Data operations ──────────────────────────────────────────────

    pub fn get(&self, tx_id: TxnId, table: TableId, key: &[u8]) -> KvtResult<ByteString> {
        let mut inner = self.inner.lock();
        if tx_id.is_auto_commit() {
            self.stats.record_one_shot();
            return match self.scheme {
                CcScheme::TwoPhaseLocking => inner.get_one_shot_locking(table, key),
                _ => inner.get_direct(table, key),
            };
        }
        let result = match self.scheme {
            CcScheme::NoCc => {
                inner.ensure_txn(tx_id)?;
                inner.get_direct(table, key)
            }
            CcScheme::Serialized => inner.get_serialized(tx_id, table, key),
            CcScheme::TwoPhaseLocking => inner.get_locking(tx_id, table, key),
            CcScheme::Optimistic => inner.get_optimistic(tx_id, table, key),
        };
        if matches!(result, Err(KvtError::KeyIsLocked)) {
            self.stats.record_lock_conflict();
        }
        result
    }

    pub fn set(&self, tx_id: TxnId, table: TableId, key: &[u8], value: &[u8]) -> KvtResult<()> {
        let mut inner = self.inner.lock();
        if tx_id.is_auto_commit() {
            if !self.scheme.allows_one_shot_writes() {
                return Err(KvtError::OneShotWriteNotAllowed);
            }
            self.stats.record_one_shot();
            return inner.set_direct(table, key, value);
        }
        let result = match self.scheme {
            CcScheme::NoCc => {
                inner.ensure_txn(tx_id)?;
                inner.set_direct(table, key, value)
            }
            CcScheme::Serialized => inner.set_serialized(tx_id, table, key, value),
            CcScheme::TwoPhaseLocking => inner.set_locking(tx_id, table, key, value),
            CcScheme::Optimistic => inner.set_optimistic(tx_id, table, key, value),
        };
        if matches!(result, Err(KvtError::KeyIsLocked)) {
            self.stats.record_lock_conflict();
        }
        result
    }

    pub fn del(&self, tx_id: TxnId, table: TableId, key: &[u8]) -> KvtResult<()> {
        let mut inner = self.inner.lock();
        if tx_id.is_auto_commit() {
            if !self.scheme.allows_one_shot_writes() {
                return Err(KvtError::OneShotDeleteNotAllowed);
            }
            self.stats.record_one_shot();
            return inner.del_direct(table, key);
        }
        let result = match self.scheme {
            CcScheme::NoCc => {
                inner.ensure_txn(tx_id)?;
                inner.del_direct(table, key)
            }
            CcScheme::Serialized => inner.del_serialized(tx_id, table, key),
            CcScheme::TwoPhaseLocking => inner.del_locking(tx_id, table, key),
            CcScheme::Optimistic => inner.del_optimistic(tx_id, table, key),
        };
        if matches!(result, Err(KvtError::KeyIsLocked)) {
            self.stats.record_lock_conflict();
        }
        result
    }

    /// Range scan over `[key_start, key_end]`, both ends inclusive.
    /// Results are sorted by key and truncated to at most `limit` items.
    /// Only range-partitioned tables accept scans.
    pub fn scan(
        &self,
        tx_id: TxnId,
        table: TableId,
        key_start: &[u8],
        key_end: &[u8],
        limit: usize,
    ) -> KvtResult<Vec<(ByteString, ByteString)>> {
        let mut inner = self.inner.lock();
        if tx_id.is_auto_commit() {
            self.stats.record_one_shot();
            return match self.scheme {
                CcScheme::TwoPhaseLocking => {
                    inner.scan_one_shot_locking(table, key_start, key_end, limit)
                }
                _ => inner.scan_direct(table, key_start, key_end, limit),
            };
        }
        let result = match self.scheme {
            CcScheme::NoCc => {
                inner.ensure_txn(tx_id)?;
                inner.scan_direct(table, key_start, key_end, limit)
            }
            CcScheme::Serialized => inner.scan_serialized(tx_id, table, key_start, key_end, limit),
            CcScheme::TwoPhaseLocking => inner.scan_locking(tx_id, table, key_start, key_end, limit),
            CcScheme::Optimistic => inner.scan_optimistic(tx_id, table, key_start, key_end, limit),
        };
        if matches!(result, Err(KvtError::KeyIsLocked)) {
            self.stats.record_lock_conflict();
        }
        result
    }
}
