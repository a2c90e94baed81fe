//! Two-phase locking scheme: entry-granular locks, acquired
//! non-blocking and held until commit or rollback (strict 2PL).
//!
//! Lock acquisition never waits: a key locked by another transaction
//! fails the operation with `KeyIsLocked` and the caller aborts or
//! retries. Deadlock cannot arise because nothing blocks.

use std::collections::BTreeMap;
use std::ops::Bound::Included;

use kvt_common::error::{KvtError, KvtResult};
use kvt_common::types::{ByteString, TableId, TxnId};

use crate::engine::EngineInner;
use crate::table::{Entry, EntryMeta};
use crate::txn::{FqKey, Observation, ObservedVersion, TxnContext};

impl EngineInner {
    // ── One-shot operations ──────────────────────────────────────────

    /// One-shot reads surface foreign locks instead of returning a value
    /// that a concurrent transaction may be about to replace.
    pub(crate) fn get_one_shot_locking(&self, table: TableId, key: &[u8]) -> KvtResult<ByteString> {
        let t = self.catalog.table(table)?;
        match t.data.get(key) {
            None => Err(KvtError::KeyNotFound),
            Some(e) if e.is_locked() => Err(KvtError::KeyIsLocked),
            Some(e) => e.value.clone().ok_or(KvtError::KeyNotFound),
        }
    }

    pub(crate) fn scan_one_shot_locking(
        &self,
        table: TableId,
        key_start: &[u8],
        key_end: &[u8],
        limit: usize,
    ) -> KvtResult<Vec<(ByteString, ByteString)>> {
        let t = self.catalog.table(table)?;
        if !t.partitioning.supports_scan() {
            return Err(KvtError::NotRangePartitioned(table));
        }
        let mut out = Vec::new();
        if key_start > key_end {
            return Ok(out);
        }
        for (k, e) in t
            .data
            .range::<[u8], _>((Included(key_start), Included(key_end)))
        {
            if out.len() >= limit {
                break;
            }
            if e.is_locked() {
                return Err(KvtError::KeyIsLocked);
            }
            if let Some(v) = &e.value {
                out.push((k.clone(), v.clone()));
            }
        }
        Ok(out)
    }

    // ── Transactional operations ─────────────────────────────────────

    pub(crate) fn get_locking(
        &mut self,
        tx_id: TxnId,
        table: TableId,
        key: &[u8],
    ) -> KvtResult<ByteString> {
        self.ensure_table(table)?;
        let fq = FqKey::new(table, key);
        let ctx = self.txns.get_mut(&tx_id).ok_or(KvtError::TxnNotFound(tx_id))?;
        if let Some(w) = ctx.write_set.get(&fq) {
            return Ok(w.value.clone());
        }
        if ctx.delete_set.contains(&fq) {
            return Err(KvtError::KeyIsDeleted);
        }
        if let Some(obs) = ctx.read_set.get(&fq) {
            return obs.value.clone().ok_or(KvtError::KeyNotFound);
        }
        let t = self.catalog.table_mut(table)?;
        let entry = t.data.get_mut(key).ok_or(KvtError::KeyNotFound)?;
        if entry.locked_by_other(tx_id) {
            return Err(KvtError::KeyIsLocked);
        }
        let value = entry.value.clone().ok_or(KvtError::KeyNotFound)?;
        entry.meta = EntryMeta::LockedBy(tx_id);
        ctx.read_set.insert(
            fq,
            Observation {
                value: Some(value.clone()),
                version: ObservedVersion::Locked,
            },
        );
        Ok(value)
    }

    pub(crate) fn set_locking(
        &mut self,
        tx_id: TxnId,
        table: TableId,
        key: &[u8],
        value: &[u8],
    ) -> KvtResult<()> {
        self.ensure_table(table)?;
        let fq = FqKey::new(table, key);
        let ctx = self.txns.get_mut(&tx_id).ok_or(KvtError::TxnNotFound(tx_id))?;
        if let Some(w) = ctx.write_set.get_mut(&fq) {
            w.value = value.to_vec();
            return Ok(());
        }
        let t = self.catalog.table_mut(table)?;
        match t.data.get_mut(key) {
            Some(e) if e.locked_by_other(tx_id) => return Err(KvtError::KeyIsLocked),
            Some(e) => e.meta = EntryMeta::LockedBy(tx_id),
            None => {
                // The lock for a key with no committed value lives in a
                // reservation entry, invisible to readers.
                t.data.insert(key.to_vec(), Entry::reservation(tx_id));
            }
        }
        // A prior read observation is subsumed by the write.
        ctx.read_set.remove(&fq);
        ctx.stage_write(fq, value.to_vec(), None);
        Ok(())
    }

    pub(crate) fn del_locking(
        &mut self,
        tx_id: TxnId,
        table: TableId,
        key: &[u8],
    ) -> KvtResult<()> {
        self.ensure_table(table)?;
        let fq = FqKey::new(table, key);
        let ctx = self.txns.get_mut(&tx_id).ok_or(KvtError::TxnNotFound(tx_id))?;
        if ctx.delete_set.contains(&fq) {
            return Err(KvtError::KeyNotFound);
        }
        if ctx.write_set.contains_key(&fq) {
            ctx.stage_delete(fq);
            return Ok(());
        }
        let t = self.catalog.table_mut(table)?;
        let entry = match t.data.get_mut(key) {
            None => return Err(KvtError::KeyNotFound),
            Some(e) => e,
        };
        if entry.locked_by_other(tx_id) {
            return Err(KvtError::KeyIsLocked);
        }
        if !entry.is_committed() {
            return Err(KvtError::KeyNotFound);
        }
        entry.meta = EntryMeta::LockedBy(tx_id);
        ctx.stage_delete(fq);
        Ok(())
    }

    /// Scan acquires a read lock on every committed entry it visits. If a
    /// later entry turns out to be locked by another transaction, the
    /// locks acquired by this scan (and only those) are released before
    /// failing.
    pub(crate) fn scan_locking(
        &mut self,
        tx_id: TxnId,
        table: TableId,
        key_start: &[u8],
        key_end: &[u8],
        limit: usize,
    ) -> KvtResult<Vec<(ByteString, ByteString)>> {
        self.ensure_txn(tx_id)?;
        {
            let t = self.catalog.table(table)?;
            if !t.partitioning.supports_scan() {
                return Err(KvtError::NotRangePartitioned(table));
            }
        }
        if key_start > key_end {
            return Ok(Vec::new());
        }

        let mut merged: BTreeMap<ByteString, ByteString> = BTreeMap::new();
        let mut newly_locked: Vec<ByteString> = Vec::new();
        let mut observations: Vec<(FqKey, Observation)> = Vec::new();
        let mut conflict = false;
        {
            let ctx = self.txns.get(&tx_id).ok_or(KvtError::TxnNotFound(tx_id))?;
            let t = self.catalog.table_mut(table)?;
            for (k, e) in t
                .data
                .range_mut::<[u8], _>((Included(key_start), Included(key_end)))
            {
                let fq = FqKey::new(table, k.clone());
                if ctx.delete_set.contains(&fq) {
                    continue;
                }
                if let Some(w) = ctx.write_set.get(&fq) {
                    merged.insert(k.clone(), w.value.clone());
                    continue;
                }
                if e.locked_by_other(tx_id) {
                    conflict = true;
                    break;
                }
                let Some(v) = e.value.clone() else {
                    continue;
                };
                if !e.locked_by(tx_id) {
                    e.meta = EntryMeta::LockedBy(tx_id);
                    newly_locked.push(k.clone());
                    observations.push((
                        fq,
                        Observation {
                            value: Some(v.clone()),
                            version: ObservedVersion::Locked,
                        },
                    ));
                }
                merged.insert(k.clone(), v);
            }
            if conflict {
                for k in &newly_locked {
                    if let Some(e) = t.data.get_mut(k) {
                        e.meta = EntryMeta::Unlocked;
                    }
                }
            }
        }
        if conflict {
            return Err(KvtError::KeyIsLocked);
        }

        let ctx = self.txns.get_mut(&tx_id).ok_or(KvtError::TxnNotFound(tx_id))?;
        for (fq, obs) in observations {
            ctx.read_set.entry(fq).or_insert(obs);
        }
        let lo = FqKey::new(table, key_start.to_vec());
        let hi = FqKey::new(table, key_end.to_vec());
        for (fq, w) in ctx.write_set.range(lo..=hi) {
            merged.insert(fq.key.clone(), w.value.clone());
        }
        Ok(merged.into_iter().take(limit).collect())
    }

    // ── Commit / rollback ────────────────────────────────────────────

    /// Install writes (clearing their locks), erase deletions still
    /// owned by this transaction, release the remaining read locks.
    pub(crate) fn commit_locking(&mut self, ctx: TxnContext) {
        let tx_id = ctx.id;
        for (fq, w) in &ctx.write_set {
            if let Ok(t) = self.catalog.table_mut(fq.table) {
                t.data.insert(
                    fq.key.clone(),
                    Entry::committed(w.value.clone(), EntryMeta::Unlocked),
                );
            }
        }
        for fq in &ctx.delete_set {
            if let Ok(t) = self.catalog.table_mut(fq.table) {
                let owned = t
                    .data
                    .get(&fq.key)
                    .map(|e| e.locked_by(tx_id))
                    .unwrap_or(false);
                if owned {
                    t.data.remove(&fq.key);
                }
            }
        }
        for fq in ctx.read_set.keys() {
            if let Ok(t) = self.catalog.table_mut(fq.table) {
                if let Some(e) = t.data.get_mut(&fq.key) {
                    if e.locked_by(tx_id) {
                        e.meta = EntryMeta::Unlocked;
                    }
                }
            }
        }
    }

    /// Release every lock this context holds. Reservations (locks on
    /// keys that never had a committed value) are removed outright.
    pub(crate) fn release_locks(&mut self, ctx: &TxnContext) {
        for fq in ctx.touched_keys() {
            let Ok(t) = self.catalog.table_mut(fq.table) else {
                continue;
            };
            let remove = match t.data.get_mut(&fq.key) {
                Some(e) if e.locked_by(ctx.id) => {
                    if e.is_committed() {
                        e.meta = EntryMeta::Unlocked;
                        false
                    } else {
                        true
                    }
                }
                _ => false,
            };
            if remove {
                t.data.remove(&fq.key);
            }
        }
    }
}
