//! Direct (uncoordinated) operations and the serialized scheme.
//!
//! Direct operations serve one-shot auto-commit calls and the no-cc
//! scheme: they read and write committed state with no buffering. The
//! serialized scheme buffers through a context like the other schemes,
//! but conflict detection is mutual exclusion at `begin`, so commit
//! installs without validation.

use std::collections::BTreeMap;
use std::ops::Bound::Included;

use kvt_common::error::{KvtError, KvtResult};
use kvt_common::types::{ByteString, TableId, TxnId};

use crate::engine::EngineInner;
use crate::table::{Entry, EntryMeta};
use crate::txn::{FqKey, Observation, ObservedVersion};

impl EngineInner {
    // ── Direct operations ────────────────────────────────────────────

    pub(crate) fn get_direct(&self, table: TableId, key: &[u8]) -> KvtResult<ByteString> {
        let t = self.catalog.table(table)?;
        t.get_committed(key).cloned().ok_or(KvtError::KeyNotFound)
    }

    pub(crate) fn set_direct(&mut self, table: TableId, key: &[u8], value: &[u8]) -> KvtResult<()> {
        let t = self.catalog.table_mut(table)?;
        t.data.insert(
            key.to_vec(),
            Entry::committed(value.to_vec(), EntryMeta::Unlocked),
        );
        Ok(())
    }

    pub(crate) fn del_direct(&mut self, table: TableId, key: &[u8]) -> KvtResult<()> {
        let t = self.catalog.table_mut(table)?;
        match t.data.remove(key) {
            Some(_) => Ok(()),
            None => Err(KvtError::KeyNotFound),
        }
    }

    pub(crate) fn scan_direct(
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
            if let Some(v) = &e.value {
                out.push((k.clone(), v.clone()));
            }
        }
        Ok(out)
    }

    // ── Serialized scheme ────────────────────────────────────────────

    pub(crate) fn get_serialized(
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
        let value = self
            .catalog
            .table(table)?
            .get_committed(key)
            .cloned()
            .ok_or(KvtError::KeyNotFound)?;
        ctx.read_set.insert(
            fq,
            Observation {
                value: Some(value.clone()),
                version: ObservedVersion::Version(0),
            },
        );
        Ok(value)
    }

    pub(crate) fn set_serialized(
        &mut self,
        tx_id: TxnId,
        table: TableId,
        key: &[u8],
        value: &[u8],
    ) -> KvtResult<()> {
        self.ensure_table(table)?;
        let ctx = self.txns.get_mut(&tx_id).ok_or(KvtError::TxnNotFound(tx_id))?;
        ctx.stage_write(FqKey::new(table, key), value.to_vec(), None);
        Ok(())
    }

    pub(crate) fn del_serialized(
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
        if self.catalog.table(table)?.get_committed(key).is_none() {
            return Err(KvtError::KeyNotFound);
        }
        ctx.stage_delete(fq);
        Ok(())
    }

    pub(crate) fn scan_serialized(
        &mut self,
        tx_id: TxnId,
        table: TableId,
        key_start: &[u8],
        key_end: &[u8],
        limit: usize,
    ) -> KvtResult<Vec<(ByteString, ByteString)>> {
        self.ensure_txn(tx_id)?;
        self.scan_merged(tx_id, table, key_start, key_end, limit)
    }

    /// Shared scan composition for the non-locking schemes: committed
    /// entries overlaid with the transaction's pending writes, pending
    /// deletes skipped, truncated after the merge.
    pub(crate) fn scan_merged(
        &self,
        tx_id: TxnId,
        table: TableId,
        key_start: &[u8],
        key_end: &[u8],
        limit: usize,
    ) -> KvtResult<Vec<(ByteString, ByteString)>> {
        let t = self.catalog.table(table)?;
        if !t.partitioning.supports_scan() {
            return Err(KvtError::NotRangePartitioned(table));
        }
        let ctx = self.txns.get(&tx_id).ok_or(KvtError::TxnNotFound(tx_id))?;
        if key_start > key_end {
            return Ok(Vec::new());
        }
        let mut merged: BTreeMap<ByteString, ByteString> = BTreeMap::new();
        for (k, e) in t
            .data
            .range::<[u8], _>((Included(key_start), Included(key_end)))
        {
            let fq = FqKey::new(table, k.clone());
            if ctx.delete_set.contains(&fq) {
                continue;
            }
            if let Some(w) = ctx.write_set.get(&fq) {
                merged.insert(k.clone(), w.value.clone());
            } else if let Some(v) = &e.value {
                merged.insert(k.clone(), v.clone());
            }
        }
        // Keys that exist only in the write set still belong in the result.
        let lo = FqKey::new(table, key_start.to_vec());
        let hi = FqKey::new(table, key_end.to_vec());
        for (fq, w) in ctx.write_set.range(lo..=hi) {
            merged.insert(fq.key.clone(), w.value.clone());
        }
        Ok(merged.into_iter().take(limit).collect())
    }

    /// Serialized commit: install writes in order, erase deletes, discard
    /// the read set.
    pub(crate) fn install_serialized(&mut self, ctx: crate::txn::TxnContext) {
        for (fq, w) in ctx.write_set {
            if let Ok(t) = self.catalog.table_mut(fq.table) {
                t.data
                    .insert(fq.key, Entry::committed(w.value, EntryMeta::Unlocked));
            }
        }
        for fq in ctx.delete_set {
            if let Ok(t) = self.catalog.table_mut(fq.table) {
                t.data.remove(&fq.key);
            }
        }
    }
}
