//! Optimistic scheme: no locks, version observations re-validated at
//! commit.
//!
//! Reads record the entry version they saw. Writes carry an observation
//! when one exists: a version lifted from the read set, or the fact that
//! the key was absent at staging time. A blind overwrite of an existing
//! key carries no observation and installs without validation. Commit
//! re-checks every observation under the engine-wide lock and installs
//! with `version := max(observed, current) + 1`; any mismatch aborts
//! with `StaleData` and the context is destroyed.

use std::collections::BTreeMap;
use std::ops::Bound::Included;

use kvt_common::error::{KvtError, KvtResult};
use kvt_common::types::{ByteString, TableId, TxnId};

use crate::engine::EngineInner;
use crate::table::{Entry, EntryMeta};
use crate::txn::{FqKey, Observation, ObservedVersion, TxnContext};

impl EngineInner {
    pub(crate) fn get_optimistic(
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
        let t = self.catalog.table(table)?;
        let entry = t.data.get(key).ok_or(KvtError::KeyNotFound)?;
        let value = entry.value.clone().ok_or(KvtError::KeyNotFound)?;
        ctx.read_set.insert(
            fq,
            Observation {
                value: Some(value.clone()),
                version: ObservedVersion::Version(entry.meta.version()),
            },
        );
        Ok(value)
    }

    pub(crate) fn set_optimistic(
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
        let observed = if let Some(obs) = ctx.read_set.remove(&fq) {
            // Lift the read observation into the write; its version is
            // re-validated at commit.
            Some(obs.version)
        } else {
            match self.catalog.table(table)?.committed_version(key) {
                // A write to an absent key observes the absence: commit
                // requires the key to still be absent.
                None => Some(ObservedVersion::Absent),
                // Blind overwrite: installed without validation.
                Some(_) => None,
            }
        };
        ctx.stage_write(fq, value.to_vec(), observed);
        Ok(())
    }

    pub(crate) fn del_optimistic(
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
            let prior = ctx.stage_delete(fq.clone()).flatten();
            // The delete must keep version evidence in the read set so
            // commit-time validation still covers the key.
            if !ctx.read_set.contains_key(&fq) {
                let version = match prior {
                    Some(v) => v,
                    None => match self.catalog.table(table)?.committed_version(key) {
                        Some(cur) => ObservedVersion::Version(cur),
                        None => ObservedVersion::Absent,
                    },
                };
                ctx.read_set.insert(
                    fq,
                    Observation {
                        value: None,
                        version,
                    },
                );
            }
            return Ok(());
        }
        if let Some(obs) = ctx.read_set.get(&fq) {
            if obs.version == ObservedVersion::Absent {
                return Err(KvtError::KeyNotFound);
            }
            ctx.delete_set.insert(fq);
            return Ok(());
        }
        let version = self
            .catalog
            .table(table)?
            .committed_version(key)
            .ok_or(KvtError::KeyNotFound)?;
        ctx.read_set.insert(
            fq.clone(),
            Observation {
                value: None,
                version: ObservedVersion::Version(version),
            },
        );
        ctx.delete_set.insert(fq);
        Ok(())
    }

    /// Merged scan. Keys returned from committed state are recorded in
    /// the read set (with their versions) so a later commit re-validates
    /// what the scan showed; keys visited but truncated away by `limit`
    /// are not recorded.
    pub(crate) fn scan_optimistic(
        &mut self,
        tx_id: TxnId,
        table: TableId,
        key_start: &[u8],
        key_end: &[u8],
        limit: usize,
    ) -> KvtResult<Vec<(ByteString, ByteString)>> {
        self.ensure_txn(tx_id)?;
        // Value plus its committed version when sourced from the table.
        let mut merged: BTreeMap<ByteString, (ByteString, Option<u64>)> = BTreeMap::new();
        {
            let t = self.catalog.table(table)?;
            if !t.partitioning.supports_scan() {
                return Err(KvtError::NotRangePartitioned(table));
            }
            let ctx = self.txns.get(&tx_id).ok_or(KvtError::TxnNotFound(tx_id))?;
            if key_start > key_end {
                return Ok(Vec::new());
            }
            for (k, e) in t
                .data
                .range::<[u8], _>((Included(key_start), Included(key_end)))
            {
                let fq = FqKey::new(table, k.clone());
                if ctx.delete_set.contains(&fq) {
                    continue;
                }
                if let Some(w) = ctx.write_set.get(&fq) {
                    merged.insert(k.clone(), (w.value.clone(), None));
                } else if let Some(v) = &e.value {
                    merged.insert(k.clone(), (v.clone(), Some(e.meta.version())));
                }
            }
            let lo = FqKey::new(table, key_start.to_vec());
            let hi = FqKey::new(table, key_end.to_vec());
            for (fq, w) in ctx.write_set.range(lo..=hi) {
                merged.insert(fq.key.clone(), (w.value.clone(), None));
            }
        }
        let truncated: Vec<(ByteString, ByteString, Option<u64>)> = merged
            .into_iter()
            .take(limit)
            .map(|(k, (v, ver))| (k, v, ver))
            .collect();

        let ctx = self.txns.get_mut(&tx_id).ok_or(KvtError::TxnNotFound(tx_id))?;
        let mut out = Vec::with_capacity(truncated.len());
        for (k, v, ver) in truncated {
            if let Some(version) = ver {
                ctx.read_set
                    .entry(FqKey::new(table, k.clone()))
                    .or_insert(Observation {
                        value: Some(v.clone()),
                        version: ObservedVersion::Version(version),
                    });
            }
            out.push((k, v));
        }
        Ok(out)
    }

    // ── Commit ───────────────────────────────────────────────────────

    /// Validation then installation, both under the engine-wide lock, so
    /// validate + install is atomic with respect to other commits.
    pub(crate) fn commit_optimistic(&mut self, ctx: TxnContext) -> KvtResult<()> {
        let tx_id = ctx.id;
        for (fq, obs) in &ctx.read_set {
            self.validate_observation(fq, obs.version, tx_id)?;
        }
        for (fq, w) in &ctx.write_set {
            if let Some(version) = w.observed {
                self.validate_observation(fq, version, tx_id)?;
            }
        }
        for (fq, w) in ctx.write_set {
            let Ok(t) = self.catalog.table_mut(fq.table) else {
                continue;
            };
            let observed = match w.observed {
                Some(ObservedVersion::Version(v)) => v,
                _ => 0,
            };
            let current = t.committed_version(&fq.key).unwrap_or(0);
            let next = observed.max(current) + 1;
            t.data
                .insert(fq.key, Entry::committed(w.value, EntryMeta::Version(next)));
        }
        for fq in ctx.delete_set {
            if let Ok(t) = self.catalog.table_mut(fq.table) {
                t.data.remove(&fq.key);
            }
        }
        Ok(())
    }

    fn validate_observation(
        &self,
        fq: &FqKey,
        observed: ObservedVersion,
        tx_id: TxnId,
    ) -> KvtResult<()> {
        let current = self
            .catalog
            .table(fq.table)
            .ok()
            .and_then(|t| t.committed_version(&fq.key));
        let still_valid = match observed {
            ObservedVersion::Absent => current.is_none(),
            ObservedVersion::Version(v) => current == Some(v),
            // Not produced under the optimistic scheme.
            ObservedVersion::Locked => true,
        };
        if still_valid {
            Ok(())
        } else {
            Err(KvtError::StaleData(tx_id))
        }
    }
}
