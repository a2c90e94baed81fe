//! Per-transaction state: read, write and delete sets over
//! fully-qualified keys.

use std::collections::{BTreeMap, BTreeSet};

use kvt_common::types::{ByteString, TableId, TxnId};

/// A key qualified by its table. Deriving `Ord` over `(table, key)` keeps
/// the composition injective without reserving a separator byte, and
/// orders context sets by table then key so per-table ranges come off the
/// maps directly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FqKey {
    pub table: TableId,
    pub key: ByteString,
}

impl FqKey {
    pub fn new(table: TableId, key: impl Into<ByteString>) -> Self {
        Self {
            table,
            key: key.into(),
        }
    }
}

/// What a transaction saw about an entry when it observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedVersion {
    /// The key had no committed entry.
    Absent,
    /// Committed entry carrying this version (optimistic scheme; the
    /// other non-locking schemes record version 0, which their entries
    /// always carry).
    Version(u64),
    /// The entry is read-locked by this transaction (locking scheme).
    Locked,
}

/// A read-set record: the value seen plus the evidence needed at commit
/// time (a version to re-validate, or a lock to release).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub value: Option<ByteString>,
    pub version: ObservedVersion,
}

/// A buffered write: the new value plus the observation carried forward
/// for commit-time validation. `observed` is `None` for a blind
/// overwrite that is installed without validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub value: ByteString,
    pub observed: Option<ObservedVersion>,
}

/// The full per-transaction state. Created by `begin`, mutated only by
/// the owning transaction, destroyed by commit or rollback.
#[derive(Debug)]
pub struct TxnContext {
    pub id: TxnId,
    pub read_set: BTreeMap<FqKey, Observation>,
    pub write_set: BTreeMap<FqKey, PendingWrite>,
    pub delete_set: BTreeSet<FqKey>,
}

impl TxnContext {
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            read_set: BTreeMap::new(),
            write_set: BTreeMap::new(),
            delete_set: BTreeSet::new(),
        }
    }

    /// Stage a write, dropping any pending delete of the same key.
    pub fn stage_write(&mut self, fq: FqKey, value: ByteString, observed: Option<ObservedVersion>) {
        self.delete_set.remove(&fq);
        self.write_set.insert(fq, PendingWrite { value, observed });
    }

    /// Stage a delete, dropping any pending write of the same key.
    /// Returns the observation the dropped write carried, if there was
    /// one.
    pub fn stage_delete(&mut self, fq: FqKey) -> Option<Option<ObservedVersion>> {
        let prior = self.write_set.remove(&fq).map(|w| w.observed);
        self.delete_set.insert(fq);
        prior
    }

    /// Every key this context has touched, across all three sets.
    pub fn touched_keys(&self) -> impl Iterator<Item = &FqKey> {
        self.read_set
            .keys()
            .chain(self.write_set.keys())
            .chain(self.delete_set.iter())
    }

    /// A key never sits in both the write set and the delete set.
    pub fn debug_validate(&self) {
        debug_assert!(
            self.write_set.keys().all(|k| !self.delete_set.contains(k)),
            "{}: key present in both write set and delete set",
            self.id
        );
    }
}
