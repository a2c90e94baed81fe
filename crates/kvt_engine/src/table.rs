//! In-memory tables: ordered key → entry maps plus entry metadata.

use std::collections::BTreeMap;

use kvt_common::types::{ByteString, Partitioning, TableId, TxnId};

/// Concurrency metadata attached to a table entry. Which variants occur
/// depends on the engine's scheme: the locking scheme uses `LockedBy`,
/// the optimistic scheme uses `Version`, the others leave entries
/// `Unlocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMeta {
    Unlocked,
    LockedBy(TxnId),
    Version(u64),
}

impl EntryMeta {
    pub fn lock_owner(self) -> Option<TxnId> {
        match self {
            EntryMeta::LockedBy(owner) => Some(owner),
            _ => None,
        }
    }

    pub fn version(self) -> u64 {
        match self {
            EntryMeta::Version(v) => v,
            _ => 0,
        }
    }
}

/// A table entry: the committed value plus concurrency metadata.
///
/// `value` is `None` while a transaction holds a lock reservation on a
/// key that has no committed value yet. The lock must live in the entry
/// so that conflicting writers see it, but the key must stay invisible
/// to readers; reservations are removed when the lock is released
/// without a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Option<ByteString>,
    pub meta: EntryMeta,
}

impl Entry {
    pub fn committed(value: ByteString, meta: EntryMeta) -> Self {
        Self {
            value: Some(value),
            meta,
        }
    }

    /// Lock placeholder for a key with no committed value.
    pub fn reservation(owner: TxnId) -> Self {
        Self {
            value: None,
            meta: EntryMeta::LockedBy(owner),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.value.is_some()
    }

    pub fn locked_by(&self, tx_id: TxnId) -> bool {
        self.meta.lock_owner() == Some(tx_id)
    }

    pub fn locked_by_other(&self, tx_id: TxnId) -> bool {
        matches!(self.meta.lock_owner(), Some(owner) if owner != tx_id)
    }

    pub fn is_locked(&self) -> bool {
        self.meta.lock_owner().is_some()
    }
}

/// An in-memory table. The data map keeps keys in lexicographic order so
/// range scans come straight off the map.
#[derive(Debug)]
pub struct Table {
    pub id: TableId,
    pub name: String,
    pub partitioning: Partitioning,
    pub data: BTreeMap<ByteString, Entry>,
}

impl Table {
    pub fn new(id: TableId, name: impl Into<String>, partitioning: Partitioning) -> Self {
        Self {
            id,
            name: name.into(),
            partitioning,
            data: BTreeMap::new(),
        }
    }

    /// Committed value for `key`, if any. Lock reservations do not count.
    pub fn get_committed(&self, key: &[u8]) -> Option<&ByteString> {
        self.data.get(key).and_then(|e| e.value.as_ref())
    }

    /// Version of the committed entry for `key`, or `None` when the key
    /// has no committed entry (optimistic scheme).
    pub fn committed_version(&self, key: &[u8]) -> Option<u64> {
        self.data
            .get(key)
            .filter(|e| e.is_committed())
            .map(|e| e.meta.version())
    }
}
