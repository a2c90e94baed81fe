//! Column-family operations over the engine in one of two physical
//! layouts.

use std::collections::BTreeMap;
use std::sync::Arc;

use kvt_common::config::{AdapterConfig, ColumnLayout};
use kvt_common::error::KvtError;
use kvt_common::types::{BatchOp, BatchOpResult, ByteString, TableId, TxnId};
use kvt_engine::KvtEngine;

use crate::codec::{self, ColumnValue};
use crate::{KcvError, KcvResult};

/// Reserved single-byte separator between key and column in the
/// composite-key layout (ASCII Unit Separator). Keys and columns under
/// that layout must not contain it.
pub const KEY_COLUMN_SEPARATOR: u8 = 0x1F;

/// Join key and column into a composite engine key. Rejects empty parts
/// and embedded separators, so no application key can forge another
/// key's composite.
pub fn make_composite_key(key: &[u8], column: &[u8]) -> KcvResult<ByteString> {
    if key.is_empty() {
        return Err(KcvError::EmptyKey);
    }
    if column.is_empty() {
        return Err(KcvError::EmptyColumn);
    }
    if contains_separator(key) || contains_separator(column) {
        return Err(KcvError::SeparatorNotAllowed);
    }
    let mut composite = Vec::with_capacity(key.len() + 1 + column.len());
    composite.extend_from_slice(key);
    composite.push(KEY_COLUMN_SEPARATOR);
    composite.extend_from_slice(column);
    Ok(composite)
}

/// Split a composite engine key at its first separator byte.
pub fn split_composite_key(composite: &[u8]) -> KcvResult<(ByteString, ByteString)> {
    let pos = composite
        .iter()
        .position(|&b| b == KEY_COLUMN_SEPARATOR)
        .ok_or_else(|| KcvError::InvalidFrame("composite key without separator".into()))?;
    Ok((composite[..pos].to_vec(), composite[pos + 1..].to_vec()))
}

fn contains_separator(bytes: &[u8]) -> bool {
    bytes.contains(&KEY_COLUMN_SEPARATOR)
}

/// Closed engine-scan bounds covering every composite entry of `key`:
/// every `key·SEP·c` with non-empty `c` sorts strictly between
/// `key·SEP` and `key·(SEP+1)`, and no other key's composites do.
fn prefix_bounds(key: &[u8]) -> (ByteString, ByteString) {
    let mut start = key.to_vec();
    start.push(KEY_COLUMN_SEPARATOR);
    let mut end = key.to_vec();
    end.push(KEY_COLUMN_SEPARATOR + 1);
    (start, end)
}

/// One column-level operation in an adapter batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KcvBatchOp {
    GetColumn {
        key: ByteString,
        column: ByteString,
    },
    SetColumn {
        key: ByteString,
        column: ByteString,
        value: ByteString,
    },
    DeleteColumn {
        key: ByteString,
        column: ByteString,
    },
}

/// The key-column-value store: one engine table viewed as a
/// key → (column → value) mapping.
pub struct KcvStore {
    engine: Arc<KvtEngine>,
    layout: ColumnLayout,
    scan_limit: usize,
}

impl KcvStore {
    pub fn new(engine: Arc<KvtEngine>, config: &AdapterConfig) -> Self {
        Self {
            engine,
            layout: config.layout,
            scan_limit: config.scan_limit,
        }
    }

    pub fn with_layout(engine: Arc<KvtEngine>, layout: ColumnLayout) -> Self {
        Self::new(
            engine,
            &AdapterConfig {
                layout,
                ..AdapterConfig::default()
            },
        )
    }

    pub fn layout(&self) -> ColumnLayout {
        self.layout
    }

    // ── Validation ───────────────────────────────────────────────────

    fn check_key(&self, key: &[u8]) -> KcvResult<()> {
        if key.is_empty() {
            return Err(KcvError::EmptyKey);
        }
        if self.layout == ColumnLayout::CompositeKey && contains_separator(key) {
            return Err(KcvError::SeparatorNotAllowed);
        }
        Ok(())
    }

    /// The serialized layout accepts any column bytes, the empty column
    /// included; the composite layout must be able to embed the column
    /// in a key.
    fn check_column(&self, column: &[u8]) -> KcvResult<()> {
        if self.layout == ColumnLayout::CompositeKey {
            if column.is_empty() {
                return Err(KcvError::EmptyColumn);
            }
            if contains_separator(column) {
                return Err(KcvError::SeparatorNotAllowed);
            }
        }
        Ok(())
    }

    /// Existing columns of `key` under the serialized layout. A key the
    /// engine does not know (or that this transaction deleted) simply has
    /// no columns yet; every other engine failure, a foreign lock above
    /// all, propagates.
    fn read_columns(&self, tx: TxnId, table: TableId, key: &[u8]) -> KcvResult<Vec<ColumnValue>> {
        match self.engine.get(tx, table, key) {
            Ok(frame) => codec::deserialize_columns(&frame),
            Err(KvtError::KeyNotFound | KvtError::KeyIsDeleted) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_columns(
        &self,
        tx: TxnId,
        table: TableId,
        key: &[u8],
        columns: &[ColumnValue],
    ) -> KcvResult<()> {
        let frame = codec::serialize_columns(columns)?;
        self.engine.set(tx, table, key, &frame)?;
        Ok(())
    }

    // ── Column operations ────────────────────────────────────────────

    pub fn set_column(
        &self,
        tx: TxnId,
        table: TableId,
        key: &[u8],
        column: &[u8],
        value: &[u8],
    ) -> KcvResult<()> {
        self.check_key(key)?;
        self.check_column(column)?;
        match self.layout {
            ColumnLayout::CompositeKey => {
                let composite = make_composite_key(key, column)?;
                self.engine.set(tx, table, &composite, value)?;
                Ok(())
            }
            ColumnLayout::SerializedColumns => {
                let mut columns = self.read_columns(tx, table, key)?;
                match codec::find_column(&columns, column) {
                    Ok(i) => columns[i].value = value.to_vec(),
                    Err(i) => columns.insert(i, ColumnValue::new(column, value)),
                }
                self.write_columns(tx, table, key, &columns)
            }
        }
    }

    pub fn get_column(
        &self,
        tx: TxnId,
        table: TableId,
        key: &[u8],
        column: &[u8],
    ) -> KcvResult<ByteString> {
        self.check_key(key)?;
        self.check_column(column)?;
        match self.layout {
            ColumnLayout::CompositeKey => {
                let composite = make_composite_key(key, column)?;
                match self.engine.get(tx, table, &composite) {
                    Ok(value) => Ok(value),
                    Err(KvtError::KeyNotFound | KvtError::KeyIsDeleted) => {
                        Err(KcvError::column_not_found(column))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            ColumnLayout::SerializedColumns => {
                let columns = self.read_columns(tx, table, key)?;
                match codec::find_column(&columns, column) {
                    Ok(i) => Ok(columns[i].value.clone()),
                    Err(_) => Err(KcvError::column_not_found(column)),
                }
            }
        }
    }

    pub fn delete_column(
        &self,
        tx: TxnId,
        table: TableId,
        key: &[u8],
        column: &[u8],
    ) -> KcvResult<()> {
        self.check_key(key)?;
        self.check_column(column)?;
        match self.layout {
            ColumnLayout::CompositeKey => {
                let composite = make_composite_key(key, column)?;
                match self.engine.del(tx, table, &composite) {
                    Ok(()) => Ok(()),
                    Err(KvtError::KeyNotFound) => Err(KcvError::column_not_found(column)),
                    Err(e) => Err(e.into()),
                }
            }
            ColumnLayout::SerializedColumns => {
                let mut columns = self.read_columns(tx, table, key)?;
                let i = codec::find_column(&columns, column)
                    .map_err(|_| KcvError::column_not_found(column))?;
                columns.remove(i);
                if columns.is_empty() {
                    // An empty column set deletes the key.
                    self.engine.del(tx, table, key)?;
                    Ok(())
                } else {
                    self.write_columns(tx, table, key, &columns)
                }
            }
        }
    }

    /// All columns of `key`, sorted ascending. A key with no columns
    /// yields an empty sequence.
    pub fn get_all_columns(
        &self,
        tx: TxnId,
        table: TableId,
        key: &[u8],
    ) -> KcvResult<Vec<ColumnValue>> {
        self.check_key(key)?;
        match self.layout {
            ColumnLayout::CompositeKey => {
                let (start, end) = prefix_bounds(key);
                let rows = self.engine.scan(tx, table, &start, &end, self.scan_limit)?;
                let mut out = Vec::with_capacity(rows.len());
                for (composite, value) in rows {
                    let (base, column) = split_composite_key(&composite)?;
                    debug_assert_eq!(base, key, "prefix scan escaped its key");
                    out.push(ColumnValue { column, value });
                }
                Ok(out)
            }
            ColumnLayout::SerializedColumns => self.read_columns(tx, table, key),
        }
    }

    /// Set several columns of one key. Existing columns not named stay;
    /// named ones are overwritten.
    pub fn set_columns(
        &self,
        tx: TxnId,
        table: TableId,
        key: &[u8],
        columns: &[ColumnValue],
    ) -> KcvResult<()> {
        self.check_key(key)?;
        if columns.is_empty() {
            return Err(KcvError::EmptyColumnSet);
        }
        for cv in columns {
            self.check_column(&cv.column)?;
        }
        match self.layout {
            ColumnLayout::CompositeKey => {
                for cv in columns {
                    let composite = make_composite_key(key, &cv.column)?;
                    self.engine.set(tx, table, &composite, &cv.value)?;
                }
                Ok(())
            }
            ColumnLayout::SerializedColumns => {
                let existing = self.read_columns(tx, table, key)?;
                let mut merged: BTreeMap<ByteString, ByteString> = existing
                    .into_iter()
                    .map(|cv| (cv.column, cv.value))
                    .collect();
                for cv in columns {
                    merged.insert(cv.column.clone(), cv.value.clone());
                }
                let merged: Vec<ColumnValue> = merged
                    .into_iter()
                    .map(|(column, value)| ColumnValue { column, value })
                    .collect();
                self.write_columns(tx, table, key, &merged)
            }
        }
    }

    /// Drop `key` and every column it holds. Deleting a key that has no
    /// columns is a no-op.
    pub fn delete_key(&self, tx: TxnId, table: TableId, key: &[u8]) -> KcvResult<()> {
        self.check_key(key)?;
        match self.layout {
            ColumnLayout::CompositeKey => {
                let columns = self.get_all_columns(tx, table, key)?;
                for cv in columns {
                    let composite = make_composite_key(key, &cv.column)?;
                    match self.engine.del(tx, table, &composite) {
                        Ok(()) | Err(KvtError::KeyNotFound) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(())
            }
            ColumnLayout::SerializedColumns => match self.engine.del(tx, table, key) {
                Ok(()) | Err(KvtError::KeyNotFound) => Ok(()),
                Err(e) => Err(e.into()),
            },
        }
    }

    /// Apply deletions then additions to one key. A deletion naming a
    /// column the key does not hold is skipped, matching the tolerant
    /// mutation semantics of graph hosts.
    pub fn mutate_columns(
        &self,
        tx: TxnId,
        table: TableId,
        key: &[u8],
        additions: &[ColumnValue],
        deletions: &[ByteString],
    ) -> KcvResult<()> {
        self.check_key(key)?;
        for cv in additions {
            self.check_column(&cv.column)?;
        }
        for column in deletions {
            self.check_column(column)?;
        }
        match self.layout {
            ColumnLayout::CompositeKey => {
                for column in deletions {
                    let composite = make_composite_key(key, column)?;
                    match self.engine.del(tx, table, &composite) {
                        Ok(()) => {}
                        Err(KvtError::KeyNotFound) => {
                            tracing::warn!(
                                column = %String::from_utf8_lossy(column),
                                "mutation deletion of a column the key does not hold"
                            );
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                for cv in additions {
                    let composite = make_composite_key(key, &cv.column)?;
                    self.engine.set(tx, table, &composite, &cv.value)?;
                }
                Ok(())
            }
            ColumnLayout::SerializedColumns => {
                let existing = self.read_columns(tx, table, key)?;
                let mut merged: BTreeMap<ByteString, ByteString> = existing
                    .into_iter()
                    .map(|cv| (cv.column, cv.value))
                    .collect();
                for column in deletions {
                    if merged.remove(column).is_none() {
                        tracing::warn!(
                            column = %String::from_utf8_lossy(column),
                            "mutation deletion of a column the key does not hold"
                        );
                    }
                }
                for cv in additions {
                    merged.insert(cv.column.clone(), cv.value.clone());
                }
                if merged.is_empty() {
                    match self.engine.del(tx, table, key) {
                        Ok(()) | Err(KvtError::KeyNotFound) => Ok(()),
                        Err(e) => Err(e.into()),
                    }
                } else {
                    let merged: Vec<ColumnValue> = merged
                        .into_iter()
                        .map(|(column, value)| ColumnValue { column, value })
                        .collect();
                    self.write_columns(tx, table, key, &merged)
                }
            }
        }
    }

    /// Columns of `key` in `[column_start, column_end]`, both ends
    /// inclusive, truncated to `limit`.
    pub fn get_columns_slice(
        &self,
        tx: TxnId,
        table: TableId,
        key: &[u8],
        column_start: &[u8],
        column_end: &[u8],
        limit: usize,
    ) -> KcvResult<Vec<ColumnValue>> {
        self.check_key(key)?;
        match self.layout {
            ColumnLayout::CompositeKey => {
                // Slice bounds are scan bounds, not stored keys, so the
                // empty column is legal here.
                if contains_separator(column_start) || contains_separator(column_end) {
                    return Err(KcvError::SeparatorNotAllowed);
                }
                let mut start = key.to_vec();
                start.push(KEY_COLUMN_SEPARATOR);
                start.extend_from_slice(column_start);
                let mut end = key.to_vec();
                end.push(KEY_COLUMN_SEPARATOR);
                end.extend_from_slice(column_end);
                let rows = self.engine.scan(tx, table, &start, &end, limit)?;
                let mut out = Vec::with_capacity(rows.len());
                for (composite, value) in rows {
                    let (_, column) = split_composite_key(&composite)?;
                    out.push(ColumnValue { column, value });
                }
                Ok(out)
            }
            ColumnLayout::SerializedColumns => {
                let columns = self.read_columns(tx, table, key)?;
                Ok(columns
                    .into_iter()
                    .filter(|cv| {
                        cv.column.as_slice() >= column_start && cv.column.as_slice() <= column_end
                    })
                    .take(limit)
                    .collect())
            }
        }
    }

    /// Enumerate keys in `[key_start, key_end]` together with their full
    /// column sets, truncated to `limit` keys.
    pub fn scan_keys(
        &self,
        tx: TxnId,
        table: TableId,
        key_start: &[u8],
        key_end: &[u8],
        limit: usize,
    ) -> KcvResult<Vec<(ByteString, Vec<ColumnValue>)>> {
        match self.layout {
            ColumnLayout::CompositeKey => {
                // Composite entries of every key in range sit between the
                // raw start key and the upper prefix bound of the end
                // key; the base-key filter below drops neighbours the
                // widened scan picks up.
                let mut end = key_end.to_vec();
                end.push(KEY_COLUMN_SEPARATOR + 1);
                let rows = self.engine.scan(tx, table, key_start, &end, self.scan_limit)?;
                if rows.len() == self.scan_limit {
                    tracing::warn!(
                        limit = self.scan_limit,
                        "key enumeration hit the scan limit; result may be truncated"
                    );
                }
                let mut grouped: Vec<(ByteString, Vec<ColumnValue>)> = Vec::new();
                for (composite, value) in rows {
                    let (base, column) = split_composite_key(&composite)?;
                    if base.as_slice() < key_start || base.as_slice() > key_end {
                        continue;
                    }
                    match grouped.last_mut() {
                        Some((last, columns)) if *last == base => {
                            columns.push(ColumnValue { column, value });
                        }
                        _ => {
                            if grouped.len() >= limit {
                                break;
                            }
                            grouped.push((base, vec![ColumnValue { column, value }]));
                        }
                    }
                }
                Ok(grouped)
            }
            ColumnLayout::SerializedColumns => {
                let rows = self.engine.scan(tx, table, key_start, key_end, limit)?;
                let mut out = Vec::with_capacity(rows.len());
                for (key, frame) in rows {
                    let columns = codec::deserialize_columns(&frame)?;
                    out.push((key, columns));
                }
                Ok(out)
            }
        }
    }

    // ── Batch ────────────────────────────────────────────────────────

    /// Execute column operations through the engine's batch interface.
    /// Only the composite-key layout supports this: under the serialized
    /// layout every write is a read-modify-write and batching would
    /// silently degrade, so it is refused outright.
    ///
    /// Mirrors the engine contract: `Ok` only when every operation
    /// succeeded, otherwise `BatchNotFullySuccess` (wrapped as an engine
    /// error) carrying the per-operation results.
    pub fn batch_execute(
        &self,
        tx: TxnId,
        table: TableId,
        ops: &[KcvBatchOp],
    ) -> KcvResult<Vec<BatchOpResult>> {
        if self.layout != ColumnLayout::CompositeKey {
            return Err(KcvError::BatchUnsupported);
        }
        let mut engine_ops = Vec::with_capacity(ops.len());
        for op in ops {
            let engine_op = match op {
                KcvBatchOp::GetColumn { key, column } => BatchOp::Get {
                    table,
                    key: make_composite_key(key, column)?,
                },
                KcvBatchOp::SetColumn { key, column, value } => BatchOp::Set {
                    table,
                    key: make_composite_key(key, column)?,
                    value: value.clone(),
                },
                KcvBatchOp::DeleteColumn { key, column } => BatchOp::Del {
                    table,
                    key: make_composite_key(key, column)?,
                },
            };
            engine_ops.push(engine_op);
        }
        Ok(self.engine.batch_execute(tx, &engine_ops)?)
    }
}
