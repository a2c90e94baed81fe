//! Binary framing for the serialized-columns layout.
//!
//! Frame layout, all lengths little-endian:
//!
//! ```text
//! u32 count · ( u32 len(c) · c · u32 len(v) · v )*count
//! ```
//!
//! A frame at rest always holds at least one column, and columns are
//! strictly ascending. Both properties are enforced on the way in and
//! verified again on the way out; any inconsistency in a stored frame is
//! a framing bug, reported as `InvalidFrame` rather than silently
//! repaired.

use kvt_common::types::ByteString;

use crate::{KcvError, KcvResult};

/// A column-value pair. Sequences of these are kept sorted by column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnValue {
    pub column: ByteString,
    pub value: ByteString,
}

impl ColumnValue {
    pub fn new(column: impl Into<ByteString>, value: impl Into<ByteString>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

const LEN_SIZE: usize = std::mem::size_of::<u32>();

/// Serialize a sorted column sequence into a frame. The sequence must be
/// non-empty and strictly ascending by column.
pub fn serialize_columns(columns: &[ColumnValue]) -> KcvResult<ByteString> {
    if columns.is_empty() {
        return Err(KcvError::InvalidFrame(
            "frame must contain at least one column".into(),
        ));
    }
    if !is_strictly_sorted(columns) {
        return Err(KcvError::InvalidFrame(
            "columns must be strictly ascending".into(),
        ));
    }
    let payload: usize = columns
        .iter()
        .map(|cv| 2 * LEN_SIZE + cv.column.len() + cv.value.len())
        .sum();
    let mut buf = Vec::with_capacity(LEN_SIZE + payload);
    buf.extend_from_slice(&(columns.len() as u32).to_le_bytes());
    for cv in columns {
        buf.extend_from_slice(&(cv.column.len() as u32).to_le_bytes());
        buf.extend_from_slice(&cv.column);
        buf.extend_from_slice(&(cv.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&cv.value);
    }
    Ok(buf)
}

/// Deserialize a frame, bounds-checking every step. Rejects truncated
/// frames, trailing bytes, and frames whose columns are not strictly
/// ascending.
pub fn deserialize_columns(data: &[u8]) -> KcvResult<Vec<ColumnValue>> {
    let mut offset = 0usize;
    let count = read_u32(data, &mut offset)? as usize;
    if count == 0 {
        return Err(KcvError::InvalidFrame("frame with zero columns".into()));
    }
    let mut columns = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let col_len = read_u32(data, &mut offset)? as usize;
        let column = read_bytes(data, &mut offset, col_len)?.to_vec();
        let val_len = read_u32(data, &mut offset)? as usize;
        let value = read_bytes(data, &mut offset, val_len)?.to_vec();
        columns.push(ColumnValue { column, value });
    }
    if offset != data.len() {
        return Err(KcvError::InvalidFrame(format!(
            "{} trailing bytes after frame",
            data.len() - offset
        )));
    }
    if !is_strictly_sorted(&columns) {
        return Err(KcvError::InvalidFrame(
            "columns must be strictly ascending".into(),
        ));
    }
    Ok(columns)
}

/// Position of `column` in a sorted column sequence.
pub fn find_column(columns: &[ColumnValue], column: &[u8]) -> Result<usize, usize> {
    columns.binary_search_by(|cv| cv.column.as_slice().cmp(column))
}

fn is_strictly_sorted(columns: &[ColumnValue]) -> bool {
    columns.windows(2).all(|w| w[0].column < w[1].column)
}

fn read_u32(data: &[u8], offset: &mut usize) -> KcvResult<u32> {
    let bytes = read_bytes(data, offset, LEN_SIZE)?;
    let mut raw = [0u8; LEN_SIZE];
    raw.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(raw))
}

fn read_bytes<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> KcvResult<&'a [u8]> {
    let end = offset.checked_add(len).ok_or_else(|| {
        KcvError::InvalidFrame("length overflows the frame".into())
    })?;
    if end > data.len() {
        return Err(KcvError::InvalidFrame(format!(
            "truncated frame: need {} bytes at offset {}, have {}",
            len,
            offset,
            data.len() - *offset
        )));
    }
    let slice = &data[*offset..end];
    *offset = end;
    Ok(slice)
}
