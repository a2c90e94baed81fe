//! Key-column-value adapter over the KVT engine.
//!
//! For each application key the adapter maintains an ordered sequence of
//! column-value pairs, mapped onto the engine through one of two
//! interchangeable physical layouts:
//!
//! - **Serialized columns**: one engine entry per key, all columns
//!   framed into its value ([`codec`]).
//! - **Composite key**: one engine entry per column, the column joined
//!   into the key with a reserved separator byte.
//!
//! The two layouts are behaviorally indistinguishable at this interface,
//! batch execution excepted (composite-key only).

pub mod codec;
pub mod store;


pub use codec::ColumnValue;
pub use store::{KcvBatchOp, KcvStore, KEY_COLUMN_SEPARATOR};

use thiserror::Error;

use kvt_common::error::KvtError;

/// Convenience alias for `Result<T, KcvError>`.
pub type KcvResult<T> = Result<T, KcvError>;

/// Adapter-layer errors. Engine failures pass through as `Engine`;
/// everything else is a validation or framing failure raised before any
/// engine state is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KcvError {
    #[error(transparent)]
    Engine(#[from] KvtError),

    #[error("malformed column frame: {0}")]
    InvalidFrame(String),

    #[error("key must not be empty")]
    EmptyKey,

    #[error("column must not be empty")]
    EmptyColumn,

    #[error("column set must not be empty")]
    EmptyColumnSet,

    #[error("key or column contains the reserved separator byte")]
    SeparatorNotAllowed,

    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("batch execution is not supported under the serialized-columns layout")]
    BatchUnsupported,
}

impl KcvError {
    pub(crate) fn column_not_found(column: &[u8]) -> Self {
        KcvError::ColumnNotFound(String::from_utf8_lossy(column).into_owned())
    }
}
