use thiserror::Error;

use crate::types::{BatchOpResult, TableId, TxnId};

/// Convenience alias for `Result<T, KvtError>`.
pub type KvtResult<T> = Result<T, KvtError>;

/// Stable error codes exposed at the engine boundary. Host bindings
/// translate these into their own error idiom; the set is fixed, the
/// human-readable messages on `KvtError` are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    KvtNotInitialized,
    TableAlreadyExists,
    TableNotFound,
    InvalidPartitionMethod,
    TransactionNotFound,
    TransactionAlreadyRunning,
    KeyNotFound,
    KeyIsDeleted,
    KeyIsLocked,
    TransactionHasStaleData,
    OneShotWriteNotAllowed,
    OneShotDeleteNotAllowed,
    BatchNotFullySuccess,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Success => "SUCCESS",
            ErrorCode::KvtNotInitialized => "KVT_NOT_INITIALIZED",
            ErrorCode::TableAlreadyExists => "TABLE_ALREADY_EXISTS",
            ErrorCode::TableNotFound => "TABLE_NOT_FOUND",
            ErrorCode::InvalidPartitionMethod => "INVALID_PARTITION_METHOD",
            ErrorCode::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            ErrorCode::TransactionAlreadyRunning => "TRANSACTION_ALREADY_RUNNING",
            ErrorCode::KeyNotFound => "KEY_NOT_FOUND",
            ErrorCode::KeyIsDeleted => "KEY_IS_DELETED",
            ErrorCode::KeyIsLocked => "KEY_IS_LOCKED",
            ErrorCode::TransactionHasStaleData => "TRANSACTION_HAS_STALE_DATA",
            ErrorCode::OneShotWriteNotAllowed => "ONE_SHOT_WRITE_NOT_ALLOWED",
            ErrorCode::OneShotDeleteNotAllowed => "ONE_SHOT_DELETE_NOT_ALLOWED",
            ErrorCode::BatchNotFullySuccess => "BATCH_NOT_FULLY_SUCCESS",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-layer errors. Every failure crossing the engine boundary is one
/// of these; `code()` gives the stable wire code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvtError {
    #[error("KVT engine not initialized")]
    NotInitialized,

    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("table {0} not found")]
    TableNotFound(TableId),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("invalid partition method '{0}': must be 'hash' or 'range'")]
    InvalidPartitionMethod(String),

    #[error("scan requires a range-partitioned table, {0} is hash-partitioned")]
    NotRangePartitioned(TableId),

    #[error("transaction {0} not found")]
    TxnNotFound(TxnId),

    #[error("another transaction is already running")]
    TxnAlreadyRunning,

    #[error("key not found")]
    KeyNotFound,

    #[error("key is deleted in the current transaction")]
    KeyIsDeleted,

    #[error("key is locked by another transaction")]
    KeyIsLocked,

    #[error("transaction {0} has stale data: concurrent modification detected")]
    StaleData(TxnId),

    #[error("one-shot writes require an active transaction under this scheme")]
    OneShotWriteNotAllowed,

    #[error("one-shot deletes require an active transaction under this scheme")]
    OneShotDeleteNotAllowed,

    /// Some operations of a batch failed. Carries the full per-operation
    /// results so the caller can inspect each outcome.
    #[error("batch not fully successful")]
    BatchNotFullySuccess { results: Vec<BatchOpResult> },

    #[error("internal error: {0}")]
    Internal(String),
}

impl KvtError {
    /// Map onto the stable boundary code. `NotRangePartitioned` and
    /// `UnknownTable` fold into their nearest stable codes; `Internal`
    /// reports as unknown.
    pub fn code(&self) -> ErrorCode {
        match self {
            KvtError::NotInitialized => ErrorCode::KvtNotInitialized,
            KvtError::TableAlreadyExists(_) => ErrorCode::TableAlreadyExists,
            KvtError::TableNotFound(_) | KvtError::UnknownTable(_) => ErrorCode::TableNotFound,
            KvtError::InvalidPartitionMethod(_) | KvtError::NotRangePartitioned(_) => {
                ErrorCode::InvalidPartitionMethod
            }
            KvtError::TxnNotFound(_) => ErrorCode::TransactionNotFound,
            KvtError::TxnAlreadyRunning => ErrorCode::TransactionAlreadyRunning,
            KvtError::KeyNotFound => ErrorCode::KeyNotFound,
            KvtError::KeyIsDeleted => ErrorCode::KeyIsDeleted,
            KvtError::KeyIsLocked => ErrorCode::KeyIsLocked,
            KvtError::StaleData(_) => ErrorCode::TransactionHasStaleData,
            KvtError::OneShotWriteNotAllowed => ErrorCode::OneShotWriteNotAllowed,
            KvtError::OneShotDeleteNotAllowed => ErrorCode::OneShotDeleteNotAllowed,
            KvtError::BatchNotFullySuccess { .. } => ErrorCode::BatchNotFullySuccess,
            KvtError::Internal(_) => ErrorCode::UnknownError,
        }
    }

    /// True when the caller may retry without giving up its transaction:
    /// the context is still live and consistent after these errors.
    /// `StaleData` reported from a commit is the exception: the context
    /// is already destroyed and the retry needs a fresh transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KvtError::KeyIsLocked | KvtError::StaleData(_))
    }
}
