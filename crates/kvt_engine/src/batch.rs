//! Batch execution: a sequence of operations under one transaction id,
//! each with its own result.

use kvt_common::error::{KvtError, KvtResult};
use kvt_common::types::{BatchOp, BatchOpResult, TxnId};

use crate::engine::KvtEngine;

impl KvtEngine {
    /// Execute `ops` in order. Operations share `tx_id` and observe each
    /// other's effects under the normal visibility rules.
    ///
    /// Returns `Ok(results)` only when every operation succeeded. When
    /// any operation fails, the call returns `BatchNotFullySuccess`
    /// carrying the full per-operation results, and the caller inspects
    /// each one. Operations after a failed one still run.
    pub fn batch_execute(&self, tx_id: TxnId, ops: &[BatchOp]) -> KvtResult<Vec<BatchOpResult>> {
        let mut results = Vec::with_capacity(ops.len());
        let mut failed = 0usize;
        for op in ops {
            let result = match op {
                BatchOp::Get { table, key } => match self.get(tx_id, *table, key) {
                    Ok(value) => BatchOpResult::ok(Some(value)),
                    Err(e) => BatchOpResult::err(e),
                },
                BatchOp::Set { table, key, value } => match self.set(tx_id, *table, key, value) {
                    Ok(()) => BatchOpResult::ok(None),
                    Err(e) => BatchOpResult::err(e),
                },
                BatchOp::Del { table, key } => match self.del(tx_id, *table, key) {
                    Ok(()) => BatchOpResult::ok(None),
                    Err(e) => BatchOpResult::err(e),
                },
            };
            if !result.is_success() {
                failed += 1;
            }
            results.push(result);
        }
        if failed == 0 {
            Ok(results)
        } else {
            tracing::debug!(%tx_id, failed, total = ops.len(), "batch not fully successful");
            Err(KvtError::BatchNotFullySuccess { results })
        }
    }
}
