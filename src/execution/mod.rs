mod aggregate;
mod dml;
mod join;
mod scan;

pub use aggregate::*;
pub use dml::*;
pub use join::*;
pub use scan::*;

use std::sync::Arc;

use crate::common::{AbortReason, RecordId, Result, StrataError};
use crate::concurrency::{LockManager, Transaction};
use crate::tuple::Tuple;

/// Maps a lock call's `Ok(false)` (the transaction was already
/// aborted, typically wounded) onto the abort error the pipeline
/// propagates.
pub(crate) fn ensure_locked(acquired: bool, txn: &Transaction) -> Result<()> {
    if acquired {
        Ok(())
    } else {
        Err(StrataError::TransactionAborted {
            txn_id: txn.id(),
            reason: AbortReason::Deadlock,
        })
    }
}

/// Volcano-style operator: `init` prepares state, `next` lazily emits
/// one row at a time. Operators compose into pipelines; blocking
/// operators (aggregation, distinct, the join build side) materialize
/// during `init`.
///
/// Lock-manager aborts surface as `StrataError::TransactionAborted`
/// out of `next`; the caller must abort the surrounding transaction
/// through the transaction manager.
pub trait Executor {
    fn init(&mut self) -> Result<()>;
    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>>;
}

/// Per-query context threaded through the operators: the transaction
/// the query runs in and the lock manager to acquire row locks from.
pub struct ExecutorContext {
    txn: Arc<Transaction>,
    lock_manager: Arc<LockManager>,
}

impl ExecutorContext {
    pub fn new(txn: Arc<Transaction>, lock_manager: Arc<LockManager>) -> Self {
        Self { txn, lock_manager }
    }

    pub fn txn(&self) -> &Arc<Transaction> {
        &self.txn
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }
}
