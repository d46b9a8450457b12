use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::concurrency::IsolationLevel;
use crate::storage::{TableHeap, TableIterator};
use crate::tuple::Tuple;

use super::{Executor, ExecutorContext};

/// Row filter applied after the tuple is read (and locked).
pub type Predicate = Box<dyn Fn(&Tuple) -> bool + Send + Sync>;

/// Sequential scan over a table heap.
///
/// Locking follows the isolation level: READ_UNCOMMITTED reads without
/// locks, READ_COMMITTED takes a shared lock per row and releases it
/// right after the read, REPEATABLE_READ takes shared locks and holds
/// them until the transaction finishes.
pub struct SeqScanExecutor {
    ctx: Arc<ExecutorContext>,
    heap: Arc<TableHeap>,
    predicate: Option<Predicate>,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, heap: Arc<TableHeap>, predicate: Option<Predicate>) -> Self {
        Self {
            ctx,
            heap,
            predicate,
            iter: None,
        }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> Result<()> {
        self.iter = Some(Arc::clone(&self.heap).iter());
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let iter = self.iter.as_mut().expect("init not called");
        loop {
            let Some((rid, bytes)) = iter.next()? else {
                return Ok(None);
            };

            let txn = self.ctx.txn();
            let lock_manager = self.ctx.lock_manager();
            let isolation = txn.isolation();

            // A row this transaction already writes stays X-locked; the
            // early release below must not give that lock up.
            let already_exclusive = txn.is_exclusive_locked(rid);
            if isolation != IsolationLevel::ReadUncommitted {
                let acquired = lock_manager.lock_shared(txn, rid)?;
                super::ensure_locked(acquired, txn)?;
            }

            let tuple = Tuple::from_bytes(&bytes)?;
            let passes = self.predicate.as_ref().map_or(true, |p| p(&tuple));

            if isolation == IsolationLevel::ReadCommitted && !already_exclusive {
                lock_manager.unlock(txn, rid);
            }

            if passes {
                return Ok(Some((tuple, rid)));
            }
        }
    }
}
