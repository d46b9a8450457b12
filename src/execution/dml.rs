use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::storage::TableHeap;
use crate::tuple::Tuple;

use super::{Executor, ExecutorContext};

/// Computes the replacement row for an update.
pub type UpdateFn = Box<dyn Fn(&Tuple) -> Tuple + Send + Sync>;

/// Inserts rows from an explicit value list or a child executor; each
/// inserted row is exclusively locked before it is emitted.
pub struct InsertExecutor {
    ctx: Arc<ExecutorContext>,
    heap: Arc<TableHeap>,
    rows: Vec<Tuple>,
    // Cursor into the raw value list
    cursor: usize,
    child: Option<Box<dyn Executor>>,
}

impl InsertExecutor {
    /// Raw insert of an explicit row list.
    pub fn new(ctx: Arc<ExecutorContext>, heap: Arc<TableHeap>, rows: Vec<Tuple>) -> Self {
        Self {
            ctx,
            heap,
            rows,
            cursor: 0,
            child: None,
        }
    }

    /// Insert of everything a child executor produces.
    pub fn from_child(
        ctx: Arc<ExecutorContext>,
        heap: Arc<TableHeap>,
        child: Box<dyn Executor>,
    ) -> Self {
        Self {
            ctx,
            heap,
            rows: Vec::new(),
            cursor: 0,
            child: Some(child),
        }
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> Result<()> {
        self.cursor = 0;
        if let Some(child) = self.child.as_mut() {
            child.init()?;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let tuple = match self.child.as_mut() {
            Some(child) => match child.next()? {
                Some((tuple, _)) => tuple,
                None => return Ok(None),
            },
            None => {
                if self.cursor >= self.rows.len() {
                    return Ok(None);
                }
                let tuple = self.rows[self.cursor].clone();
                self.cursor += 1;
                tuple
            }
        };

        let rid = self.heap.insert_tuple(&tuple.to_bytes())?;
        let acquired = self.ctx.lock_manager().lock_exclusive(self.ctx.txn(), rid)?;
        super::ensure_locked(acquired, self.ctx.txn())?;
        Ok(Some((tuple, rid)))
    }
}

/// Takes the write lock for a row produced by a child: upgrades a held
/// shared lock, otherwise acquires exclusive.
fn lock_for_write(ctx: &ExecutorContext, rid: RecordId) -> Result<()> {
    let acquired = if ctx.txn().is_shared_locked(rid) {
        ctx.lock_manager().lock_upgrade(ctx.txn(), rid)?
    } else {
        ctx.lock_manager().lock_exclusive(ctx.txn(), rid)?
    };
    super::ensure_locked(acquired, ctx.txn())
}

/// Deletes every row its child produces.
pub struct DeleteExecutor {
    ctx: Arc<ExecutorContext>,
    heap: Arc<TableHeap>,
    child: Box<dyn Executor>,
}

impl DeleteExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, heap: Arc<TableHeap>, child: Box<dyn Executor>) -> Self {
        Self { ctx, heap, child }
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let Some((tuple, rid)) = self.child.next()? else {
            return Ok(None);
        };
        lock_for_write(&self.ctx, rid)?;
        self.heap.delete_tuple(rid)?;
        Ok(Some((tuple, rid)))
    }
}

/// Rewrites every row its child produces. When the new row no longer
/// fits in place it is deleted and reinserted, and the fresh record id
/// is locked and emitted.
pub struct UpdateExecutor {
    ctx: Arc<ExecutorContext>,
    heap: Arc<TableHeap>,
    child: Box<dyn Executor>,
    update_fn: UpdateFn,
}

impl UpdateExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        heap: Arc<TableHeap>,
        child: Box<dyn Executor>,
        update_fn: UpdateFn,
    ) -> Self {
        Self {
            ctx,
            heap,
            child,
            update_fn,
        }
    }
}

impl Executor for UpdateExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let Some((tuple, rid)) = self.child.next()? else {
            return Ok(None);
        };
        lock_for_write(&self.ctx, rid)?;

        let updated = (self.update_fn)(&tuple);
        if self.heap.update_tuple(rid, &updated.to_bytes())? {
            return Ok(Some((updated, rid)));
        }

        self.heap.delete_tuple(rid)?;
        let new_rid = self.heap.insert_tuple(&updated.to_bytes())?;
        let acquired = self
            .ctx
            .lock_manager()
            .lock_exclusive(self.ctx.txn(), new_rid)?;
        super::ensure_locked(acquired, self.ctx.txn())?;
        Ok(Some((updated, new_rid)))
    }
}
