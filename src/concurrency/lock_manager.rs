use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::common::{AbortReason, RecordId, Result, StrataError, TxnId};

use super::transaction::{IsolationLevel, Transaction, TransactionState};
use super::transaction_manager::TransactionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, Copy)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

/// Per-record request queue. The condvar is shared via Arc so a waiter
/// can park on it while the table lock is re-acquired on wake.
struct LockRequestQueue {
    requests: VecDeque<LockRequest>,
    cv: Arc<Condvar>,
    /// Transaction currently upgrading S -> X on this record, if any
    upgrading: Option<TxnId>,
}

impl Default for LockRequestQueue {
    fn default() -> Self {
        Self {
            requests: VecDeque::new(),
            cv: Arc::new(Condvar::new()),
            upgrading: None,
        }
    }
}

type LockTable = HashMap<RecordId, LockRequestQueue>;

/// Row-level lock manager enforcing two-phase locking with wound-wait
/// deadlock prevention.
///
/// Wound-wait: when a transaction requests a lock held incompatibly,
/// it wounds (aborts) every incompatible holder younger than itself
/// and waits for the older ones. Wounding only ever flows from older
/// to younger transactions, so the wait relation is acyclic on txn id
/// and no deadlock can form. A wounded transaction notices its Aborted
/// state at its next wake or lock call and returns through the abort
/// path.
///
/// The lock table grows monotonically: queues are created lazily on
/// first request and kept (empty) after their last unlock.
pub struct LockManager {
    registry: Arc<TransactionRegistry>,
    latch: Mutex<LockTable>,
}

impl LockManager {
    pub fn new(registry: Arc<TransactionRegistry>) -> Self {
        Self {
            registry,
            latch: Mutex::new(HashMap::new()),
        }
    }

    /// Marks the transaction aborted and builds the error the caller
    /// must propagate.
    fn abort(&self, txn: &Transaction, reason: AbortReason) -> StrataError {
        txn.set_state(TransactionState::Aborted);
        StrataError::TransactionAborted {
            txn_id: txn.id(),
            reason,
        }
    }

    /// Wounds every granted request in the queue that `filter` selects:
    /// the victim transaction is flipped to Aborted and its request
    /// dropped. Returns true if anything was wounded.
    fn wound_granted<F>(&self, queue: &mut LockRequestQueue, filter: F) -> bool
    where
        F: Fn(&LockRequest) -> bool,
    {
        let before = queue.requests.len();
        let registry = &self.registry;
        queue.requests.retain(|request| {
            if request.granted && filter(request) {
                if let Some(victim) = registry.get(request.txn_id) {
                    victim.set_state(TransactionState::Aborted);
                }
                false
            } else {
                true
            }
        });
        queue.requests.len() != before
    }

    /// Drops the calling transaction's own (wounded) request and wakes
    /// the queue before surfacing the abort.
    fn abort_waiting(&self, table: &mut LockTable, txn: &Transaction, rid: RecordId) -> StrataError {
        if let Some(queue) = table.get_mut(&rid) {
            queue.requests.retain(|r| r.txn_id != txn.id());
            queue.cv.notify_all();
        }
        self.abort(txn, AbortReason::Deadlock)
    }

    /// Acquires a shared lock on the record.
    pub fn lock_shared(&self, txn: &Transaction, rid: RecordId) -> Result<bool> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }
        if txn.isolation() == IsolationLevel::ReadUncommitted {
            return Err(self.abort(txn, AbortReason::SharedOnReadUncommitted));
        }
        if txn.state() == TransactionState::Shrinking
            && txn.isolation() == IsolationLevel::RepeatableRead
        {
            return Err(self.abort(txn, AbortReason::LockOnShrinking));
        }
        if txn.is_shared_locked(rid) || txn.is_exclusive_locked(rid) {
            return Ok(true);
        }

        let mut table = self.latch.lock();
        table.entry(rid).or_default().requests.push_back(LockRequest {
            txn_id: txn.id(),
            mode: LockMode::Shared,
            granted: false,
        });

        loop {
            let queue = table.get_mut(&rid).unwrap();

            // Wound younger holders whose mode conflicts with S.
            let me = txn.id();
            if self.wound_granted(queue, |r| r.mode != LockMode::Shared && r.txn_id > me) {
                queue.cv.notify_all();
            }

            let must_wait = queue
                .requests
                .iter()
                .any(|r| r.granted && r.mode != LockMode::Shared && r.txn_id < me);
            if !must_wait {
                break;
            }

            let cv = Arc::clone(&queue.cv);
            cv.wait(&mut table);

            if txn.state() == TransactionState::Aborted {
                return Err(self.abort_waiting(&mut table, txn, rid));
            }
        }

        let queue = table.get_mut(&rid).unwrap();
        for request in queue.requests.iter_mut() {
            if request.txn_id == txn.id() {
                request.granted = true;
            }
        }
        txn.add_shared(rid);
        Ok(true)
    }

    /// Acquires an exclusive lock on the record.
    pub fn lock_exclusive(&self, txn: &Transaction, rid: RecordId) -> Result<bool> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }
        if txn.state() == TransactionState::Shrinking {
            return Err(self.abort(txn, AbortReason::LockOnShrinking));
        }
        if txn.is_exclusive_locked(rid) {
            return Ok(true);
        }

        let mut table = self.latch.lock();
        table.entry(rid).or_default().requests.push_back(LockRequest {
            txn_id: txn.id(),
            mode: LockMode::Exclusive,
            granted: false,
        });

        loop {
            let queue = table.get_mut(&rid).unwrap();

            // Every mode conflicts with X: wound all younger holders.
            let me = txn.id();
            if self.wound_granted(queue, |r| r.txn_id > me) {
                queue.cv.notify_all();
            }

            let must_wait = queue.requests.iter().any(|r| r.granted && r.txn_id < me);
            if !must_wait {
                break;
            }

            let cv = Arc::clone(&queue.cv);
            cv.wait(&mut table);

            if txn.state() == TransactionState::Aborted {
                return Err(self.abort_waiting(&mut table, txn, rid));
            }
        }

        let queue = table.get_mut(&rid).unwrap();
        for request in queue.requests.iter_mut() {
            if request.txn_id == txn.id() {
                request.granted = true;
            }
        }
        txn.add_exclusive(rid);
        Ok(true)
    }

    /// Upgrades a held shared lock to exclusive. Only one upgrade may
    /// be in flight per record; a second upgrader aborts.
    pub fn lock_upgrade(&self, txn: &Transaction, rid: RecordId) -> Result<bool> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }
        if txn.state() == TransactionState::Shrinking {
            return Err(self.abort(txn, AbortReason::LockOnShrinking));
        }
        if txn.is_exclusive_locked(rid) {
            return Ok(true);
        }
        if !txn.is_shared_locked(rid) {
            return Ok(false);
        }

        let mut table = self.latch.lock();
        {
            let queue = table.entry(rid).or_default();
            if queue.upgrading.is_some() {
                return Err(self.abort(txn, AbortReason::UpgradeConflict));
            }
            queue.upgrading = Some(txn.id());
        }

        loop {
            let queue = table.get_mut(&rid).unwrap();

            // Wound every younger granted holder other than ourselves.
            let me = txn.id();
            if self.wound_granted(queue, |r| r.txn_id > me) {
                queue.cv.notify_all();
            }

            let must_wait = queue.requests.iter().any(|r| r.granted && r.txn_id < me);
            if !must_wait {
                break;
            }

            let cv = Arc::clone(&queue.cv);
            cv.wait(&mut table);

            if txn.state() == TransactionState::Aborted {
                if let Some(queue) = table.get_mut(&rid) {
                    queue.upgrading = None;
                }
                return Err(self.abort_waiting(&mut table, txn, rid));
            }
        }

        let queue = table.get_mut(&rid).unwrap();
        for request in queue.requests.iter_mut() {
            if request.txn_id == txn.id() {
                request.granted = true;
                request.mode = LockMode::Exclusive;
            }
        }
        queue.upgrading = None;
        txn.remove_shared(rid);
        txn.add_exclusive(rid);
        Ok(true)
    }

    /// Releases the transaction's lock on the record. Under
    /// REPEATABLE_READ the first unlock moves a growing transaction to
    /// shrinking; READ_COMMITTED may release shared locks early with no
    /// transition.
    pub fn unlock(&self, txn: &Transaction, rid: RecordId) -> bool {
        if !txn.is_shared_locked(rid) && !txn.is_exclusive_locked(rid) {
            return false;
        }
        if txn.isolation() == IsolationLevel::RepeatableRead
            && txn.state() == TransactionState::Growing
        {
            txn.set_state(TransactionState::Shrinking);
        }

        let mut table = self.latch.lock();
        if let Some(queue) = table.get_mut(&rid) {
            if let Some(pos) = queue
                .requests
                .iter()
                .position(|r| r.txn_id == txn.id() && r.granted)
            {
                queue.requests.remove(pos);
            }
            queue.cv.notify_all();
        }
        // The request may already be gone if a wounder dropped it; the
        // lock-set entry still needs clearing either way.
        txn.remove_shared(rid);
        txn.remove_exclusive(rid);
        true
    }
}
