use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::TxnId;

use super::lock_manager::LockManager;
use super::transaction::{IsolationLevel, Transaction, TransactionState};

/// Shared map of live transactions. The lock manager resolves txn ids
/// through it when wounding a holder from another thread.
pub struct TransactionRegistry {
    txns: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self {
            txns: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, txn: Arc<Transaction>) {
        self.txns.lock().insert(txn.id(), txn);
    }

    pub fn get(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.txns.lock().get(&txn_id).cloned()
    }

    pub fn remove(&self, txn_id: TxnId) {
        self.txns.lock().remove(&txn_id);
    }
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands out transactions with monotonically increasing ids and drives
/// the lock protocol on commit and abort. Rollback of data changes is
/// the caller's concern; the manager only releases locks and retires
/// the transaction.
pub struct TransactionManager {
    registry: Arc<TransactionRegistry>,
    lock_manager: Arc<LockManager>,
    next_txn_id: AtomicU64,
}

impl TransactionManager {
    pub fn new(registry: Arc<TransactionRegistry>, lock_manager: Arc<LockManager>) -> Self {
        Self {
            registry,
            lock_manager,
            next_txn_id: AtomicU64::new(0),
        }
    }

    /// Starts a transaction at the given isolation level.
    pub fn begin(&self, isolation: IsolationLevel) -> Arc<Transaction> {
        let id = TxnId::new(self.next_txn_id.fetch_add(1, Ordering::SeqCst));
        let txn = Arc::new(Transaction::new(id, isolation));
        self.registry.register(Arc::clone(&txn));
        txn
    }

    /// Commits the transaction, releasing all of its locks. Returns
    /// false when the transaction had already been aborted (wounded);
    /// the caller must treat that as an abort.
    pub fn commit(&self, txn: &Arc<Transaction>) -> bool {
        let was_aborted = txn.state() == TransactionState::Aborted;
        self.release_locks(txn);
        if !was_aborted {
            txn.set_state(TransactionState::Committed);
        }
        self.registry.remove(txn.id());
        !was_aborted
    }

    /// Aborts the transaction and releases all of its locks.
    pub fn abort(&self, txn: &Arc<Transaction>) {
        txn.set_state(TransactionState::Aborted);
        self.release_locks(txn);
        self.registry.remove(txn.id());
    }

    fn release_locks(&self, txn: &Arc<Transaction>) {
        for rid in txn.held_locks() {
            self.lock_manager.unlock(txn, rid);
        }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }
}
