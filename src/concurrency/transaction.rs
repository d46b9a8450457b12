use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::common::{RecordId, TxnId};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Two-phase locking states. A transaction acquires locks while
/// growing and only releases while shrinking; Aborted is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    Growing = 0,
    Shrinking = 1,
    Committed = 2,
    Aborted = 3,
}

impl TransactionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TransactionState::Growing,
            1 => TransactionState::Shrinking,
            2 => TransactionState::Committed,
            _ => TransactionState::Aborted,
        }
    }
}

/// An active database transaction, shared between the thread running it
/// and the lock manager (which may wound it from another thread).
pub struct Transaction {
    id: TxnId,
    isolation: IsolationLevel,
    state: AtomicU8,
    shared_locks: Mutex<HashSet<RecordId>>,
    exclusive_locks: Mutex<HashSet<RecordId>>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation: IsolationLevel) -> Self {
        Self {
            id,
            isolation,
            state: AtomicU8::new(TransactionState::Growing as u8),
            shared_locks: Mutex::new(HashSet::new()),
            exclusive_locks: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: TransactionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_shared_locked(&self, rid: RecordId) -> bool {
        self.shared_locks.lock().contains(&rid)
    }

    pub fn is_exclusive_locked(&self, rid: RecordId) -> bool {
        self.exclusive_locks.lock().contains(&rid)
    }

    pub(crate) fn add_shared(&self, rid: RecordId) {
        self.shared_locks.lock().insert(rid);
    }

    pub(crate) fn remove_shared(&self, rid: RecordId) {
        self.shared_locks.lock().remove(&rid);
    }

    pub(crate) fn add_exclusive(&self, rid: RecordId) {
        self.exclusive_locks.lock().insert(rid);
    }

    pub(crate) fn remove_exclusive(&self, rid: RecordId) {
        self.exclusive_locks.lock().remove(&rid);
    }

    /// All records this transaction currently holds locks on.
    pub fn held_locks(&self) -> Vec<RecordId> {
        let mut rids: Vec<RecordId> = self.shared_locks.lock().iter().copied().collect();
        rids.extend(self.exclusive_locks.lock().iter().copied());
        rids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PageId, SlotId};

    fn rid(page: u32, slot: u16) -> RecordId {
        RecordId::new(PageId::new(page), SlotId::new(slot))
    }

    #[test]
    fn test_transaction_new() {
        let txn = Transaction::new(TxnId::new(1), IsolationLevel::ReadCommitted);
        assert_eq!(txn.id(), TxnId::new(1));
        assert_eq!(txn.isolation(), IsolationLevel::ReadCommitted);
        assert_eq!(txn.state(), TransactionState::Growing);
    }

    #[test]
    fn test_transaction_state_transitions() {
        let txn = Transaction::new(TxnId::new(1), IsolationLevel::RepeatableRead);
        txn.set_state(TransactionState::Shrinking);
        assert_eq!(txn.state(), TransactionState::Shrinking);
        txn.set_state(TransactionState::Aborted);
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_transaction_lock_sets() {
        let txn = Transaction::new(TxnId::new(1), IsolationLevel::RepeatableRead);
        txn.add_shared(rid(1, 0));
        txn.add_exclusive(rid(1, 1));

        assert!(txn.is_shared_locked(rid(1, 0)));
        assert!(txn.is_exclusive_locked(rid(1, 1)));
        assert!(!txn.is_shared_locked(rid(1, 1)));
        assert_eq!(txn.held_locks().len(), 2);

        txn.remove_shared(rid(1, 0));
        txn.remove_exclusive(rid(1, 1));
        assert!(txn.held_locks().is_empty());
    }
}
