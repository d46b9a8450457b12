//! Integration tests for two-phase locking and wound-wait

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use strata::common::{AbortReason, PageId, RecordId, SlotId, StrataError};
use strata::concurrency::{
    IsolationLevel, LockManager, TransactionManager, TransactionRegistry, TransactionState,
};

fn rid(page: u32, slot: u16) -> RecordId {
    RecordId::new(PageId::new(page), SlotId::new(slot))
}

fn setup() -> (Arc<TransactionManager>, Arc<LockManager>) {
    let registry = Arc::new(TransactionRegistry::new());
    let lock_manager = Arc::new(LockManager::new(Arc::clone(&registry)));
    let txn_manager = Arc::new(TransactionManager::new(registry, Arc::clone(&lock_manager)));
    (txn_manager, lock_manager)
}

#[test]
fn test_older_wounds_younger_holder() {
    let (tm, lm) = setup();
    let older = tm.begin(IsolationLevel::RepeatableRead);
    let younger = tm.begin(IsolationLevel::RepeatableRead);

    assert!(lm.lock_exclusive(&younger, rid(0, 0)).unwrap());
    assert!(lm.lock_exclusive(&older, rid(0, 0)).unwrap());

    assert_eq!(younger.state(), TransactionState::Aborted);
    assert!(older.is_exclusive_locked(rid(0, 0)));
}

#[test]
fn test_younger_waits_for_older_holder() {
    let (tm, lm) = setup();
    let older = tm.begin(IsolationLevel::RepeatableRead);
    let younger = tm.begin(IsolationLevel::RepeatableRead);

    assert!(lm.lock_exclusive(&older, rid(0, 0)).unwrap());

    let waiter = {
        let lm = Arc::clone(&lm);
        let younger = Arc::clone(&younger);
        thread::spawn(move || lm.lock_exclusive(&younger, rid(0, 0)))
    };

    // The younger transaction must still be blocked.
    thread::sleep(Duration::from_millis(100));
    assert!(!waiter.is_finished());

    // Releasing the older lock lets it through.
    assert!(lm.unlock(&older, rid(0, 0)));
    assert!(waiter.join().unwrap().unwrap());
    assert!(younger.is_exclusive_locked(rid(0, 0)));
}

#[test]
fn test_waiter_observes_wound_on_wake() {
    // younger holds A and blocks on B (held by older); older then
    // requests A, wounding younger. When older releases B, younger
    // wakes, sees its Aborted state, and fails with Deadlock.
    let (tm, lm) = setup();
    let older = tm.begin(IsolationLevel::RepeatableRead);
    let younger = tm.begin(IsolationLevel::RepeatableRead);

    let a = rid(0, 0);
    let b = rid(0, 1);

    assert!(lm.lock_exclusive(&older, b).unwrap());
    assert!(lm.lock_exclusive(&younger, a).unwrap());

    let waiter = {
        let lm = Arc::clone(&lm);
        let younger = Arc::clone(&younger);
        thread::spawn(move || lm.lock_exclusive(&younger, b))
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!waiter.is_finished());

    // Older takes A, wounding the younger holder.
    assert!(lm.lock_exclusive(&older, a).unwrap());
    assert_eq!(younger.state(), TransactionState::Aborted);

    // Waking the younger transaction routes it through the abort path.
    assert!(lm.unlock(&older, b));
    let result = waiter.join().unwrap();
    match result {
        Err(StrataError::TransactionAborted { reason, .. }) => {
            assert_eq!(reason, AbortReason::Deadlock);
        }
        other => panic!("expected deadlock abort, got {:?}", other.map(|_| ())),
    }

    tm.abort(&younger);
    tm.commit(&older);
}

#[test]
fn test_contended_writers_make_progress() {
    // Threads hammer one record with exclusive locks. Wound-wait keeps
    // the wait relation acyclic, so the run terminates with every
    // transaction either committed or wounded.
    let (tm, lm) = setup();
    let record = rid(0, 0);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let tm = Arc::clone(&tm);
            let lm = Arc::clone(&lm);
            thread::spawn(move || {
                let mut commits = 0u32;
                for _ in 0..50 {
                    let txn = tm.begin(IsolationLevel::RepeatableRead);
                    match lm.lock_exclusive(&txn, record) {
                        Ok(true) => {
                            if tm.commit(&txn) {
                                commits += 1;
                            }
                        }
                        Ok(false) | Err(_) => tm.abort(&txn),
                    }
                }
                commits
            })
        })
        .collect();

    let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(total > 0);
}

#[test]
fn test_repeatable_read_two_phase_violation() {
    let (tm, lm) = setup();

    // Shared lock after unlock aborts the transaction.
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    assert!(lm.lock_exclusive(&txn, rid(0, 0)).unwrap());
    assert!(lm.unlock(&txn, rid(0, 0)));
    assert_eq!(txn.state(), TransactionState::Shrinking);

    let err = lm.lock_shared(&txn, rid(0, 1)).unwrap_err();
    assert_eq!(err.abort_reason(), Some(AbortReason::LockOnShrinking));
    assert_eq!(txn.state(), TransactionState::Aborted);
    // Once aborted, further lock calls just report failure.
    assert!(!lm.lock_exclusive(&txn, rid(0, 2)).unwrap());
    tm.abort(&txn);

    // Same for an exclusive lock after unlock.
    let txn = tm.begin(IsolationLevel::RepeatableRead);
    assert!(lm.lock_shared(&txn, rid(1, 0)).unwrap());
    assert!(lm.unlock(&txn, rid(1, 0)));
    let err = lm.lock_exclusive(&txn, rid(1, 1)).unwrap_err();
    assert_eq!(err.abort_reason(), Some(AbortReason::LockOnShrinking));
}

#[test]
fn test_upgrade_conflict_aborts_second_upgrader() {
    let (tm, lm) = setup();
    let record = rid(0, 0);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    let t3 = tm.begin(IsolationLevel::RepeatableRead);

    assert!(lm.lock_shared(&t1, record).unwrap());
    assert!(lm.lock_shared(&t2, record).unwrap());
    assert!(lm.lock_shared(&t3, record).unwrap());

    // The youngest holder starts upgrading: it wounds nobody and
    // blocks on the two older shared holders.
    let upgrader = {
        let lm = Arc::clone(&lm);
        let t3 = Arc::clone(&t3);
        thread::spawn(move || lm.lock_upgrade(&t3, record))
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!upgrader.is_finished());

    // A second in-flight upgrade on the same record aborts.
    match lm.lock_upgrade(&t2, record) {
        Err(StrataError::TransactionAborted { reason, .. }) => {
            assert_eq!(reason, AbortReason::UpgradeConflict);
        }
        other => panic!("expected upgrade conflict, got {:?}", other.map(|_| ())),
    }
    tm.abort(&t2);

    // Once the older holders are gone, the upgrade completes.
    tm.commit(&t1);
    assert!(upgrader.join().unwrap().unwrap());
    assert!(t3.is_exclusive_locked(record));
}

#[test]
fn test_read_committed_early_release() {
    let (tm, lm) = setup();
    let txn = tm.begin(IsolationLevel::ReadCommitted);

    assert!(lm.lock_shared(&txn, rid(0, 0)).unwrap());
    assert!(lm.unlock(&txn, rid(0, 0)));
    assert_eq!(txn.state(), TransactionState::Growing);

    // Still growing: new locks are fine.
    assert!(lm.lock_exclusive(&txn, rid(0, 1)).unwrap());
    assert!(tm.commit(&txn));
}
