use std::sync::Arc;

use strata::buffer::{BufferPool, BufferPoolInstance};
use strata::concurrency::{IsolationLevel, LockManager, TransactionManager, TransactionRegistry};
use strata::index::{ExtendibleHashTable, OrdComparator};
use strata::storage::disk::DiskManager;

fn main() {
    println!("Strata - storage and concurrency core");
    println!("=====================================\n");

    let db_path = "demo.db";
    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to open database file"));
    let bpm: Arc<dyn BufferPool> = Arc::new(BufferPoolInstance::new(64, disk_manager));
    println!("Opened {} with a 64-frame buffer pool", db_path);

    // Build a hash index and exercise it.
    let table: ExtendibleHashTable<u32, u32, _> =
        ExtendibleHashTable::new(Arc::clone(&bpm), OrdComparator).expect("failed to create index");

    for key in 0..10_000u32 {
        table.insert(&key, &(key * 2)).expect("insert failed");
    }
    println!(
        "Inserted 10000 pairs; directory grew to global depth {}",
        table.global_depth().expect("depth read failed")
    );
    table.verify_integrity().expect("integrity check failed");

    for key in [0u32, 4999, 9999] {
        println!("  get({}) = {:?}", key, table.get_value(&key).unwrap());
    }

    // Row locking with wound-wait.
    let registry = Arc::new(TransactionRegistry::new());
    let lock_manager = Arc::new(LockManager::new(Arc::clone(&registry)));
    let txn_manager = TransactionManager::new(registry, Arc::clone(&lock_manager));

    let older = txn_manager.begin(IsolationLevel::RepeatableRead);
    let younger = txn_manager.begin(IsolationLevel::RepeatableRead);
    let rid = strata::RecordId::new(strata::PageId::new(1), strata::SlotId::new(0));

    lock_manager
        .lock_exclusive(&younger, rid)
        .expect("younger lock failed");
    lock_manager
        .lock_exclusive(&older, rid)
        .expect("older lock failed");
    println!(
        "\nWound-wait: {} took the lock, {} is now {:?}",
        older.id(),
        younger.id(),
        younger.state()
    );
    txn_manager.commit(&older);

    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed");
}
