//! Integration tests for the buffer pool

use std::sync::Arc;
use std::thread;

use strata::buffer::{BufferPool, BufferPoolInstance, ParallelBufferPool};
use strata::common::{PageId, StrataError, PAGE_SIZE};
use strata::storage::disk::DiskManager;
use tempfile::NamedTempFile;

fn create_pool(pool_size: usize) -> (BufferPoolInstance, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    (BufferPoolInstance::new(pool_size, dm), temp_file)
}

#[test]
fn test_basic_read_write() {
    let (pool, _temp) = create_pool(10);

    let page_id = {
        let mut guard = pool.new_page().unwrap();
        guard.data_mut()[0] = 0xDE;
        guard.data_mut()[1] = 0xAD;
        guard.data_mut()[PAGE_SIZE - 1] = 0xEF;
        guard.page_id()
    };

    let guard = pool.fetch_page_read(page_id).unwrap();
    assert_eq!(guard.data()[0], 0xDE);
    assert_eq!(guard.data()[1], 0xAD);
    assert_eq!(guard.data()[PAGE_SIZE - 1], 0xEF);
}

#[test]
fn test_eviction_writes_back_dirty_pages() {
    // Pool of 10 frames over a 20-page working set: the 11th page must
    // evict the least recently unpinned frame, and the evicted page's
    // bytes must survive the round trip through disk.
    let (pool, _temp) = create_pool(10);

    let mut page_ids = Vec::new();
    for i in 0..10u8 {
        let mut guard = pool.new_page().unwrap();
        guard.data_mut()[0] = i;
        page_ids.push(guard.page_id());
    }

    // Allocate past capacity; pages now get evicted one at a time.
    for i in 10..20u8 {
        let mut guard = pool.new_page().unwrap();
        guard.data_mut()[0] = i;
        page_ids.push(guard.page_id());
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = pool.fetch_page_read(pid).unwrap();
        assert_eq!(guard.data()[0], i as u8, "page {} lost its bytes", pid);
    }
}

#[test]
fn test_pinned_pages_are_never_victims() {
    let (pool, _temp) = create_pool(2);

    let g1 = pool.new_page().unwrap();
    let g2 = pool.new_page().unwrap();

    // Both frames pinned: no victim available.
    assert!(matches!(pool.new_page(), Err(StrataError::PoolExhausted)));

    // Releasing one pin makes exactly one frame evictable.
    drop(g1);
    let g3 = pool.new_page().unwrap();
    assert!(matches!(pool.new_page(), Err(StrataError::PoolExhausted)));
    drop(g2);
    drop(g3);
}

#[test]
fn test_flush_then_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let page_ids: Vec<PageId>;
    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let pool = BufferPoolInstance::new(10, dm);

        page_ids = (0..5u8)
            .map(|i| {
                let mut guard = pool.new_page().unwrap();
                guard.data_mut()[0] = i;
                guard.page_id()
            })
            .collect();

        pool.flush_all_pages().unwrap();
    }

    let dm = Arc::new(DiskManager::new(&path).unwrap());
    let pool = BufferPoolInstance::new(10, dm);
    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = pool.fetch_page_read(pid).unwrap();
        assert_eq!(guard.data()[0], i as u8);
    }
}

#[test]
fn test_delete_refuses_pinned_page() {
    let (pool, _temp) = create_pool(4);

    let guard = pool.new_page().unwrap();
    let page_id = guard.page_id();
    assert!(!pool.delete_page(page_id).unwrap());
    drop(guard);
    assert!(pool.delete_page(page_id).unwrap());
}

#[test]
fn test_concurrent_mixed_access() {
    let (pool, _temp) = create_pool(8);
    let pool = Arc::new(pool);

    let seed_pages: Vec<PageId> = (0..4u8)
        .map(|i| {
            let mut guard = pool.new_page().unwrap();
            guard.data_mut()[0] = i;
            guard.page_id()
        })
        .collect();

    let handles: Vec<_> = (0..4usize)
        .map(|t| {
            let pool = Arc::clone(&pool);
            let seed_pages = seed_pages.clone();
            thread::spawn(move || {
                for round in 0..100usize {
                    let pid = seed_pages[(t + round) % seed_pages.len()];
                    let guard = pool.fetch_page_read(pid).unwrap();
                    assert_eq!(guard.data()[0] as usize, pid.as_usize());
                    drop(guard);

                    let mut guard = pool.new_page().unwrap();
                    guard.data_mut()[4] = t as u8;
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_parallel_pool_round_robin_and_routing() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let pool = ParallelBufferPool::new(4, 4, dm);

    let mut ids = Vec::new();
    for i in 0..8u8 {
        let mut guard = pool.new_page().unwrap();
        guard.data_mut()[0] = i;
        ids.push(guard.page_id());
    }

    // Round-robin allocation: consecutive pages land on consecutive
    // stripes, starting at instance 0.
    for (i, &pid) in ids.iter().enumerate() {
        assert_eq!(pid.as_usize() % 4, i % 4);
    }

    for (i, &pid) in ids.iter().enumerate() {
        let guard = pool.fetch_page_read(pid).unwrap();
        assert_eq!(guard.data()[0], i as u8);
    }
}
