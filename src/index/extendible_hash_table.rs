use std::marker::PhantomData;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::buffer::BufferPool;
use crate::common::{PageId, Result, DIRECTORY_MAX_DEPTH};
use crate::index::bucket_page::{BucketPage, BucketPageRef};
use crate::index::codec::{FixedCodec, KeyComparator};
use crate::index::directory_page::{DirectoryPage, DirectoryPageRef};

/// Disk-resident extendible hash table.
///
/// One directory page routes the low `global_depth` bits of a key's
/// hash to a bucket page. Lookups, removals, and non-splitting inserts
/// run under the table latch in read mode with per-page latches taken
/// through the buffer pool guards; directory reshaping (bucket splits
/// and merges) runs under the table latch in write mode and therefore
/// excludes every other operation.
///
/// `(key, value)` pairs form a set: a key may map to several values but
/// the same pair is stored at most once.
pub struct ExtendibleHashTable<K, V, C> {
    directory_page_id: PageId,
    bpm: Arc<dyn BufferPool>,
    table_latch: RwLock<()>,
    comparator: C,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, C> ExtendibleHashTable<K, V, C>
where
    K: FixedCodec,
    V: FixedCodec + PartialEq,
    C: KeyComparator<K>,
{
    /// Creates a fresh table: a directory page at depth 0 pointing at a
    /// single empty bucket.
    pub fn new(bpm: Arc<dyn BufferPool>, comparator: C) -> Result<Self> {
        let directory_page_id;
        {
            let mut dir_guard = bpm.new_page()?;
            directory_page_id = dir_guard.page_id();

            let bucket_guard = bpm.new_page()?;
            let first_bucket_page_id = bucket_guard.page_id();
            drop(bucket_guard); // freshly zeroed page is a valid empty bucket

            let mut dir = DirectoryPage::new(dir_guard.data_mut());
            dir.init(directory_page_id);
            dir.set_local_depth(0, 0);
            dir.set_bucket_page_id(0, first_bucket_page_id);
        }

        Ok(Self {
            directory_page_id,
            bpm,
            table_latch: RwLock::new(()),
            comparator,
            _marker: PhantomData,
        })
    }

    /// Reopens a table whose directory already exists on disk.
    pub fn open(directory_page_id: PageId, bpm: Arc<dyn BufferPool>, comparator: C) -> Self {
        Self {
            directory_page_id,
            bpm,
            table_latch: RwLock::new(()),
            comparator,
            _marker: PhantomData,
        }
    }

    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    fn hash_of(&self, key: &K) -> u32 {
        let mut buf = vec![0u8; K::SIZE];
        key.encode(&mut buf);
        crc32fast::hash(&buf)
    }

    /// Returns every value stored under the key.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>> {
        let _table = self.table_latch.read();

        let dir_guard = self.bpm.fetch_page_read(self.directory_page_id)?;
        let dir = DirectoryPageRef::new(dir_guard.data());
        let index = (self.hash_of(key) & dir.global_depth_mask()) as usize;
        let bucket_page_id = dir.bucket_page_id(index);

        let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
        let bucket: BucketPageRef<K, V> = BucketPageRef::new(bucket_guard.data());
        Ok(bucket.get_value(key, &self.comparator))
    }

    /// Inserts the pair; returns false if it was already present or the
    /// directory cannot grow any further.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        {
            let _table = self.table_latch.read();

            let dir_guard = self.bpm.fetch_page_read(self.directory_page_id)?;
            let dir = DirectoryPageRef::new(dir_guard.data());
            let index = (self.hash_of(key) & dir.global_depth_mask()) as usize;
            let bucket_page_id = dir.bucket_page_id(index);

            let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
            let mut bucket: BucketPage<K, V> = BucketPage::new(bucket_guard.data_mut());
            if !bucket.is_full() {
                return Ok(bucket.insert(key, value, &self.comparator));
            }
            if bucket.contains(key, value, &self.comparator) {
                return Ok(false);
            }
            // Full bucket: fall through to the write-locked split path.
        }
        self.split_insert(key, value)
    }

    /// Split path: runs alone under the table write latch. Splits the
    /// target bucket (doubling the directory when its local depth has
    /// reached the global depth) until the key's bucket has room.
    fn split_insert(&self, key: &K, value: &V) -> Result<bool> {
        let _table = self.table_latch.write();

        let mut dir_guard = self.bpm.fetch_page_write(self.directory_page_id)?;
        let mut dir = DirectoryPage::new(dir_guard.data_mut());

        loop {
            let index = (self.hash_of(key) & dir.global_depth_mask()) as usize;
            let bucket_page_id = dir.bucket_page_id(index);

            {
                let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
                let mut bucket: BucketPage<K, V> = BucketPage::new(bucket_guard.data_mut());

                if !bucket.is_full() {
                    return Ok(bucket.insert(key, value, &self.comparator));
                }
                if bucket.contains(key, value, &self.comparator) {
                    return Ok(false);
                }

                if dir.local_depth(index) >= dir.global_depth() {
                    if dir.global_depth() >= DIRECTORY_MAX_DEPTH {
                        debug!(
                            "insert rejected: directory already at max depth {}",
                            DIRECTORY_MAX_DEPTH
                        );
                        return Ok(false);
                    }
                    // Double the directory by mirroring the live half.
                    let old_size = dir.size();
                    for i in 0..old_size {
                        dir.set_local_depth(old_size + i, dir.local_depth(i));
                        dir.set_bucket_page_id(old_size + i, dir.bucket_page_id(i));
                    }
                    dir.incr_global_depth();
                    debug!("directory doubled to global depth {}", dir.global_depth());
                }

                let mut new_bucket_guard = self.bpm.new_page()?;
                let new_bucket_page_id = new_bucket_guard.page_id();
                let mut new_bucket: BucketPage<K, V> =
                    BucketPage::new(new_bucket_guard.data_mut());

                // Repoint the split-image half of the old bucket's
                // directory entries and bump local depths on both.
                let split_index = dir.split_image_index(index);
                dir.incr_local_depth(index);
                let mask = dir.local_depth_mask(index) as usize;
                for i in 0..dir.size() {
                    if (i & mask) == (index & mask) {
                        if i != index {
                            dir.incr_local_depth(i);
                        }
                    } else if (i & mask) == (split_index & mask) {
                        dir.incr_local_depth(i);
                        dir.set_bucket_page_id(i, new_bucket_page_id);
                    }
                }

                // Redistribute: pairs whose hash routes to the split
                // image move to the new bucket.
                for slot in 0..bucket.capacity() {
                    if !bucket.is_occupied(slot) {
                        break;
                    }
                    if !bucket.is_readable(slot) {
                        continue;
                    }
                    let slot_key = bucket.key_at(slot);
                    let target = (self.hash_of(&slot_key) & dir.global_depth_mask()) as usize;
                    if (target & mask) == (split_index & mask) {
                        let slot_value: V = bucket.value_at(slot);
                        bucket.remove_at(slot);
                        new_bucket.insert(&slot_key, &slot_value, &self.comparator);
                    }
                }
                debug!(
                    "split bucket {} into {} at local depth {}",
                    bucket_page_id,
                    new_bucket_page_id,
                    dir.local_depth(index)
                );
            }
            // A pathological key distribution can leave the target
            // bucket still full; loop and split again.
        }
    }

    /// Removes the pair; returns false if it was not present. An
    /// emptied bucket triggers a merge with its image when both sit at
    /// the same local depth.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool> {
        let removed;
        let mut needs_merge = false;
        {
            let _table = self.table_latch.read();

            let dir_guard = self.bpm.fetch_page_read(self.directory_page_id)?;
            let dir = DirectoryPageRef::new(dir_guard.data());
            let index = (self.hash_of(key) & dir.global_depth_mask()) as usize;
            let bucket_page_id = dir.bucket_page_id(index);

            let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
            let mut bucket: BucketPage<K, V> = BucketPage::new(bucket_guard.data_mut());
            removed = bucket.remove(key, value, &self.comparator);

            if removed
                && bucket.is_empty()
                && dir.global_depth() > 0
                && dir.local_depth(index) > 0
            {
                let merge_index = dir.merge_image_index(index);
                if dir.local_depth(merge_index) == dir.local_depth(index) {
                    needs_merge = true;
                }
            }
        }
        if needs_merge {
            self.merge(key)?;
        }
        Ok(removed)
    }

    /// Merge path: runs alone under the table write latch. Folds the
    /// key's (empty) bucket into its merge image, shrinking the
    /// directory when possible, and cascades up while the predicate
    /// keeps holding.
    fn merge(&self, key: &K) -> Result<()> {
        loop {
            let _table = self.table_latch.write();

            let mut dir_guard = self.bpm.fetch_page_write(self.directory_page_id)?;
            let mut dir = DirectoryPage::new(dir_guard.data_mut());

            let index = (self.hash_of(key) & dir.global_depth_mask()) as usize;
            let bucket_page_id = dir.bucket_page_id(index);

            // Re-check the merge predicate now that we hold the write
            // latch; a concurrent insert may have refilled the bucket.
            if dir.global_depth() == 0 || dir.local_depth(index) == 0 {
                return Ok(());
            }
            let merge_index = dir.merge_image_index(index);
            let merge_page_id = dir.bucket_page_id(merge_index);
            if dir.local_depth(merge_index) != dir.local_depth(index)
                || merge_page_id == bucket_page_id
            {
                return Ok(());
            }
            {
                let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
                let bucket: BucketPageRef<K, V> = BucketPageRef::new(bucket_guard.data());
                if !bucket.is_empty() {
                    return Ok(());
                }
            }

            dir.decr_local_depth(index);
            dir.decr_local_depth(merge_index);
            for i in 0..dir.size() {
                if dir.bucket_page_id(i) == bucket_page_id {
                    dir.set_bucket_page_id(i, merge_page_id);
                    dir.set_local_depth(i, dir.local_depth(merge_index));
                } else if dir.bucket_page_id(i) == merge_page_id && i != merge_index {
                    dir.set_local_depth(i, dir.local_depth(merge_index));
                }
            }
            if dir.can_shrink() {
                dir.decr_global_depth();
                debug!("directory shrunk to global depth {}", dir.global_depth());
            }
            debug!("merged bucket {} into {}", bucket_page_id, merge_page_id);

            self.bpm.delete_page(bucket_page_id)?;
            // Cascade: the surviving bucket may itself be empty and
            // mergeable with its image at the new depth.
        }
    }

    /// Current global depth of the directory.
    pub fn global_depth(&self) -> Result<u32> {
        let _table = self.table_latch.read();
        let dir_guard = self.bpm.fetch_page_read(self.directory_page_id)?;
        Ok(DirectoryPageRef::new(dir_guard.data()).global_depth())
    }

    /// Panics unless the directory satisfies the extendible hashing
    /// invariants.
    pub fn verify_integrity(&self) -> Result<()> {
        let _table = self.table_latch.read();
        let dir_guard = self.bpm.fetch_page_read(self.directory_page_id)?;
        DirectoryPageRef::new(dir_guard.data()).verify_integrity();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolInstance;
    use crate::index::codec::OrdComparator;
    use crate::storage::disk::DiskManager;
    use tempfile::NamedTempFile;

    fn create_table() -> (
        ExtendibleHashTable<u32, u32, OrdComparator>,
        NamedTempFile,
    ) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm: Arc<dyn BufferPool> = Arc::new(BufferPoolInstance::new(50, dm));
        let table = ExtendibleHashTable::new(bpm, OrdComparator).unwrap();
        (table, temp_file)
    }

    #[test]
    fn test_hash_table_starts_at_depth_zero() {
        let (table, _temp) = create_table();
        assert_eq!(table.global_depth().unwrap(), 0);
        table.verify_integrity().unwrap();
    }

    #[test]
    fn test_hash_table_insert_and_get() {
        let (table, _temp) = create_table();

        for i in 0..100u32 {
            assert!(table.insert(&i, &i).unwrap());
        }
        for i in 0..100u32 {
            assert_eq!(table.get_value(&i).unwrap(), vec![i]);
        }
        assert_eq!(table.get_value(&1000).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn test_hash_table_duplicate_pair_rejected() {
        let (table, _temp) = create_table();

        assert!(table.insert(&0, &0).unwrap());
        assert!(!table.insert(&0, &0).unwrap());
        assert_eq!(table.get_value(&0).unwrap(), vec![0]);
    }

    #[test]
    fn test_hash_table_multiple_values_per_key() {
        let (table, _temp) = create_table();

        assert!(table.insert(&0, &0).unwrap());
        assert!(table.insert(&0, &1).unwrap());
        let mut values = table.get_value(&0).unwrap();
        values.sort_unstable();
        assert_eq!(values, vec![0, 1]);
    }

    #[test]
    fn test_hash_table_remove() {
        let (table, _temp) = create_table();

        assert!(table.insert(&5, &50).unwrap());
        assert!(table.remove(&5, &50).unwrap());
        assert!(!table.remove(&5, &50).unwrap());
        assert_eq!(table.get_value(&5).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn test_hash_table_grows_directory() {
        let (table, _temp) = create_table();

        // More pairs than one bucket holds forces at least one split.
        let count = 2000u32;
        for i in 0..count {
            assert!(table.insert(&i, &i).unwrap(), "insert {} failed", i);
        }
        assert!(table.global_depth().unwrap() >= 1);
        table.verify_integrity().unwrap();

        for i in 0..count {
            assert_eq!(table.get_value(&i).unwrap(), vec![i], "lost key {}", i);
        }
    }

    #[test]
    fn test_hash_table_shrinks_after_removing_all() {
        let (table, _temp) = create_table();

        let count = 2000u32;
        for i in 0..count {
            table.insert(&i, &i).unwrap();
        }
        assert!(table.global_depth().unwrap() >= 1);

        for i in 0..count {
            assert!(table.remove(&i, &i).unwrap(), "remove {} failed", i);
        }
        table.verify_integrity().unwrap();
        assert!(table.global_depth().unwrap() <= 1);
    }
}
