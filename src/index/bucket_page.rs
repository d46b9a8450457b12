use std::marker::PhantomData;

use crate::common::PAGE_SIZE;

use super::codec::{FixedCodec, KeyComparator};

/// Number of (key, value) slots that fit in a bucket page. Each slot
/// needs `pair_size` bytes plus two bitmap bits, so capacity is the
/// largest value with `capacity * pair_size + 2 * ceil(capacity / 8)
/// <= PAGE_SIZE`.
pub const fn bucket_capacity(key_size: usize, value_size: usize) -> usize {
    let pair_size = key_size + value_size;
    let mut capacity = (4 * PAGE_SIZE) / (4 * pair_size + 1);
    while capacity * pair_size + 2 * ((capacity + 7) / 8) > PAGE_SIZE {
        capacity -= 1;
    }
    capacity
}

/// Bucket page layout: `occupied bitmap | readable bitmap | slot
/// array`. A slot's occupied bit is set the first time it is used and
/// never cleared, so occupied slots form a dense prefix (inserts always
/// reuse the lowest non-readable slot) and scans can stop at the first
/// never-occupied slot. The readable bit tracks whether the slot
/// currently holds a live pair.
struct Layout {
    capacity: usize,
    bitmap_bytes: usize,
    pair_size: usize,
}

impl Layout {
    fn of(key_size: usize, value_size: usize) -> Self {
        let capacity = bucket_capacity(key_size, value_size);
        Self {
            capacity,
            bitmap_bytes: (capacity + 7) / 8,
            pair_size: key_size + value_size,
        }
    }

    fn pair_offset(&self, slot: usize) -> usize {
        2 * self.bitmap_bytes + slot * self.pair_size
    }
}

fn bit_get(bytes: &[u8], index: usize) -> bool {
    bytes[index / 8] & (1 << (index % 8)) != 0
}

fn bit_set(bytes: &mut [u8], index: usize) {
    bytes[index / 8] |= 1 << (index % 8);
}

fn bit_clear(bytes: &mut [u8], index: usize) {
    bytes[index / 8] &= !(1 << (index % 8));
}

/// Mutable view of a bucket page.
pub struct BucketPage<'a, K, V> {
    data: &'a mut [u8],
    layout: Layout,
    _marker: PhantomData<(K, V)>,
}

impl<'a, K: FixedCodec, V: FixedCodec + PartialEq> BucketPage<'a, K, V> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self {
            data,
            layout: Layout::of(K::SIZE, V::SIZE),
            _marker: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.layout.capacity
    }

    pub fn is_occupied(&self, slot: usize) -> bool {
        bit_get(&self.data[..], slot)
    }

    pub fn is_readable(&self, slot: usize) -> bool {
        bit_get(&self.data[self.layout.bitmap_bytes..], slot)
    }

    pub fn key_at(&self, slot: usize) -> K {
        let offset = self.layout.pair_offset(slot);
        K::decode(&self.data[offset..offset + K::SIZE])
    }

    pub fn value_at(&self, slot: usize) -> V {
        let offset = self.layout.pair_offset(slot) + K::SIZE;
        V::decode(&self.data[offset..offset + V::SIZE])
    }

    /// Marks a slot's pair as removed. The occupied bit stays set.
    pub fn remove_at(&mut self, slot: usize) {
        let bitmap_bytes = self.layout.bitmap_bytes;
        bit_clear(&mut self.data[bitmap_bytes..], slot);
    }

    /// Inserts the pair unless it is already present or the bucket is
    /// full. Fills the lowest non-readable slot.
    pub fn insert<C: KeyComparator<K>>(&mut self, key: &K, value: &V, cmp: &C) -> bool {
        if self.contains(key, value, cmp) {
            return false;
        }

        let mut free_slot = None;
        for slot in 0..self.layout.capacity {
            if !self.is_readable(slot) {
                free_slot = Some(slot);
                break;
            }
        }
        let Some(slot) = free_slot else {
            return false;
        };

        let offset = self.layout.pair_offset(slot);
        key.encode(&mut self.data[offset..offset + K::SIZE]);
        value.encode(&mut self.data[offset + K::SIZE..offset + K::SIZE + V::SIZE]);
        bit_set(&mut self.data[..], slot);
        let bitmap_bytes = self.layout.bitmap_bytes;
        bit_set(&mut self.data[bitmap_bytes..], slot);
        true
    }

    /// Removes the first live pair matching (key, value).
    pub fn remove<C: KeyComparator<K>>(&mut self, key: &K, value: &V, cmp: &C) -> bool {
        for slot in 0..self.layout.capacity {
            if !self.is_occupied(slot) {
                break;
            }
            if self.is_readable(slot)
                && cmp.eq(&self.key_at(slot), key)
                && self.value_at(slot) == *value
            {
                self.remove_at(slot);
                return true;
            }
        }
        false
    }

    pub fn contains<C: KeyComparator<K>>(&self, key: &K, value: &V, cmp: &C) -> bool {
        for slot in 0..self.layout.capacity {
            if !self.is_occupied(slot) {
                break;
            }
            if self.is_readable(slot)
                && cmp.eq(&self.key_at(slot), key)
                && self.value_at(slot) == *value
            {
                return true;
            }
        }
        false
    }

    pub fn get_value<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> Vec<V> {
        let mut result = Vec::new();
        for slot in 0..self.layout.capacity {
            if !self.is_occupied(slot) {
                break;
            }
            if self.is_readable(slot) && cmp.eq(&self.key_at(slot), key) {
                result.push(self.value_at(slot));
            }
        }
        result
    }

    pub fn num_readable(&self) -> usize {
        let mut count = 0;
        for slot in 0..self.layout.capacity {
            if !self.is_occupied(slot) {
                break;
            }
            if self.is_readable(slot) {
                count += 1;
            }
        }
        count
    }

    pub fn is_full(&self) -> bool {
        self.num_readable() == self.layout.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.num_readable() == 0
    }
}

/// Read-only view of a bucket page.
pub struct BucketPageRef<'a, K, V> {
    data: &'a [u8],
    layout: Layout,
    _marker: PhantomData<(K, V)>,
}

impl<'a, K: FixedCodec, V: FixedCodec> BucketPageRef<'a, K, V> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self {
            data,
            layout: Layout::of(K::SIZE, V::SIZE),
            _marker: PhantomData,
        }
    }

    pub fn is_occupied(&self, slot: usize) -> bool {
        bit_get(self.data, slot)
    }

    pub fn is_readable(&self, slot: usize) -> bool {
        bit_get(&self.data[self.layout.bitmap_bytes..], slot)
    }

    pub fn key_at(&self, slot: usize) -> K {
        let offset = self.layout.pair_offset(slot);
        K::decode(&self.data[offset..offset + K::SIZE])
    }

    pub fn value_at(&self, slot: usize) -> V {
        let offset = self.layout.pair_offset(slot) + K::SIZE;
        V::decode(&self.data[offset..offset + V::SIZE])
    }

    pub fn get_value<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> Vec<V> {
        let mut result = Vec::new();
        for slot in 0..self.layout.capacity {
            if !self.is_occupied(slot) {
                break;
            }
            if self.is_readable(slot) && cmp.eq(&self.key_at(slot), key) {
                result.push(self.value_at(slot));
            }
        }
        result
    }

    pub fn num_readable(&self) -> usize {
        let mut count = 0;
        for slot in 0..self.layout.capacity {
            if !self.is_occupied(slot) {
                break;
            }
            if self.is_readable(slot) {
                count += 1;
            }
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.num_readable() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::codec::OrdComparator;

    #[test]
    fn test_bucket_capacity_fits_page() {
        for (k, v) in [(4, 4), (4, 6), (8, 8), (16, 6)] {
            let capacity = bucket_capacity(k, v);
            assert!(capacity > 0);
            assert!(capacity * (k + v) + 2 * ((capacity + 7) / 8) <= PAGE_SIZE);
        }
    }

    #[test]
    fn test_bucket_insert_and_lookup() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket: BucketPage<u32, u32> = BucketPage::new(&mut data);
        let cmp = OrdComparator;

        assert!(bucket.insert(&1, &10, &cmp));
        assert!(bucket.insert(&1, &11, &cmp));
        assert!(bucket.insert(&2, &20, &cmp));

        assert_eq!(bucket.get_value(&1, &cmp), vec![10, 11]);
        assert_eq!(bucket.get_value(&2, &cmp), vec![20]);
        assert_eq!(bucket.get_value(&3, &cmp), Vec::<u32>::new());
        assert_eq!(bucket.num_readable(), 3);
    }

    #[test]
    fn test_bucket_rejects_duplicate_pair() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket: BucketPage<u32, u32> = BucketPage::new(&mut data);
        let cmp = OrdComparator;

        assert!(bucket.insert(&1, &10, &cmp));
        assert!(!bucket.insert(&1, &10, &cmp));
        assert_eq!(bucket.get_value(&1, &cmp), vec![10]);
    }

    #[test]
    fn test_bucket_remove_reuses_slot() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket: BucketPage<u32, u32> = BucketPage::new(&mut data);
        let cmp = OrdComparator;

        assert!(bucket.insert(&1, &10, &cmp));
        assert!(bucket.insert(&2, &20, &cmp));
        assert!(bucket.remove(&1, &10, &cmp));
        assert!(!bucket.remove(&1, &10, &cmp));
        assert_eq!(bucket.num_readable(), 1);

        // slot 0 is free again and must be refilled first
        assert!(bucket.insert(&3, &30, &cmp));
        assert!(bucket.is_readable(0));
        assert_eq!(bucket.key_at(0), 3);
    }

    #[test]
    fn test_bucket_fills_to_capacity() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket: BucketPage<u32, u32> = BucketPage::new(&mut data);
        let cmp = OrdComparator;
        let capacity = bucket.capacity();

        for i in 0..capacity as u32 {
            assert!(bucket.insert(&i, &i, &cmp));
        }
        assert!(bucket.is_full());
        assert!(!bucket.insert(&u32::MAX, &0, &cmp));
    }

    #[test]
    fn test_bucket_empty_after_removing_all() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket: BucketPage<u32, u32> = BucketPage::new(&mut data);
        let cmp = OrdComparator;

        for i in 0..10u32 {
            bucket.insert(&i, &i, &cmp);
        }
        for i in 0..10u32 {
            assert!(bucket.remove(&i, &i, &cmp));
        }
        assert!(bucket.is_empty());
    }
}
