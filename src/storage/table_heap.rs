use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::common::{PageId, RecordId, Result, StrataError};
use crate::storage::page::{TablePage, TablePageRef};

/// A table stored as a doubly-linked list of slotted pages, accessed
/// through the buffer pool. Inserts walk the list first-fit and append
/// a page at the tail when nothing fits.
pub struct TableHeap {
    bpm: Arc<dyn BufferPool>,
    first_page_id: PageId,
}

impl TableHeap {
    /// Creates a heap with one empty page.
    pub fn new(bpm: Arc<dyn BufferPool>) -> Result<Self> {
        let first_page_id = {
            let mut guard = bpm.new_page()?;
            let page_id = guard.page_id();
            let mut page = TablePage::new(guard.data_mut());
            page.init(page_id);
            page_id
        };
        Ok(Self { bpm, first_page_id })
    }

    /// Reopens a heap whose first page already exists.
    pub fn open(first_page_id: PageId, bpm: Arc<dyn BufferPool>) -> Self {
        Self { bpm, first_page_id }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Inserts a tuple, returning its record ID.
    pub fn insert_tuple(&self, data: &[u8]) -> Result<RecordId> {
        let mut page_id = self.first_page_id;
        loop {
            let mut guard = self.bpm.fetch_page_write(page_id)?;
            let mut page = TablePage::new(guard.data_mut());

            if page.can_insert(data.len()) {
                return page.insert_tuple(data);
            }

            match page.next_page_id() {
                Some(next) => {
                    drop(guard);
                    page_id = next;
                }
                None => {
                    // Tail reached: append a fresh page and retry there.
                    let mut new_guard = self.bpm.new_page()?;
                    let new_page_id = new_guard.page_id();
                    let mut new_page = TablePage::new(new_guard.data_mut());
                    new_page.init(new_page_id);
                    new_page.set_prev_page_id(Some(page_id));
                    page.set_next_page_id(Some(new_page_id));
                    return new_page.insert_tuple(data);
                }
            }
        }
    }

    /// Reads a tuple; None when the slot is empty or unknown.
    pub fn get_tuple(&self, rid: RecordId) -> Result<Option<Vec<u8>>> {
        let guard = self.bpm.fetch_page_read(rid.page_id)?;
        let page = TablePageRef::new(guard.data());
        match page.get_tuple(rid.slot_id) {
            Ok(data) => Ok(Some(data.to_vec())),
            Err(StrataError::InvalidSlotId(_)) | Err(StrataError::EmptySlot(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Deletes a tuple; false when it was already gone.
    pub fn delete_tuple(&self, rid: RecordId) -> Result<bool> {
        let mut guard = self.bpm.fetch_page_write(rid.page_id)?;
        let mut page = TablePage::new(guard.data_mut());
        match page.delete_tuple(rid.slot_id) {
            Ok(()) => Ok(true),
            Err(StrataError::InvalidSlotId(_)) | Err(StrataError::EmptySlot(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Updates a tuple in place. Returns false when the new bytes do
    /// not fit in the slot; the caller then deletes and reinserts.
    pub fn update_tuple(&self, rid: RecordId, data: &[u8]) -> Result<bool> {
        let mut guard = self.bpm.fetch_page_write(rid.page_id)?;
        let mut page = TablePage::new(guard.data_mut());
        match page.update_tuple(rid.slot_id, data) {
            Ok(()) => Ok(true),
            Err(StrataError::PageOverflow { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Iterator over all live tuples in record-id order.
    pub fn iter(self: Arc<Self>) -> TableIterator {
        let page_id = self.first_page_id;
        TableIterator {
            heap: self,
            page_id: Some(page_id),
            pending: Vec::new(),
            cursor: 0,
        }
    }
}

/// Walks the page list one page at a time, buffering each page's
/// record ids so no page stays pinned between `next` calls.
pub struct TableIterator {
    heap: Arc<TableHeap>,
    page_id: Option<PageId>,
    pending: Vec<RecordId>,
    cursor: usize,
}

impl TableIterator {
    /// Returns the next live tuple, or None at end of table.
    pub fn next(&mut self) -> Result<Option<(RecordId, Vec<u8>)>> {
        loop {
            if self.cursor < self.pending.len() {
                let rid = self.pending[self.cursor];
                self.cursor += 1;
                // A concurrent delete may have removed the tuple since
                // the page was scanned; skip the hole.
                if let Some(data) = self.heap.get_tuple(rid)? {
                    return Ok(Some((rid, data)));
                }
                continue;
            }

            let Some(page_id) = self.page_id else {
                return Ok(None);
            };

            let guard = self.heap.bpm.fetch_page_read(page_id)?;
            let page = TablePageRef::new(guard.data());
            self.pending = page.record_ids().collect();
            self.cursor = 0;
            self.page_id = page.next_page_id();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolInstance;
    use crate::storage::disk::DiskManager;
    use tempfile::NamedTempFile;

    fn create_heap() -> (Arc<TableHeap>, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm: Arc<dyn BufferPool> = Arc::new(BufferPoolInstance::new(16, dm));
        (Arc::new(TableHeap::new(bpm).unwrap()), temp_file)
    }

    #[test]
    fn test_table_heap_insert_get() {
        let (heap, _temp) = create_heap();

        let rid = heap.insert_tuple(b"hello").unwrap();
        assert_eq!(heap.get_tuple(rid).unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn test_table_heap_delete() {
        let (heap, _temp) = create_heap();

        let rid = heap.insert_tuple(b"doomed").unwrap();
        assert!(heap.delete_tuple(rid).unwrap());
        assert!(!heap.delete_tuple(rid).unwrap());
        assert_eq!(heap.get_tuple(rid).unwrap(), None);
    }

    #[test]
    fn test_table_heap_update() {
        let (heap, _temp) = create_heap();

        let rid = heap.insert_tuple(b"aaaa").unwrap();
        assert!(heap.update_tuple(rid, b"bbbb").unwrap());
        assert_eq!(heap.get_tuple(rid).unwrap(), Some(b"bbbb".to_vec()));

        // larger tuple does not fit in place
        assert!(!heap.update_tuple(rid, b"cccccccccc").unwrap());
    }

    #[test]
    fn test_table_heap_spills_to_new_pages() {
        let (heap, _temp) = create_heap();

        let tuple = [7u8; 900];
        let mut rids = Vec::new();
        for _ in 0..20 {
            rids.push(heap.insert_tuple(&tuple).unwrap());
        }

        // More than one page's worth of 900-byte tuples
        let distinct_pages: std::collections::HashSet<_> =
            rids.iter().map(|r| r.page_id).collect();
        assert!(distinct_pages.len() > 1);

        for rid in rids {
            assert_eq!(heap.get_tuple(rid).unwrap(), Some(tuple.to_vec()));
        }
    }

    #[test]
    fn test_table_heap_iterator() {
        let (heap, _temp) = create_heap();

        let mut inserted = Vec::new();
        for i in 0..50u8 {
            inserted.push(heap.insert_tuple(&[i; 200]).unwrap());
        }
        heap.delete_tuple(inserted[10]).unwrap();

        let mut iter = Arc::clone(&heap).iter();
        let mut seen = Vec::new();
        while let Some((rid, _data)) = iter.next().unwrap() {
            seen.push(rid);
        }
        assert_eq!(seen.len(), 49);
        assert!(!seen.contains(&inserted[10]));
    }
}
