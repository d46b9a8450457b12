use crate::common::{PageId, RecordId, Result, SlotId};

use super::slotted_page::{SlottedPage, SlottedPageRef};

/// Table page header (after the slotted page header):
///
/// | Field        | Offset | Size |
/// |--------------|--------|------|
/// | next_page_id | 16     | 4    |
/// | prev_page_id | 20     | 4    |
///
/// Table pages form a doubly-linked list; the table heap walks it for
/// scans and first-fit inserts.
const NEXT_PAGE_ID_OFFSET: usize = 16;
const PREV_PAGE_ID_OFFSET: usize = 20;
const TABLE_HEADER_SIZE: usize = 24;

const INVALID_PAGE: u32 = u32::MAX;

/// Mutable view of a page in a table's page list.
pub struct TablePage<'a> {
    inner: SlottedPage<'a>,
}

impl<'a> TablePage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            inner: SlottedPage::new(data),
        }
    }

    /// Initializes a fresh table page with empty links.
    pub fn init(&mut self, page_id: PageId) {
        self.inner.init(page_id);
        self.inner.set_free_space_start(TABLE_HEADER_SIZE as u16);
        self.set_next_page_id(None);
        self.set_prev_page_id(None);
    }

    pub fn page_id(&self) -> PageId {
        self.inner.page_id()
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        let bytes: [u8; 4] = self.inner.data[NEXT_PAGE_ID_OFFSET..NEXT_PAGE_ID_OFFSET + 4]
            .try_into()
            .unwrap();
        let value = u32::from_le_bytes(bytes);
        (value != INVALID_PAGE).then(|| PageId::new(value))
    }

    pub fn set_next_page_id(&mut self, page_id: Option<PageId>) {
        let value = page_id.map(|p| p.as_u32()).unwrap_or(INVALID_PAGE);
        self.inner.data[NEXT_PAGE_ID_OFFSET..NEXT_PAGE_ID_OFFSET + 4]
            .copy_from_slice(&value.to_le_bytes());
    }

    pub fn prev_page_id(&self) -> Option<PageId> {
        let bytes: [u8; 4] = self.inner.data[PREV_PAGE_ID_OFFSET..PREV_PAGE_ID_OFFSET + 4]
            .try_into()
            .unwrap();
        let value = u32::from_le_bytes(bytes);
        (value != INVALID_PAGE).then(|| PageId::new(value))
    }

    pub fn set_prev_page_id(&mut self, page_id: Option<PageId>) {
        let value = page_id.map(|p| p.as_u32()).unwrap_or(INVALID_PAGE);
        self.inner.data[PREV_PAGE_ID_OFFSET..PREV_PAGE_ID_OFFSET + 4]
            .copy_from_slice(&value.to_le_bytes());
    }

    /// Inserts a tuple and returns its record ID.
    pub fn insert_tuple(&mut self, tuple: &[u8]) -> Result<RecordId> {
        let slot_id = self.inner.insert_tuple(tuple)?;
        Ok(RecordId::new(self.page_id(), slot_id))
    }

    pub fn get_tuple(&self, slot_id: SlotId) -> Result<&[u8]> {
        self.inner.get_tuple(slot_id)
    }

    pub fn delete_tuple(&mut self, slot_id: SlotId) -> Result<()> {
        self.inner.delete_tuple(slot_id)
    }

    pub fn update_tuple(&mut self, slot_id: SlotId, new_data: &[u8]) -> Result<()> {
        self.inner.update_tuple(slot_id, new_data)
    }

    pub fn can_insert(&self, tuple_size: usize) -> bool {
        self.inner.can_insert(tuple_size)
    }

    pub fn free_space(&self) -> usize {
        self.inner.free_space()
    }

    pub fn tuple_count(&self) -> usize {
        self.inner.tuple_count()
    }

    /// Record IDs of the live tuples in this page.
    pub fn record_ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        let page_id = self.page_id();
        self.inner
            .slot_ids()
            .map(move |slot_id| RecordId::new(page_id, slot_id))
    }
}

/// Read-only view of a table page.
pub struct TablePageRef<'a> {
    inner: SlottedPageRef<'a>,
}

impl<'a> TablePageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: SlottedPageRef::new(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.inner.page_id()
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        let bytes: [u8; 4] = self.inner.data[NEXT_PAGE_ID_OFFSET..NEXT_PAGE_ID_OFFSET + 4]
            .try_into()
            .unwrap();
        let value = u32::from_le_bytes(bytes);
        (value != INVALID_PAGE).then(|| PageId::new(value))
    }

    pub fn get_tuple(&self, slot_id: SlotId) -> Result<&[u8]> {
        self.inner.get_tuple(slot_id)
    }

    pub fn tuple_count(&self) -> usize {
        self.inner.tuple_count()
    }

    pub fn record_ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        let page_id = self.page_id();
        self.inner
            .slot_ids()
            .map(move |slot_id| RecordId::new(page_id, slot_id))
    }
}
