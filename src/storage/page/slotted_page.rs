use crate::common::{PageId, Result, SlotId, StrataError, PAGE_SIZE};

/// Slotted page layout:
///
/// +------------------+
/// | Page Header      |  (HEADER_SIZE bytes)
/// +------------------+
/// | Slot Array       |  (grows downward)
/// +------------------+
/// | Free Space       |
/// +------------------+
/// | Tuple Data       |  (grows upward from the page end)
/// +------------------+
///
/// A slot entry is (offset: u16, length: u16); length 0 marks a
/// deleted slot. Deleting leaves the tuple bytes in place; the slot is
/// reused by the next insert that fits.
const HEADER_SIZE: usize = 16;
const SLOT_SIZE: usize = 4;

const PAGE_ID_OFFSET: usize = 0;
const NUM_SLOTS_OFFSET: usize = 4;
const FREE_SPACE_START_OFFSET: usize = 8;
const FREE_SPACE_END_OFFSET: usize = 12;

/// A slot array entry
#[derive(Debug, Clone, Copy)]
pub struct SlotEntry {
    pub offset: u16,
    pub length: u16,
}

impl SlotEntry {
    pub fn new(offset: u16, length: u16) -> Self {
        Self { offset, length }
    }

    pub fn empty() -> Self {
        Self {
            offset: 0,
            length: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Mutable view over a page interpreted as a slotted page of
/// variable-length tuples.
pub struct SlottedPage<'a> {
    pub(crate) data: &'a mut [u8],
}

impl<'a> SlottedPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    /// Initializes a fresh slotted page.
    pub fn init(&mut self, page_id: PageId) {
        self.data.fill(0);
        self.set_page_id(page_id);
        self.set_num_slots(0);
        self.set_free_space_start(HEADER_SIZE as u16);
        self.set_free_space_end(PAGE_SIZE as u16);
    }

    pub fn page_id(&self) -> PageId {
        let bytes: [u8; 4] = self.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4]
            .try_into()
            .unwrap();
        PageId::new(u32::from_le_bytes(bytes))
    }

    pub fn set_page_id(&mut self, page_id: PageId) {
        self.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4]
            .copy_from_slice(&page_id.as_u32().to_le_bytes());
    }

    pub fn num_slots(&self) -> u16 {
        let bytes: [u8; 4] = self.data[NUM_SLOTS_OFFSET..NUM_SLOTS_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes) as u16
    }

    fn set_num_slots(&mut self, num_slots: u16) {
        self.data[NUM_SLOTS_OFFSET..NUM_SLOTS_OFFSET + 4]
            .copy_from_slice(&(num_slots as u32).to_le_bytes());
    }

    pub fn free_space_start(&self) -> u16 {
        let bytes: [u8; 4] = self.data[FREE_SPACE_START_OFFSET..FREE_SPACE_START_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes) as u16
    }

    pub(crate) fn set_free_space_start(&mut self, offset: u16) {
        self.data[FREE_SPACE_START_OFFSET..FREE_SPACE_START_OFFSET + 4]
            .copy_from_slice(&(offset as u32).to_le_bytes());
    }

    pub fn free_space_end(&self) -> u16 {
        let bytes: [u8; 4] = self.data[FREE_SPACE_END_OFFSET..FREE_SPACE_END_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes) as u16
    }

    fn set_free_space_end(&mut self, offset: u16) {
        self.data[FREE_SPACE_END_OFFSET..FREE_SPACE_END_OFFSET + 4]
            .copy_from_slice(&(offset as u32).to_le_bytes());
    }

    pub fn free_space(&self) -> usize {
        (self.free_space_end() as usize).saturating_sub(self.free_space_start() as usize)
    }

    /// Whether a tuple of the given size fits (tuple bytes plus a slot
    /// entry, pessimistically assuming no reusable slot).
    pub fn can_insert(&self, tuple_size: usize) -> bool {
        self.free_space() >= tuple_size + SLOT_SIZE
    }

    fn slot_array_base(&self) -> usize {
        let num_slots = self.num_slots() as usize;
        (self.free_space_start() as usize).saturating_sub(num_slots * SLOT_SIZE)
    }

    pub fn get_slot(&self, slot_id: SlotId) -> Option<SlotEntry> {
        if slot_id.as_u16() >= self.num_slots() {
            return None;
        }
        let slot_offset = self.slot_array_base() + slot_id.as_u16() as usize * SLOT_SIZE;
        let offset_bytes: [u8; 2] = self.data[slot_offset..slot_offset + 2].try_into().unwrap();
        let length_bytes: [u8; 2] = self.data[slot_offset + 2..slot_offset + 4]
            .try_into()
            .unwrap();
        Some(SlotEntry::new(
            u16::from_le_bytes(offset_bytes),
            u16::from_le_bytes(length_bytes),
        ))
    }

    fn set_slot(&mut self, slot_id: SlotId, entry: SlotEntry) {
        let slot_offset = self.slot_array_base() + slot_id.as_u16() as usize * SLOT_SIZE;
        self.data[slot_offset..slot_offset + 2].copy_from_slice(&entry.offset.to_le_bytes());
        self.data[slot_offset + 2..slot_offset + 4].copy_from_slice(&entry.length.to_le_bytes());
    }

    /// Inserts a tuple and returns its slot ID, reusing a deleted slot
    /// when one exists.
    pub fn insert_tuple(&mut self, tuple: &[u8]) -> Result<SlotId> {
        if !self.can_insert(tuple.len()) {
            return Err(StrataError::PageOverflow {
                tuple_size: tuple.len(),
                available: self.free_space().saturating_sub(SLOT_SIZE),
            });
        }

        let (slot_id, is_new_slot) = self.find_or_create_slot();
        if is_new_slot {
            self.set_free_space_start(self.free_space_start() + SLOT_SIZE as u16);
        }

        let tuple_offset = self.free_space_end() - tuple.len() as u16;
        self.data[tuple_offset as usize..tuple_offset as usize + tuple.len()]
            .copy_from_slice(tuple);
        self.set_slot(slot_id, SlotEntry::new(tuple_offset, tuple.len() as u16));
        self.set_free_space_end(tuple_offset);

        Ok(slot_id)
    }

    fn find_or_create_slot(&mut self) -> (SlotId, bool) {
        let num_slots = self.num_slots();
        for i in 0..num_slots {
            if let Some(entry) = self.get_slot(SlotId::new(i)) {
                if entry.is_empty() {
                    return (SlotId::new(i), false);
                }
            }
        }
        self.set_num_slots(num_slots + 1);
        (SlotId::new(num_slots), true)
    }

    pub fn get_tuple(&self, slot_id: SlotId) -> Result<&[u8]> {
        let entry = self
            .get_slot(slot_id)
            .ok_or(StrataError::InvalidSlotId(slot_id.as_u16()))?;
        if entry.is_empty() {
            return Err(StrataError::EmptySlot(slot_id.as_u16()));
        }
        let start = entry.offset as usize;
        Ok(&self.data[start..start + entry.length as usize])
    }

    /// Marks the slot empty. The tuple bytes are not reclaimed.
    pub fn delete_tuple(&mut self, slot_id: SlotId) -> Result<()> {
        let entry = self
            .get_slot(slot_id)
            .ok_or(StrataError::InvalidSlotId(slot_id.as_u16()))?;
        if entry.is_empty() {
            return Err(StrataError::EmptySlot(slot_id.as_u16()));
        }
        self.set_slot(slot_id, SlotEntry::empty());
        Ok(())
    }

    /// Overwrites the tuple in place. The new data must fit in the
    /// slot's existing extent.
    pub fn update_tuple(&mut self, slot_id: SlotId, new_data: &[u8]) -> Result<()> {
        let entry = self
            .get_slot(slot_id)
            .ok_or(StrataError::InvalidSlotId(slot_id.as_u16()))?;
        if entry.is_empty() {
            return Err(StrataError::EmptySlot(slot_id.as_u16()));
        }
        if new_data.len() > entry.length as usize {
            return Err(StrataError::PageOverflow {
                tuple_size: new_data.len(),
                available: entry.length as usize,
            });
        }

        let start = entry.offset as usize;
        self.data[start..start + new_data.len()].copy_from_slice(new_data);
        if new_data.len() < entry.length as usize {
            self.set_slot(slot_id, SlotEntry::new(entry.offset, new_data.len() as u16));
        }
        Ok(())
    }

    /// Iterator over the non-empty slot IDs.
    pub fn slot_ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        (0..self.num_slots()).filter_map(move |i| {
            let slot_id = SlotId::new(i);
            self.get_slot(slot_id)
                .filter(|e| !e.is_empty())
                .map(|_| slot_id)
        })
    }

    pub fn tuple_count(&self) -> usize {
        self.slot_ids().count()
    }
}

/// Read-only view of a slotted page.
pub struct SlottedPageRef<'a> {
    pub(crate) data: &'a [u8],
}

impl<'a> SlottedPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        let bytes: [u8; 4] = self.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4]
            .try_into()
            .unwrap();
        PageId::new(u32::from_le_bytes(bytes))
    }

    pub fn num_slots(&self) -> u16 {
        let bytes: [u8; 4] = self.data[NUM_SLOTS_OFFSET..NUM_SLOTS_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes) as u16
    }

    fn free_space_start(&self) -> u16 {
        let bytes: [u8; 4] = self.data[FREE_SPACE_START_OFFSET..FREE_SPACE_START_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes) as u16
    }

    fn slot_array_base(&self) -> usize {
        let num_slots = self.num_slots() as usize;
        (self.free_space_start() as usize).saturating_sub(num_slots * SLOT_SIZE)
    }

    pub fn get_slot(&self, slot_id: SlotId) -> Option<SlotEntry> {
        if slot_id.as_u16() >= self.num_slots() {
            return None;
        }
        let slot_offset = self.slot_array_base() + slot_id.as_u16() as usize * SLOT_SIZE;
        let offset_bytes: [u8; 2] = self.data[slot_offset..slot_offset + 2].try_into().unwrap();
        let length_bytes: [u8; 2] = self.data[slot_offset + 2..slot_offset + 4]
            .try_into()
            .unwrap();
        Some(SlotEntry::new(
            u16::from_le_bytes(offset_bytes),
            u16::from_le_bytes(length_bytes),
        ))
    }

    pub fn get_tuple(&self, slot_id: SlotId) -> Result<&[u8]> {
        let entry = self
            .get_slot(slot_id)
            .ok_or(StrataError::InvalidSlotId(slot_id.as_u16()))?;
        if entry.is_empty() {
            return Err(StrataError::EmptySlot(slot_id.as_u16()));
        }
        let start = entry.offset as usize;
        Ok(&self.data[start..start + entry.length as usize])
    }

    pub fn slot_ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        (0..self.num_slots()).filter_map(move |i| {
            let slot_id = SlotId::new(i);
            self.get_slot(slot_id)
                .filter(|e| !e.is_empty())
                .map(|_| slot_id)
        })
    }

    pub fn tuple_count(&self) -> usize {
        self.slot_ids().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slotted_page_init() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::new(&mut data);
        page.init(PageId::new(1));

        assert_eq!(page.page_id(), PageId::new(1));
        assert_eq!(page.num_slots(), 0);
        assert_eq!(page.free_space(), PAGE_SIZE - HEADER_SIZE);
    }

    #[test]
    fn test_slotted_page_insert_get() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::new(&mut data);
        page.init(PageId::new(1));

        let slot_id = page.insert_tuple(b"Hello, World!").unwrap();
        assert_eq!(slot_id, SlotId::new(0));
        assert_eq!(page.get_tuple(slot_id).unwrap(), b"Hello, World!");
        assert_eq!(page.tuple_count(), 1);
    }

    #[test]
    fn test_slotted_page_delete_and_reuse_slot() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::new(&mut data);
        page.init(PageId::new(1));

        let first = page.insert_tuple(b"first").unwrap();
        let _second = page.insert_tuple(b"second").unwrap();

        page.delete_tuple(first).unwrap();
        assert!(page.get_tuple(first).is_err());
        assert_eq!(page.tuple_count(), 1);

        let third = page.insert_tuple(b"third").unwrap();
        assert_eq!(third, first);
    }

    #[test]
    fn test_slotted_page_update_in_place() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::new(&mut data);
        page.init(PageId::new(1));

        let slot_id = page.insert_tuple(b"Hello").unwrap();
        page.update_tuple(slot_id, b"Hi").unwrap();
        assert_eq!(page.get_tuple(slot_id).unwrap(), b"Hi");

        assert!(page.update_tuple(slot_id, b"this is far too long").is_err());
    }

    #[test]
    fn test_slotted_page_fills_up() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = SlottedPage::new(&mut data);
        page.init(PageId::new(1));

        let tuple = [0u8; 1000];
        let mut count = 0;
        while page.can_insert(tuple.len()) {
            page.insert_tuple(&tuple).unwrap();
            count += 1;
        }
        assert!(count >= 3);
        assert!(page.insert_tuple(&tuple).is_err());
    }

    #[test]
    fn test_slotted_page_ref_view() {
        let mut data = [0u8; PAGE_SIZE];
        {
            let mut page = SlottedPage::new(&mut data);
            page.init(PageId::new(1));
            page.insert_tuple(b"Test").unwrap();
        }

        let page = SlottedPageRef::new(&data);
        assert_eq!(page.page_id(), PageId::new(1));
        assert_eq!(page.tuple_count(), 1);
        assert_eq!(page.get_tuple(SlotId::new(0)).unwrap(), b"Test");
    }
}
