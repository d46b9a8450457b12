use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, StrataError, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{Frame, LruReplacer, ReadPageGuard, WritePageGuard};

/// Common page-access surface shared by a single buffer pool instance
/// and the parallel pool, so index structures and the table heap can
/// run over either.
pub trait BufferPool: Send + Sync {
    /// Allocates a fresh page, pinned and zeroed, latched for writing.
    fn new_page(&self) -> Result<WritePageGuard>;
    /// Pins the page and latches it for reading.
    fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard>;
    /// Pins the page and latches it for writing.
    fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard>;
    /// Writes the page back if resident and clears its dirty flag.
    /// Does not unpin. Returns false when the page is not resident.
    fn flush_page(&self, page_id: PageId) -> Result<bool>;
    /// Flushes every resident page.
    fn flush_all_pages(&self) -> Result<()>;
    /// Drops the page from the pool and deallocates it on disk.
    /// Returns false when the page is still pinned.
    fn delete_page(&self, page_id: PageId) -> Result<bool>;
    /// Total number of frames.
    fn pool_size(&self) -> usize;
}

/// Bookkeeping guarded by the instance latch.
struct PoolState {
    /// page id -> frame holding it
    page_table: HashMap<PageId, FrameId>,
    /// frames not holding any page
    free_frames: VecDeque<FrameId>,
    /// page ids deleted from this instance, available for reuse
    free_page_ids: Vec<PageId>,
}

/// State shared with outstanding page guards.
struct PoolShared {
    frames: Vec<Arc<Frame>>,
    state: Mutex<PoolState>,
    replacer: LruReplacer,
}

/// A single buffer pool instance: a fixed set of frames caching disk
/// pages, with LRU eviction over unpinned frames.
///
/// When used as one stripe of a parallel pool, the instance owns the
/// page ids congruent to `instance_index` modulo `num_instances` and
/// allocates new ids with that stride. A standalone instance is the
/// one-stripe special case.
pub struct BufferPoolInstance {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    next_page_id: AtomicU32,
    shared: Arc<PoolShared>,
    scheduler: DiskScheduler,
}

impl BufferPoolInstance {
    /// Creates a standalone instance over the given disk manager.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::with_stripe(pool_size, 1, 0, disk_manager)
    }

    /// Creates one stripe of a parallel pool.
    pub fn with_stripe(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0 && instance_index < num_instances);

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_frames = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_frames.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            next_page_id: AtomicU32::new(instance_index),
            shared: Arc::new(PoolShared {
                frames,
                state: Mutex::new(PoolState {
                    page_table: HashMap::new(),
                    free_frames,
                    free_page_ids: Vec::new(),
                }),
                replacer: LruReplacer::new(pool_size),
            }),
            scheduler: DiskScheduler::new(disk_manager),
        }
    }

    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    /// Returns the pin count of a resident page, or None.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.shared.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|fid| self.shared.frames[fid.as_usize()].pin_count())
    }

    pub fn free_frame_count(&self) -> usize {
        self.shared.state.lock().free_frames.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.scheduler.disk_manager()
    }

    fn owns(&self, page_id: PageId) -> bool {
        page_id.as_u32() % self.num_instances == self.instance_index
    }

    /// Allocates a page id owned by this instance, reusing deleted ids
    /// before advancing the strided counter.
    fn allocate_page_id(&self, state: &mut PoolState) -> PageId {
        if let Some(page_id) = state.free_page_ids.pop() {
            return page_id;
        }
        let raw = self.next_page_id.fetch_add(self.num_instances, Ordering::SeqCst);
        PageId::new(raw)
    }

    /// Takes a frame from the free list, or evicts a victim (writing it
    /// back first when dirty). The caller holds the state lock.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_frames.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self
            .shared
            .replacer
            .victim()
            .ok_or(StrataError::PoolExhausted)?;
        let frame = &self.shared.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            let mut buf = [0u8; PAGE_SIZE];
            frame.copy_to(&mut buf);
            if let Err(e) = self.scheduler.write_page(old_page_id, &buf) {
                // Leave the frame evictable and the mapping intact.
                self.shared.replacer.unpin(frame_id);
                return Err(e);
            }
        }

        state.page_table.remove(&old_page_id);
        frame.reset();
        Ok(frame_id)
    }

    /// Pins the frame holding `page_id`, reading it from disk on a
    /// miss. The frame comes back with its pin count already raised, so
    /// it cannot be evicted between here and guard construction.
    fn pin_page(&self, page_id: PageId) -> Result<Arc<Frame>> {
        if page_id == INVALID_PAGE_ID {
            return Err(StrataError::InvalidPageId(page_id));
        }
        debug_assert!(self.owns(page_id), "page {} routed to wrong instance", page_id);

        let mut state = self.shared.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.shared.frames[frame_id.as_usize()];
            frame.pin();
            self.shared.replacer.pin(frame_id);
            return Ok(Arc::clone(frame));
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.shared.frames[frame_id.as_usize()];

        let mut buf = [0u8; PAGE_SIZE];
        if let Err(e) = self.scheduler.read_page(page_id, &mut buf) {
            state.free_frames.push_back(frame_id);
            return Err(e);
        }

        frame.set_page_id(page_id);
        frame.copy_from(&buf);
        frame.set_dirty(false);
        frame.pin();
        state.page_table.insert(page_id, frame_id);
        Ok(Arc::clone(frame))
    }

    /// Builds the guard release closure: decrement the pin count, fold
    /// in the dirty bit, and make the frame evictable at pin zero.
    fn release_fn(&self) -> super::page_guard::ReleaseFn {
        let shared = Arc::clone(&self.shared);
        Box::new(move |page_id, dirtied| {
            let state = shared.state.lock();
            if let Some(&frame_id) = state.page_table.get(&page_id) {
                let frame = &shared.frames[frame_id.as_usize()];
                if dirtied {
                    frame.set_dirty(true);
                }
                if frame.unpin() == Some(0) {
                    shared.replacer.unpin(frame_id);
                }
            }
        })
    }
}

impl BufferPool for BufferPoolInstance {
    fn new_page(&self) -> Result<WritePageGuard> {
        let (frame, page_id) = {
            let mut state = self.shared.state.lock();
            let frame_id = self.acquire_frame(&mut state)?;
            let page_id = self.allocate_page_id(&mut state);
            let frame = &self.shared.frames[frame_id.as_usize()];
            frame.reset();
            frame.set_page_id(page_id);
            frame.pin();
            state.page_table.insert(page_id, frame_id);
            (Arc::clone(frame), page_id)
        };
        Ok(unsafe { WritePageGuard::new(page_id, frame, self.release_fn()) })
    }

    fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.pin_page(page_id)?;
        Ok(unsafe { ReadPageGuard::new(page_id, frame, self.release_fn()) })
    }

    fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.pin_page(page_id)?;
        Ok(unsafe { WritePageGuard::new(page_id, frame, self.release_fn()) })
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool> {
        // Pin the frame so it cannot be evicted, then do the write
        // outside the state lock.
        let frame = {
            let state = self.shared.state.lock();
            match state.page_table.get(&page_id) {
                None => return Ok(false),
                Some(&frame_id) => {
                    let frame = &self.shared.frames[frame_id.as_usize()];
                    frame.pin();
                    self.shared.replacer.pin(frame_id);
                    Arc::clone(frame)
                }
            }
        };

        let result = {
            // Hold the page latch across write + dirty clear so a
            // concurrent writer cannot slip in between them.
            let data = frame.data.read();
            let r = self.scheduler.write_page(page_id, &data[..]);
            if r.is_ok() {
                frame.set_dirty(false);
            }
            r
        };

        let _state = self.shared.state.lock();
        if frame.unpin() == Some(0) {
            self.shared.replacer.unpin(frame.frame_id());
        }
        result.map(|_| true)
    }

    fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageId> = {
            let state = self.shared.state.lock();
            state.page_table.keys().copied().collect()
        };
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.shared.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.shared.frames[frame_id.as_usize()];
            if frame.pin_count() > 0 {
                return Ok(false);
            }
            state.page_table.remove(&page_id);
            self.shared.replacer.pin(frame_id);
            frame.reset();
            state.free_frames.push_back(frame_id);
            state.free_page_ids.push(page_id);
        }
        self.scheduler.disk_manager().deallocate_page(page_id);
        Ok(true)
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }
}
