use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::Frame;

/// Callback invoked when a guard is dropped: (page_id, was_dirtied).
/// The buffer pool uses it to decrement the pin count, fold the dirty
/// flag in, and hand the frame to the replacer when the count hits 0.
pub(crate) type ReleaseFn = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// RAII guard holding a pinned page latched for reading.
pub struct ReadPageGuard {
    page_id: PageId,
    /// Keeps the frame alive for the transmuted latch guard below
    _frame: Arc<Frame>,
    latch: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
    release: Option<ReleaseFn>,
}

impl ReadPageGuard {
    /// # Safety
    /// The `'static` latch guard is a lie the `Arc<Frame>` field makes
    /// true: the frame outlives the guard because the guard owns a
    /// strong reference to it.
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<Frame>, release: ReleaseFn) -> Self {
        let latch = frame.data.read();
        let latch: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(latch);
        Self {
            page_id,
            _frame: frame,
            latch: Some(latch),
            release: Some(release),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.as_ref().unwrap()[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the page latch before unpinning, so an eviction
        // triggered by the unpin never waits on our latch.
        self.latch.take();
        if let Some(release) = self.release.take() {
            release(self.page_id, false);
        }
    }
}

/// RAII guard holding a pinned page latched for writing. The first
/// mutable access marks the page dirty.
pub struct WritePageGuard {
    page_id: PageId,
    _frame: Arc<Frame>,
    latch: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
    release: Option<ReleaseFn>,
    dirtied: bool,
}

impl WritePageGuard {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<Frame>, release: ReleaseFn) -> Self {
        let latch = frame.data.write();
        let latch: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(latch);
        Self {
            page_id,
            _frame: frame,
            latch: Some(latch),
            release: Some(release),
            dirtied: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.as_ref().unwrap()[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirtied = true;
        &mut self.latch.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.latch.take();
        if let Some(release) = self.release.take() {
            release(self.page_id, self.dirtied);
        }
    }
}
