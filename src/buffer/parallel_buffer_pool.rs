use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{PageId, Result, StrataError};
use crate::storage::disk::DiskManager;

use super::{BufferPool, BufferPoolInstance, ReadPageGuard, WritePageGuard};

/// Stripes the page-id space across independent buffer pool instances
/// sharing one disk manager. A page lives in instance
/// `page_id % num_instances`; allocation round-robins across instances
/// so consecutive `new_page` calls land on different stripes.
pub struct ParallelBufferPool {
    instances: Vec<BufferPoolInstance>,
    /// Next instance to try for allocation; advances by one per attempt
    /// and persists across calls.
    allocate_index: Mutex<usize>,
}

impl ParallelBufferPool {
    pub fn new(num_instances: usize, pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        assert!(num_instances > 0);
        let instances = (0..num_instances)
            .map(|i| {
                BufferPoolInstance::with_stripe(
                    pool_size,
                    num_instances as u32,
                    i as u32,
                    Arc::clone(&disk_manager),
                )
            })
            .collect();

        Self {
            instances,
            allocate_index: Mutex::new(0),
        }
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Returns the instance responsible for the given page.
    pub fn instance_for(&self, page_id: PageId) -> &BufferPoolInstance {
        &self.instances[page_id.as_usize() % self.instances.len()]
    }
}

impl BufferPool for ParallelBufferPool {
    fn new_page(&self) -> Result<WritePageGuard> {
        let mut index = self.allocate_index.lock();
        for _ in 0..self.instances.len() {
            let attempt = *index;
            *index = (*index + 1) % self.instances.len();
            match self.instances[attempt].new_page() {
                Ok(guard) => return Ok(guard),
                Err(StrataError::PoolExhausted) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(StrataError::PoolExhausted)
    }

    fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        self.instance_for(page_id).fetch_page_read(page_id)
    }

    fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        self.instance_for(page_id).fetch_page_write(page_id)
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool> {
        self.instance_for(page_id).flush_page(page_id)
    }

    fn flush_all_pages(&self) -> Result<()> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<bool> {
        self.instance_for(page_id).delete_page(page_id)
    }

    fn pool_size(&self) -> usize {
        self.instances.len() * self.instances[0].pool_size()
    }
}
