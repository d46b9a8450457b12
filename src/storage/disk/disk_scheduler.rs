use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::error;

use crate::common::{PageId, Result, StrataError, PAGE_SIZE};

use super::DiskManager;

type PageBuf = Box<[u8; PAGE_SIZE]>;

/// A disk I/O request handed to the background worker. Requests own
/// their buffers; completion (and for reads, the data) comes back over
/// the reply channel.
enum DiskRequest {
    Read {
        page_id: PageId,
        reply: Sender<Result<PageBuf>>,
    },
    Write {
        page_id: PageId,
        data: PageBuf,
        reply: Sender<Result<()>>,
    },
}

/// DiskScheduler runs a background worker thread that drains a bounded
/// request queue against the disk manager. The buffer pool issues all
/// of its page I/O through the synchronous wrappers below.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm = Arc::clone(&disk_manager);
        let stop = Arc::clone(&shutdown);
        let worker_handle = thread::spawn(move || Self::run_worker(dm, receiver, stop));

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Reads a page through the worker, blocking until completion.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = bounded(1);
        self.request_sender
            .send(DiskRequest::Read { page_id, reply: tx })
            .map_err(|e| StrataError::Scheduler(format!("failed to queue read: {}", e)))?;

        let buf = rx
            .recv()
            .map_err(|e| StrataError::Scheduler(format!("read reply lost: {}", e)))??;
        data.copy_from_slice(&buf[..]);
        Ok(())
    }

    /// Writes a page through the worker, blocking until completion.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(data);

        let (tx, rx) = bounded(1);
        self.request_sender
            .send(DiskRequest::Write {
                page_id,
                data: buf,
                reply: tx,
            })
            .map_err(|e| StrataError::Scheduler(format!("failed to queue write: {}", e)))?;

        rx.recv()
            .map_err(|e| StrataError::Scheduler(format!("write reply lost: {}", e)))?
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn run_worker(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain remaining requests before exiting
                while let Ok(request) = receiver.try_recv() {
                    Self::process(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process(&disk_manager, request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read { page_id, reply } => {
                let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
                let result = disk_manager.read_page(page_id, &mut buf[..]).map(|_| buf);
                if let Err(e) = &result {
                    error!("background read of {} failed: {}", page_id, e);
                }
                let _ = reply.send(result);
            }
            DiskRequest::Write { page_id, data, reply } => {
                let result = disk_manager.write_page(page_id, &data[..]);
                if let Err(e) = &result {
                    error!("background write of {} failed: {}", page_id, e);
                }
                let _ = reply.send(result);
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
