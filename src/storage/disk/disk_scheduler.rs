use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;
use tokio::sync::oneshot;

use crate::common::config::{PageId, PAGE_SIZE};
use crate::storage::disk::DiskManager;

pub type FrameContent = Arc<RwLock<[u8; PAGE_SIZE]>>;

/// A Read or Write request for the background disk thread to execute.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        content: FrameContent,
        callback: oneshot::Sender<()>,
    },
    Write {
        page_id: PageId,
        content: FrameContent,
        callback: oneshot::Sender<()>,
    },
}

/// Schedules disk read and write operations on a single background worker
/// thread so that the buffer pool manager's pool latch never blocks on I/O
/// issued by a different caller's request; the pool latch itself is still
/// held across the blocking wait for the request's completion, matching the
/// coarse-latch contract of the buffer pool.
pub struct DiskScheduler {
    request_queue: std::sync::mpsc::Sender<Option<DiskRequest>>,
    background_thread: Option<thread::JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        Self {
            request_queue: tx,
            background_thread: Some(thread::spawn(move || {
                Self::start_worker_thread(rx, disk_manager)
            })),
        }
    }

    /// Schedules `r` for execution and returns immediately; the caller waits
    /// on `r`'s own completion channel.
    pub fn schedule(&self, r: DiskRequest) {
        self.request_queue.send(Some(r)).unwrap();
    }

    fn start_worker_thread(
        rx: std::sync::mpsc::Receiver<Option<DiskRequest>>,
        disk_manager: Arc<DiskManager>,
    ) {
        while let Ok(r) = rx.recv() {
            match r {
                Some(DiskRequest::Read {
                    page_id,
                    content,
                    callback,
                }) => {
                    disk_manager.read_page(page_id, &mut *content.write());
                    let _ = callback.send(());
                }
                Some(DiskRequest::Write {
                    page_id,
                    content,
                    callback,
                }) => {
                    disk_manager.write_page(page_id, &*content.read());
                    let _ = callback.send(());
                }
                None => break,
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        let _ = self.request_queue.send(None);
        if let Some(handle) = self.background_thread.take() {
            let _ = handle.join();
        }
    }
}
