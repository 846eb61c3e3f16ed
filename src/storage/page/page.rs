use std::sync::Arc;

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};

use crate::common::config::PAGE_SIZE;

/// The raw bytes backing a single frame, behind a readers-writer latch.
///
/// This latch is the "page-level latch" the B+ tree uses for latch
/// crabbing; it is deliberately a separate lock from the buffer pool's pool
/// latch (which protects pin counts and the page table, not page bytes), so
/// a thread holding a page latch across several buffer-pool calls never
/// contends with unrelated `fetch_page`/`unpin_page` traffic on other pages.
///
/// The frame this wraps is reused across unrelated page ids over its
/// lifetime (see `BufferPoolManager`): a `Page` handle only makes sense
/// together with the page id the caller fetched it for.
#[derive(Clone)]
pub struct Page(Arc<RwLock<[u8; PAGE_SIZE]>>);

pub type PageReadGuard = ArcRwLockReadGuard<RawRwLock, [u8; PAGE_SIZE]>;
pub type PageWriteGuard = ArcRwLockWriteGuard<RawRwLock, [u8; PAGE_SIZE]>;

impl Page {
    pub fn new() -> Page {
        Page(Arc::new(RwLock::new([0; PAGE_SIZE])))
    }

    pub fn reset(&self) {
        self.0.write().fill(0);
    }

    /// Transient read access, for internal buffer-pool use (flushing a
    /// victim, round-tripping test data). Tree code should prefer
    /// `read_arc`/`write_arc` held across a descent step.
    pub fn get_data(&self) -> parking_lot::MappedRwLockReadGuard<'_, [u8; PAGE_SIZE]> {
        parking_lot::RwLockReadGuard::map(self.0.read(), |d| d)
    }

    pub fn get_data_mut(&self) -> parking_lot::MappedRwLockWriteGuard<'_, [u8; PAGE_SIZE]> {
        parking_lot::RwLockWriteGuard::map(self.0.write(), |d| d)
    }

    /// Acquires the content latch for reading, owning a clone of the
    /// underlying `Arc` so the guard can be stored in a struct (e.g.
    /// `ReadPageGuard`) without a borrowed lifetime.
    pub fn read_arc(&self) -> PageReadGuard {
        parking_lot::RwLock::read_arc(&self.0)
    }

    pub fn write_arc(&self) -> PageWriteGuard {
        parking_lot::RwLock::write_arc(&self.0)
    }

    pub(crate) fn content(&self) -> Arc<RwLock<[u8; PAGE_SIZE]>> {
        self.0.clone()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
