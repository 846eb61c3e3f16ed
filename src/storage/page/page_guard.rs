use std::sync::Arc;

use crate::buffer::buffer_pool_manager::BufferPoolManager;
use crate::common::config::PageId;
use crate::storage::page::page::{Page, PageReadGuard, PageWriteGuard};

/// An RAII handle on a fetched page that has not (yet) taken the page's own
/// content latch. Dropping it unpins the page; it never blocks on the
/// content latch itself, so callers that only need the pin (e.g. to upgrade
/// into a `ReadPageGuard`/`WritePageGuard` right away) don't pay for two
/// latch acquisitions.
pub struct BasicPageGuard {
    bpm: Arc<BufferPoolManager>,
    page_id: PageId,
    page: Option<Page>,
    is_dirty: bool,
}

impl BasicPageGuard {
    pub fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, page: Page) -> BasicPageGuard {
        Self {
            bpm,
            page_id,
            page: Some(page),
            is_dirty: false,
        }
    }

    /// Upgrades to a `ReadPageGuard`, holding the page's content latch for
    /// reading. The pin this guard was holding transfers to the returned
    /// guard; this guard no longer unpins anything once this returns.
    pub fn upgrade_read(mut self) -> ReadPageGuard {
        let page = self.page.take().expect("page guard already consumed");
        let latch = page.read_arc();
        let guard = BasicPageGuard {
            bpm: self.bpm.clone(),
            page_id: self.page_id,
            page: Some(page),
            is_dirty: false,
        };
        ReadPageGuard {
            guard,
            latch: Some(latch),
        }
    }

    /// Upgrades to a `WritePageGuard`, holding the page's content latch for
    /// writing. See `upgrade_read` for the pin-transfer contract.
    pub fn upgrade_write(mut self) -> WritePageGuard {
        let page = self.page.take().expect("page guard already consumed");
        let latch = page.write_arc();
        let guard = BasicPageGuard {
            bpm: self.bpm.clone(),
            page_id: self.page_id,
            page: Some(page),
            is_dirty: self.is_dirty,
        };
        WritePageGuard {
            guard,
            latch: Some(latch),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }
}

impl Drop for BasicPageGuard {
    fn drop(&mut self) {
        if self.page.take().is_some() {
            self.bpm.unpin_page(self.page_id, self.is_dirty);
        }
    }
}

/// An RAII handle on a page held for reading: releases the page's content
/// latch before unpinning, so an evicting thread never observes a pinned
/// page whose latch it could still be waiting on.
pub struct ReadPageGuard {
    guard: BasicPageGuard,
    latch: Option<PageReadGuard>,
}

impl ReadPageGuard {
    pub fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, page: Page) -> Self {
        let latch = page.read_arc();
        Self {
            guard: BasicPageGuard::new(bpm, page_id, page),
            latch: Some(latch),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    pub fn get_data(&self) -> &[u8] {
        self.latch.as_deref().expect("page guard already dropped")
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.latch.take();
    }
}

/// An RAII handle on a page held for writing. Marks the page dirty as soon
/// as mutable access is taken, so a guard that is only ever read through
/// `get_data` (never `get_data_mut`) does not force an unnecessary flush.
pub struct WritePageGuard {
    guard: BasicPageGuard,
    latch: Option<PageWriteGuard>,
}

impl WritePageGuard {
    pub fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, page: Page) -> Self {
        let latch = page.write_arc();
        Self {
            guard: BasicPageGuard::new(bpm, page_id, page),
            latch: Some(latch),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    pub fn get_data(&self) -> &[u8] {
        self.latch.as_deref().expect("page guard already dropped")
    }

    pub fn get_data_mut(&mut self) -> &mut [u8] {
        self.guard.is_dirty = true;
        self.latch.as_deref_mut().expect("page guard already dropped")
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.latch.take();
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;
    use crate::storage::disk::disk_manager::DiskManager;

    #[test]
    fn basic_guard_unpins_on_drop() {
        let dir = TempDir::new("page_guard_test").unwrap();
        let db_file = dir.path().join("test.db");
        let disk_manager = Arc::new(DiskManager::new(db_file.to_str().unwrap()));
        let bpm = Arc::new(BufferPoolManager::new(5, disk_manager));

        let (page_id, page) = bpm.new_page().unwrap();
        assert_eq!(bpm.pin_count(page_id), Some(1));

        let guard = BasicPageGuard::new(bpm.clone(), page_id, page);
        assert_eq!(guard.page_id(), page_id);
        drop(guard);

        assert_eq!(bpm.pin_count(page_id), Some(0));
    }

    #[test]
    fn read_guard_releases_latch_before_unpinning() {
        let dir = TempDir::new("page_guard_test").unwrap();
        let db_file = dir.path().join("test.db");
        let disk_manager = Arc::new(DiskManager::new(db_file.to_str().unwrap()));
        let bpm = Arc::new(BufferPoolManager::new(5, disk_manager));

        let (page_id, page) = bpm.new_page().unwrap();
        let basic = BasicPageGuard::new(bpm.clone(), page_id, page);
        let read_guard = basic.upgrade_read();
        assert_eq!(read_guard.get_data().len(), crate::common::config::PAGE_SIZE);
        drop(read_guard);

        assert_eq!(bpm.pin_count(page_id), Some(0));
    }

    #[test]
    fn write_guard_marks_dirty_only_on_mutable_access() {
        let dir = TempDir::new("page_guard_test").unwrap();
        let db_file = dir.path().join("test.db");
        let disk_manager = Arc::new(DiskManager::new(db_file.to_str().unwrap()));
        let bpm = Arc::new(BufferPoolManager::new(5, disk_manager));

        let (page_id, page) = bpm.new_page().unwrap();
        let basic = BasicPageGuard::new(bpm.clone(), page_id, page);
        let mut write_guard = basic.upgrade_write();
        write_guard.get_data_mut()[0] = 42;
        assert!(write_guard.guard.is_dirty());
        drop(write_guard);
    }
}
