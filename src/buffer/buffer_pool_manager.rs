use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use super::lru_replacer::LruReplacer;
use super::replacer::Replacer;
use crate::common::config::PageId;
use crate::storage::disk::{DiskManager, DiskRequest, DiskScheduler};
use crate::storage::page::{BasicPageGuard, Page, ReadPageGuard, WritePageGuard};

pub type FrameId = u32;

struct Frame {
    content: Page,
    page_id: Option<PageId>,
    pin_count: i32,
    is_dirty: bool,
}

impl Frame {
    fn new() -> Self {
        Frame {
            content: Page::new(),
            page_id: None,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

struct PoolInner {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: LruReplacer,
}

/// Owns a fixed number of in-memory frames, each holding at most one disk
/// page's content at a time. Pin counts, the page table, and the replacer
/// are all protected by a single coarse latch (`inner`); a page's own
/// content latch (inside `Page`) is separate, so a thread that is only
/// reading/writing through an already-fetched page guard never blocks on
/// `inner` at all. See `storage::page::page::Page` for that split.
pub struct BufferPoolManager {
    pool_size: usize,
    disk_manager: Arc<DiskManager>,
    disk_scheduler: DiskScheduler,
    inner: Mutex<PoolInner>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> BufferPoolManager {
        let free_list = (0..pool_size as FrameId).collect();
        let frames = (0..pool_size).map(|_| Frame::new()).collect();
        BufferPoolManager {
            pool_size,
            disk_scheduler: DiskScheduler::new(disk_manager.clone()),
            disk_manager,
            inner: Mutex::new(PoolInner {
                frames,
                page_table: HashMap::new(),
                free_list,
                replacer: LruReplacer::new(pool_size),
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Picks a frame to hold a new page's content: the free list first, then
    /// an evictable victim from the replacer. A dirty victim is flushed
    /// before its frame is handed back. Returns `None` if every frame is
    /// pinned.
    fn find_victim_frame(&self, inner: &mut PoolInner) -> Option<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Some(frame_id);
        }
        let frame_id = inner.replacer.evict()?;
        let frame = &inner.frames[frame_id as usize];
        if frame.is_dirty {
            let (tx, rx) = oneshot::channel();
            self.disk_scheduler.schedule(DiskRequest::Write {
                page_id: frame.page_id.expect("victim frame has no page"),
                content: frame.content.content(),
                callback: tx,
            });
            rx.blocking_recv().unwrap();
        }
        if let Some(old_page_id) = frame.page_id {
            inner.page_table.remove(&old_page_id);
        }
        Some(frame_id)
    }

    pub fn new_page(&self) -> Option<(PageId, Page)> {
        let mut inner = self.inner.lock().unwrap();
        let frame_id = self.find_victim_frame(&mut inner)?;

        let page_id = self.disk_manager.allocate_page();
        let frame = &mut inner.frames[frame_id as usize];
        frame.content.reset();
        frame.page_id = Some(page_id);
        frame.pin_count = 1;
        frame.is_dirty = false;
        let content = frame.content.clone();

        inner.page_table.insert(page_id, frame_id);
        inner.replacer.set_evictable(frame_id, false);

        Some((page_id, content))
    }

    pub fn fetch_page(&self, page_id: PageId) -> Option<Page> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &mut inner.frames[frame_id as usize];
            frame.pin_count += 1;
            inner.replacer.set_evictable(frame_id, false);
            return Some(inner.frames[frame_id as usize].content.clone());
        }

        let frame_id = self.find_victim_frame(&mut inner)?;
        let content = inner.frames[frame_id as usize].content.clone();

        let (tx, rx) = oneshot::channel();
        self.disk_scheduler.schedule(DiskRequest::Read {
            page_id,
            content: content.content(),
            callback: tx,
        });
        rx.blocking_recv().unwrap();

        let frame = &mut inner.frames[frame_id as usize];
        frame.page_id = Some(page_id);
        frame.pin_count = 1;
        frame.is_dirty = false;

        inner.page_table.insert(page_id, frame_id);
        inner.replacer.set_evictable(frame_id, false);

        Some(content)
    }

    /// Decrements `page_id`'s pin count; once it reaches zero the frame
    /// becomes eligible for eviction. Returns `false` if `page_id` isn't
    /// currently in the pool or its pin count is already zero.
    ///
    /// The replacer's access time is recorded here, on unpin, not on pin —
    /// the victim policy orders candidates by most-recent-unpin, so a frame
    /// that has been pinned and read many times but unpinned long ago must
    /// still look old to the replacer.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &mut inner.frames[frame_id as usize];
        if frame.pin_count <= 0 {
            return false;
        }
        frame.is_dirty |= is_dirty;
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            inner.replacer.record_access(frame_id);
            inner.replacer.set_evictable(frame_id, true);
        }
        true
    }

    pub fn flush_page(&self, page_id: PageId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let content = inner.frames[frame_id as usize].content.content();
        let (tx, rx) = oneshot::channel();
        self.disk_scheduler.schedule(DiskRequest::Write {
            page_id,
            content,
            callback: tx,
        });
        rx.blocking_recv().unwrap();
        inner.frames[frame_id as usize].is_dirty = false;
        true
    }

    pub fn flush_all_pages(&self) {
        let page_ids: Vec<PageId> = {
            let inner = self.inner.lock().unwrap();
            inner.page_table.keys().copied().collect()
        };
        for page_id in page_ids {
            self.flush_page(page_id);
        }
    }

    /// Removes `page_id` from the pool, returning its frame to the free
    /// list. Returns `false` if the page is still pinned. Removing a page
    /// that isn't resident is not an error.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return true;
        };
        if inner.frames[frame_id as usize].pin_count > 0 {
            return false;
        }
        inner.page_table.remove(&page_id);
        inner.replacer.remove(frame_id);
        inner.free_list.push_back(frame_id);
        let frame = &mut inner.frames[frame_id as usize];
        frame.content.reset();
        frame.page_id = None;
        frame.is_dirty = false;
        drop(inner);
        self.disk_manager.deallocate_page(page_id);
        true
    }

    /// Test/diagnostic helper: the current pin count of a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<i32> {
        let inner = self.inner.lock().unwrap();
        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| inner.frames[frame_id as usize].pin_count)
    }

    pub fn new_page_guarded(self: &Arc<Self>) -> Option<(PageId, BasicPageGuard)> {
        let (page_id, page) = self.new_page()?;
        Some((page_id, BasicPageGuard::new(self.clone(), page_id, page)))
    }

    pub fn fetch_page_basic(self: &Arc<Self>, page_id: PageId) -> Option<BasicPageGuard> {
        let page = self.fetch_page(page_id)?;
        Some(BasicPageGuard::new(self.clone(), page_id, page))
    }

    pub fn fetch_page_read(self: &Arc<Self>, page_id: PageId) -> Option<ReadPageGuard> {
        let page = self.fetch_page(page_id)?;
        Some(ReadPageGuard::new(self.clone(), page_id, page))
    }

    pub fn fetch_page_write(self: &Arc<Self>, page_id: PageId) -> Option<WritePageGuard> {
        let page = self.fetch_page(page_id)?;
        Some(WritePageGuard::new(self.clone(), page_id, page))
    }
}

#[cfg(test)]
mod tests {
    use rand::distributions::{Distribution, Uniform};
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn binary_data_round_trips_through_eviction() {
        let dir = TempDir::new("bpm_test").unwrap();
        let db_name = dir.path().join("test.db");
        let buffer_pool_size = 10;

        let mut rng = rand::thread_rng();
        let uniform_dist = Uniform::from(u8::MIN..=u8::MAX);

        let disk_manager = Arc::new(DiskManager::new(db_name.to_str().unwrap()));
        let bpm = BufferPoolManager::new(buffer_pool_size, disk_manager);

        let (page0_id, page0) = bpm.new_page().unwrap();
        assert_eq!(page0_id, 0);

        let mut random_binary_data: Vec<u8> = (0..PAGE_SIZE).map(|_| uniform_dist.sample(&mut rng)).collect();
        random_binary_data[PAGE_SIZE / 2] = 0;
        random_binary_data[PAGE_SIZE - 1] = 0;

        page0.get_data_mut()[..random_binary_data.len()].copy_from_slice(&random_binary_data);
        assert_eq!(&page0.get_data()[..], random_binary_data.as_slice());

        for _ in 1..buffer_pool_size {
            assert!(bpm.new_page().is_some());
        }
        for _ in buffer_pool_size..buffer_pool_size * 2 {
            assert!(bpm.new_page().is_none());
        }

        for i in 0..5 {
            assert!(bpm.unpin_page(i, true));
            bpm.flush_page(i);
        }
        for _ in 0..5 {
            let (new_id, _) = bpm.new_page().unwrap();
            bpm.unpin_page(new_id, false);
        }

        let fetched = bpm.fetch_page(0).unwrap();
        assert_eq!(&fetched.get_data()[..], random_binary_data.as_slice());
        assert!(bpm.unpin_page(0, true));
    }

    #[test]
    fn pool_exhaustion_and_recovery() {
        let dir = TempDir::new("bpm_test").unwrap();
        let db_name = dir.path().join("test.db");
        let buffer_pool_size = 10;

        let disk_manager = Arc::new(DiskManager::new(db_name.to_str().unwrap()));
        let bpm = BufferPoolManager::new(buffer_pool_size, disk_manager);

        let (page0_id, page0) = bpm.new_page().unwrap();
        assert_eq!(page0_id, 0);

        let data = b"Hello";
        page0.get_data_mut()[..data.len()].copy_from_slice(data);

        for _ in 1..buffer_pool_size {
            assert!(bpm.new_page().is_some());
        }
        for _ in buffer_pool_size..buffer_pool_size * 2 {
            assert!(bpm.new_page().is_none());
        }

        for i in 0..5 {
            assert!(bpm.unpin_page(i, true));
        }
        for _ in 0..4 {
            assert!(bpm.new_page().is_some());
        }

        let fetched = bpm.fetch_page(0).unwrap();
        assert_eq!(&fetched.get_data()[..data.len()], data);

        assert!(bpm.unpin_page(0, true));
        assert!(bpm.new_page().is_some());
        assert!(bpm.fetch_page(0).is_none());
    }

    #[test]
    fn delete_page_refuses_while_pinned() {
        let dir = TempDir::new("bpm_test").unwrap();
        let db_name = dir.path().join("test.db");
        let disk_manager = Arc::new(DiskManager::new(db_name.to_str().unwrap()));
        let bpm = BufferPoolManager::new(5, disk_manager);

        let (page_id, _page) = bpm.new_page().unwrap();
        assert!(!bpm.delete_page(page_id));
        assert!(bpm.unpin_page(page_id, false));
        assert!(bpm.delete_page(page_id));
        assert!(bpm.delete_page(page_id));
    }
}
