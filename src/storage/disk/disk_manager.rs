use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    sync::atomic::{AtomicU32, AtomicUsize, Ordering},
    sync::Mutex,
};

use log::debug;

use crate::common::config::{PageId, PAGE_SIZE};

/// Takes care of reading and writing fixed-size pages to and from a single
/// heap file, providing a logical page-addressed file layer to the buffer
/// pool manager. A companion log file is opened alongside the heap file for
/// future write-ahead-log integration; nothing in this crate writes log
/// records into it yet.
pub struct DiskManager {
    log_io: Mutex<File>,
    log_name: String,
    db_io: Mutex<File>,
    file_name: String,
    next_page_id: AtomicU32,
    num_flushes: AtomicUsize,
    num_writes: AtomicUsize,
}

impl DiskManager {
    /// Opens (creating if necessary) the database file at `db_file` and its
    /// sibling `.log` file. `allocate_page` resumes numbering after whatever
    /// pages are already present in the file, so re-opening an existing
    /// database does not hand out ids that collide with on-disk pages.
    pub fn new(db_file: &str) -> Self {
        let file_name = Path::new(db_file);
        let log_name = file_name.with_extension("log");

        let log_io = open_or_create(&log_name);
        let db_io = open_or_create(file_name);

        let existing_len = db_io.metadata().map(|m| m.len()).unwrap_or(0);
        let next_page_id = (existing_len / PAGE_SIZE as u64) as u32;

        Self {
            log_io: Mutex::new(log_io),
            log_name: log_name.to_string_lossy().to_string(),
            db_io: Mutex::new(db_io),
            file_name: db_file.to_string(),
            next_page_id: AtomicU32::new(next_page_id),
            num_flushes: AtomicUsize::new(0),
            num_writes: AtomicUsize::new(0),
        }
    }

    /// Writes a page to the database file, REGARDLESS of any caller-side
    /// dirty tracking, and flushes immediately so the file stays in sync
    /// with what the buffer pool believes is on disk.
    pub fn write_page(&self, page_id: PageId, page_data: &[u8]) {
        assert_eq!(page_data.len(), PAGE_SIZE);

        let offset = page_id as u64 * PAGE_SIZE as u64;
        self.num_writes.fetch_add(1, Ordering::Relaxed);

        let mut db_io = self.db_io.lock().unwrap();
        db_io.seek(SeekFrom::Start(offset)).unwrap();
        if let Err(e) = db_io.write_all(page_data) {
            panic!("I/O error while writing page {page_id}: {e:?}");
        }
        db_io.flush().unwrap();
    }

    /// Reads a page from the database file. Reading a page that was never
    /// written (e.g. immediately after `allocate_page`) is not an error: the
    /// remainder of the buffer is left zero-filled.
    pub fn read_page(&self, page_id: PageId, page_data: &mut [u8]) {
        assert_eq!(page_data.len(), PAGE_SIZE);
        let offset = page_id as u64 * PAGE_SIZE as u64;

        let mut db_io = self.db_io.lock().unwrap();
        let file_len = db_io.metadata().unwrap().len();
        if offset >= file_len {
            page_data.fill(0);
            return;
        }
        db_io.seek(SeekFrom::Start(offset)).unwrap();
        match db_io.read(page_data) {
            Ok(read_count) => {
                if read_count < PAGE_SIZE {
                    debug!("read less than a page for page_id={page_id}");
                    page_data[read_count..].fill(0);
                }
            }
            Err(e) => panic!("I/O error while reading page {page_id}: {e:?}"),
        }
    }

    /// Allocates a fresh page id. The disk manager never reuses an id handed
    /// out by this method; freeing is the caller's business (see
    /// `deallocate_page`).
    pub fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Accepted and always called by the buffer pool when a page is deleted,
    /// but a no-op for now: reclaiming freed page ids needs a free-page-id
    /// structure this crate doesn't implement. Kept as a real call site so a
    /// real allocator can be dropped in here without touching callers.
    pub fn deallocate_page(&self, _page_id: PageId) {}

    /// Appends to the log file. Only performs a sequential write; callers
    /// are responsible for framing log records.
    pub fn write_log(&self, log_data: &[u8]) {
        if log_data.is_empty() {
            return;
        }
        self.num_flushes.fetch_add(1, Ordering::Relaxed);
        let mut log_io = self.log_io.lock().unwrap();
        if let Err(e) = log_io.write_all(log_data) {
            panic!("I/O error while writing log: {e:?}");
        }
        log_io.flush().unwrap();
    }

    /// Reads from the log file starting at `offset`. Returns `false` once
    /// `offset` is at or past the end of the log.
    pub fn read_log(&self, log_data: &mut [u8], offset: u64) -> bool {
        let mut log_io = self.log_io.lock().unwrap();
        if offset >= log_io.metadata().unwrap().len() {
            return false;
        }
        log_io.seek(SeekFrom::Start(offset)).unwrap();
        match log_io.read(log_data) {
            Ok(read_count) => {
                if read_count < log_data.len() {
                    log_data[read_count..].fill(0);
                }
            }
            Err(e) => panic!("I/O error while reading log: {e:?}"),
        }
        true
    }

    pub fn get_num_flushes(&self) -> usize {
        self.num_flushes.load(Ordering::Relaxed)
    }

    pub fn get_num_writes(&self) -> usize {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }
}

fn open_or_create(path: &Path) -> File {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .or_else(|_| {
            OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(path)
        })
        .unwrap()
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn read_write_page() {
        let mut buf = [0; PAGE_SIZE];
        let mut data = [0; PAGE_SIZE];

        let dir = TempDir::new("disk_manager_test").unwrap();
        let db_file = dir.path().join("test.db");
        let dm = DiskManager::new(db_file.to_str().unwrap());
        let test_str = b"A test string.";
        data[..test_str.len()].copy_from_slice(test_str);

        dm.read_page(0, &mut buf); // tolerate reading an unwritten page

        dm.write_page(0, &data);
        dm.read_page(0, &mut buf);
        assert_eq!(buf, data);

        buf.fill(0);
        dm.write_page(5, &data);
        dm.read_page(5, &mut buf);
        assert_eq!(buf, data);
    }

    #[test]
    fn read_write_log() {
        let mut buf = [0; 14];

        let dir = TempDir::new("disk_manager_test").unwrap();
        let db_file = dir.path().join("test.db");
        let dm = DiskManager::new(db_file.to_str().unwrap());
        let test_str = b"A test string.";

        assert!(!dm.read_log(&mut buf, 0));

        dm.write_log(test_str);
        assert!(dm.read_log(&mut buf, 0));
        assert_eq!(&buf, test_str);
    }

    #[test]
    fn allocate_page_resumes_after_restart() {
        let dir = TempDir::new("disk_manager_test").unwrap();
        let db_file = dir.path().join("test.db");

        let dm = DiskManager::new(db_file.to_str().unwrap());
        let data = [7u8; PAGE_SIZE];
        for _ in 0..3 {
            let page_id = dm.allocate_page();
            dm.write_page(page_id, &data);
        }
        drop(dm);

        let dm2 = DiskManager::new(db_file.to_str().unwrap());
        assert_eq!(dm2.allocate_page(), 3);
    }
}
