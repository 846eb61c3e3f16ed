//! The header page (page id 0) holds a small table mapping index names to
//! their root page id. The B+ tree calls `insert_record` once, when an
//! index is created, and `update_record` every time its root changes.
//!
//! Layout (within the page's `PAGE_SIZE` bytes):
//! ```text
//! [0..4)   record_count: u32
//! repeated record_count times:
//!   [..2)  name_len: u16
//!   [..name_len) name bytes (utf8)
//!   [..4)  root_page_id: u32
//! ```

use crate::common::config::{PageId, INVALID_PAGE_ID};

const COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

fn count(data: &[u8]) -> u32 {
    u32::from_le_bytes(data[COUNT_OFFSET..COUNT_OFFSET + 4].try_into().unwrap())
}

fn set_count(data: &mut [u8], count: u32) {
    data[COUNT_OFFSET..COUNT_OFFSET + 4].copy_from_slice(&count.to_le_bytes());
}

/// Returns `(name, root_page_id, record_start, record_end)` for each record,
/// in on-disk order.
fn iter_records(data: &[u8]) -> Vec<(String, PageId, usize, usize)> {
    let mut out = Vec::new();
    let mut offset = RECORDS_OFFSET;
    for _ in 0..count(data) {
        let start = offset;
        let name_len = u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap()) as usize;
        offset += 2;
        let name = String::from_utf8_lossy(&data[offset..offset + name_len]).to_string();
        offset += name_len;
        let root_page_id = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
        offset += 4;
        out.push((name, root_page_id, start, offset));
    }
    out
}

fn lookup(data: &[u8], index_name: &str) -> PageId {
    iter_records(data)
        .into_iter()
        .find(|(name, ..)| name == index_name)
        .map(|(_, root, ..)| root)
        .unwrap_or(INVALID_PAGE_ID)
}

/// A read-only view of the header page, used by lookups that only need an
/// index's current root page id and don't want to contend with whichever
/// thread might be creating or dropping an unrelated index.
pub struct HeaderPage<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        HeaderPage { data }
    }

    pub fn get_root_id(&self, index_name: &str) -> PageId {
        lookup(self.data, index_name)
    }
}

pub struct HeaderPageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPageMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        HeaderPageMut { data }
    }

    /// Initializes an empty header page. Only meaningful the first time page
    /// 0 is created.
    pub fn init(&mut self) {
        set_count(self.data, 0);
    }

    pub fn get_root_id(&self, index_name: &str) -> PageId {
        lookup(self.data, index_name)
    }

    /// Inserts a new `(index_name, root_page_id)` record. Returns `false` if
    /// a record for `index_name` already exists.
    pub fn insert_record(&mut self, index_name: &str, root_page_id: PageId) -> bool {
        if iter_records(self.data).iter().any(|(n, ..)| n == index_name) {
            return false;
        }
        let mut offset = iter_records(self.data).last().map(|r| r.3).unwrap_or(RECORDS_OFFSET);

        let name_bytes = index_name.as_bytes();
        self.data[offset..offset + 2].copy_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        offset += 2;
        self.data[offset..offset + name_bytes.len()].copy_from_slice(name_bytes);
        offset += name_bytes.len();
        self.data[offset..offset + 4].copy_from_slice(&root_page_id.to_le_bytes());

        let n = count(self.data);
        set_count(self.data, n + 1);
        true
    }

    /// Updates `index_name`'s root page id in place. Returns `false` if
    /// there is no record for `index_name`.
    pub fn update_record(&mut self, index_name: &str, root_page_id: PageId) -> bool {
        if let Some((_, _, _, end)) = iter_records(self.data).into_iter().find(|(n, ..)| n == index_name) {
            self.data[end - 4..end].copy_from_slice(&root_page_id.to_le_bytes());
            true
        } else {
            false
        }
    }

    /// Removes `index_name`'s record, shifting later records left. Returns
    /// `false` if there is no such record.
    pub fn delete_record(&mut self, index_name: &str) -> bool {
        let records = iter_records(self.data);
        if let Some((_, _, start, end)) = records.iter().find(|(n, ..)| n == index_name).cloned() {
            let tail_start = end;
            let tail_len = records.last().map(|r| r.3).unwrap_or(end) - tail_start;
            if tail_len > 0 {
                self.data.copy_within(tail_start..tail_start + tail_len, start);
            }
            let n = count(self.data);
            set_count(self.data, n - 1);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::PAGE_SIZE;

    #[test]
    fn insert_update_delete_round_trip() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut header = HeaderPageMut::new(&mut buf);
        header.init();

        assert!(header.insert_record("idx_a", 1));
        assert!(header.insert_record("idx_b", 2));
        assert!(!header.insert_record("idx_a", 99));

        assert_eq!(header.get_root_id("idx_a"), 1);
        assert_eq!(header.get_root_id("idx_b"), 2);
        assert_eq!(header.get_root_id("missing"), INVALID_PAGE_ID);

        assert!(header.update_record("idx_a", 42));
        assert_eq!(header.get_root_id("idx_a"), 42);
        assert!(!header.update_record("missing", 1));

        assert!(header.delete_record("idx_a"));
        assert_eq!(header.get_root_id("idx_a"), INVALID_PAGE_ID);
        assert_eq!(header.get_root_id("idx_b"), 2);

        assert_eq!(HeaderPage::new(&buf).get_root_id("idx_b"), 2);
    }
}
