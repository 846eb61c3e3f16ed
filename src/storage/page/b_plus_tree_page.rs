//! Byte-offset accessors shared by leaf and internal B+ tree pages.
//!
//! Rather than reinterpret-casting a `&[u8; PAGE_SIZE]` into a `#[repr(C)]`
//! struct, every field is read and written through an explicit offset. This
//! keeps page access entirely in safe Rust at the cost of a few more lines
//! per accessor; see `b_plus_tree_leaf_page` and `b_plus_tree_internal_page`
//! for how the key/value slots built on top of this header are laid out.
//!
//! Common header layout (24 bytes), mirrored after the page types this
//! project's B+ tree is modeled on:
//! ```text
//! [0..4)   page_type:      u32  (0 = invalid, 1 = leaf, 2 = internal)
//! [4..8)   lsn:            u32  (unused by this crate; reserved for WAL)
//! [8..12)  size:           u32  (number of keys currently stored)
//! [12..16) max_size:       u32  (capacity before a split is triggered)
//! [16..20) parent_page_id: u32
//! [20..24) page_id:        u32  (this page's own id, for sanity checks)
//! ```

use crate::common::config::{PageId, INVALID_PAGE_ID, INVALID_LSN, Lsn};

pub const COMMON_HEADER_SIZE: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IndexPageType {
    Invalid = 0,
    Leaf = 1,
    Internal = 2,
}

impl IndexPageType {
    fn from_u32(v: u32) -> IndexPageType {
        match v {
            1 => IndexPageType::Leaf,
            2 => IndexPageType::Internal,
            _ => IndexPageType::Invalid,
        }
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn write_u32(data: &mut [u8], offset: usize, v: u32) {
    data[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
}

/// A read-only view of the fields every B+ tree page carries.
pub trait BPlusTreePageView {
    fn header_bytes(&self) -> &[u8];

    fn page_type(&self) -> IndexPageType {
        IndexPageType::from_u32(read_u32(self.header_bytes(), 0))
    }

    fn is_leaf_page(&self) -> bool {
        self.page_type() == IndexPageType::Leaf
    }

    fn lsn(&self) -> Lsn {
        read_u32(self.header_bytes(), 4)
    }

    fn size(&self) -> usize {
        read_u32(self.header_bytes(), 8) as usize
    }

    fn max_size(&self) -> usize {
        read_u32(self.header_bytes(), 12) as usize
    }

    fn parent_page_id(&self) -> PageId {
        read_u32(self.header_bytes(), 16)
    }

    fn is_root_page(&self) -> bool {
        self.parent_page_id() == INVALID_PAGE_ID
    }

    fn page_id(&self) -> PageId {
        read_u32(self.header_bytes(), 20)
    }

    /// The minimum number of keys/pointers this page may fall to before a
    /// merge/redistribute is required. The root is exempt (it may have as
    /// few as two children, or be a leaf with zero entries).
    fn min_size(&self) -> usize {
        if self.is_root_page() {
            if self.is_leaf_page() {
                0
            } else {
                2
            }
        } else {
            self.max_size().div_ceil(2)
        }
    }
}

pub trait BPlusTreePageViewMut: BPlusTreePageView {
    fn header_bytes_mut(&mut self) -> &mut [u8];

    fn init_header(&mut self, page_type: IndexPageType, page_id: PageId, parent_page_id: PageId, max_size: usize) {
        write_u32(self.header_bytes_mut(), 0, page_type as u32);
        write_u32(self.header_bytes_mut(), 4, INVALID_LSN);
        write_u32(self.header_bytes_mut(), 8, 0);
        write_u32(self.header_bytes_mut(), 12, max_size as u32);
        write_u32(self.header_bytes_mut(), 16, parent_page_id);
        write_u32(self.header_bytes_mut(), 20, page_id);
    }

    fn set_size(&mut self, size: usize) {
        write_u32(self.header_bytes_mut(), 8, size as u32);
    }

    fn increase_size(&mut self, delta: i32) {
        let new_size = self.size() as i32 + delta;
        debug_assert!(new_size >= 0);
        self.set_size(new_size as usize);
    }

    fn set_parent_page_id(&mut self, parent_page_id: PageId) {
        write_u32(self.header_bytes_mut(), 16, parent_page_id);
    }
}

/// Reads just the common header, without committing to a leaf or internal
/// key/value type. The tree uses this during latch crabbing to decide
/// whether a child is safe (won't itself need to split or merge) before it
/// commits to descending into it, which doesn't require knowing `K`/`V`.
pub struct RawPageView<'a>(pub &'a [u8]);

impl<'a> BPlusTreePageView for RawPageView<'a> {
    fn header_bytes(&self) -> &[u8] {
        &self.0[..COMMON_HEADER_SIZE]
    }
}

pub struct RawPageViewMut<'a>(pub &'a mut [u8]);

impl<'a> BPlusTreePageView for RawPageViewMut<'a> {
    fn header_bytes(&self) -> &[u8] {
        &self.0[..COMMON_HEADER_SIZE]
    }
}

impl<'a> BPlusTreePageViewMut for RawPageViewMut<'a> {
    fn header_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0[..COMMON_HEADER_SIZE]
    }
}
