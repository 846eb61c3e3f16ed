//! An internal page stores `size()` keys and `size()` child pointers. Slot 0's
//! key is never used for comparisons (it routes "less than the first real
//! key"); only its value (the leftmost child) is meaningful. This mirrors
//! the convention the tree's original descent algorithm relies on.

use crate::common::config::PageId;
use crate::index::codec::{Key, Value};
use crate::storage::page::b_plus_tree_page::{
    BPlusTreePageView, BPlusTreePageViewMut, IndexPageType, COMMON_HEADER_SIZE,
};

const SLOTS_OFFSET: usize = COMMON_HEADER_SIZE;

fn slot_len<K: Key>() -> usize {
    K::ENCODED_LEN + PageId::ENCODED_LEN
}

fn slot_offset<K: Key>(index: usize) -> usize {
    SLOTS_OFFSET + index * slot_len::<K>()
}

pub struct InternalPage<'a, K> {
    data: &'a [u8],
    _k: std::marker::PhantomData<K>,
}

pub struct InternalPageMut<'a, K> {
    data: &'a mut [u8],
    _k: std::marker::PhantomData<K>,
}

impl<'a, K: Key> InternalPage<'a, K> {
    pub fn new(data: &'a [u8]) -> Self {
        InternalPage {
            data,
            _k: std::marker::PhantomData,
        }
    }

    pub fn key_at(&self, index: usize) -> K {
        let off = slot_offset::<K>(index);
        K::decode(&self.data[off..off + K::ENCODED_LEN])
    }

    pub fn value_at(&self, index: usize) -> PageId {
        let off = slot_offset::<K>(index) + K::ENCODED_LEN;
        PageId::decode(&self.data[off..off + PageId::ENCODED_LEN])
    }

    /// Returns the child this key should descend into: the last slot whose
    /// key is `<= key` (slot 0's key is always treated as `-infinity`).
    /// Binary-searches the sorted keys in `1..size` rather than scanning.
    pub fn child_for(&self, key: &K, cmp: &impl crate::index::comparator::Comparator<K>) -> PageId {
        let size = self.size();
        let mut lo = 1usize;
        let mut hi = size;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp.compare(&self.key_at(mid), key) != std::cmp::Ordering::Greater {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        self.value_at(lo - 1)
    }

    pub fn index_of_child(&self, child_page_id: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == child_page_id)
    }

    pub fn entries(&self) -> Vec<(K, PageId)> {
        (0..self.size()).map(|i| (self.key_at(i), self.value_at(i))).collect()
    }
}

impl<'a, K: Key> BPlusTreePageView for InternalPage<'a, K> {
    fn header_bytes(&self) -> &[u8] {
        &self.data[..COMMON_HEADER_SIZE]
    }
}

impl<'a, K: Key> InternalPageMut<'a, K> {
    pub fn new(data: &'a mut [u8]) -> Self {
        InternalPageMut {
            data,
            _k: std::marker::PhantomData,
        }
    }

    pub fn as_ref(&self) -> InternalPage<'_, K> {
        InternalPage::new(self.data)
    }

    pub fn init(&mut self, page_id: PageId, parent_page_id: PageId, max_size: usize) {
        self.init_header(IndexPageType::Internal, page_id, parent_page_id, max_size);
    }

    pub fn key_at(&self, index: usize) -> K {
        self.as_ref().key_at(index)
    }

    pub fn value_at(&self, index: usize) -> PageId {
        self.as_ref().value_at(index)
    }

    fn set_entry(&mut self, index: usize, key: &K, value: PageId) {
        let off = slot_offset::<K>(index);
        key.encode(&mut self.data[off..off + K::ENCODED_LEN]);
        value.encode(&mut self.data[off + K::ENCODED_LEN..off + K::ENCODED_LEN + PageId::ENCODED_LEN]);
    }

    /// Sets slot 0 to point at `child`, with no meaningful key. Used once,
    /// when a new root is created with two children.
    pub fn set_first_child(&mut self, child: PageId) {
        let zero = K::decode(&vec![0u8; K::ENCODED_LEN]);
        self.set_entry(0, &zero, child);
    }

    /// Rewrites the key at `index`, leaving its child pointer untouched.
    /// Used to keep a parent's separator in sync after redistribute moves an
    /// entry across siblings.
    pub fn set_entry_key(&mut self, index: usize, key: K) {
        let child = self.value_at(index);
        self.set_entry(index, &key, child);
    }

    /// Inserts `(key, child)` at the position that keeps keys sorted by
    /// `cmp`, shifting later slots right.
    pub fn insert(&mut self, key: K, child: PageId, cmp: &impl crate::index::comparator::Comparator<K>) {
        let size = self.as_ref().size();
        let mut idx = 1;
        while idx < size && cmp.compare(&self.key_at(idx), &key) != std::cmp::Ordering::Greater {
            idx += 1;
        }
        for i in (idx..size).rev() {
            let (k, v) = (self.key_at(i), self.value_at(i));
            self.set_entry(i + 1, &k, v);
        }
        self.set_entry(idx, &key, child);
        self.increase_size(1);
    }

    /// Removes the slot at `index`, shifting later slots left.
    pub fn remove_at(&mut self, index: usize) {
        let size = self.as_ref().size();
        for i in index..size - 1 {
            let (k, v) = (self.key_at(i + 1), self.value_at(i + 1));
            self.set_entry(i, &k, v);
        }
        self.increase_size(-1);
    }

    /// Moves the upper half of this page's entries (including the
    /// convention-only key at slot 0, which becomes the parent's separator
    /// key for `other`) into `other`.
    pub fn move_half_to(&mut self, other: &mut InternalPageMut<'_, K>) {
        let size = self.as_ref().size();
        let split = size / 2;
        for i in split..size {
            let (k, v) = (self.key_at(i), self.value_at(i));
            other.set_entry(i - split, &k, v);
        }
        other.set_size(size - split);
        self.set_size(split);
    }

    /// Appends all of `other`'s entries after this page's own, re-keying
    /// `other`'s first (routing-only) slot with `separator_key` from the
    /// parent. Used when merging an underfull right sibling into this page.
    pub fn absorb(&mut self, other: &InternalPage<'_, K>, separator_key: K) {
        let base = self.as_ref().size();
        self.set_entry(base, &separator_key, other.value_at(0));
        for i in 1..other.size() {
            let (k, v) = (other.key_at(i), other.value_at(i));
            self.set_entry(base + i, &k, v);
        }
        self.increase_size(other.size() as i32);
    }

    pub fn pop_first(&mut self) -> (K, PageId) {
        let first = (self.key_at(0), self.value_at(0));
        let size = self.as_ref().size();
        for i in 1..size {
            let (k, v) = (self.key_at(i), self.value_at(i));
            self.set_entry(i - 1, &k, v);
        }
        self.increase_size(-1);
        first
    }

    pub fn push_back(&mut self, key: K, child: PageId) {
        let idx = self.as_ref().size();
        self.set_entry(idx, &key, child);
        self.increase_size(1);
    }

    pub fn pop_last(&mut self) -> (K, PageId) {
        let idx = self.as_ref().size() - 1;
        let last = (self.key_at(idx), self.value_at(idx));
        self.increase_size(-1);
        last
    }

    pub fn push_front(&mut self, key: K, child: PageId) {
        let size = self.as_ref().size();
        for i in (0..size).rev() {
            let (k, v) = (self.key_at(i), self.value_at(i));
            self.set_entry(i + 1, &k, v);
        }
        self.set_entry(0, &key, child);
        self.increase_size(1);
    }
}

impl<'a, K: Key> BPlusTreePageView for InternalPageMut<'a, K> {
    fn header_bytes(&self) -> &[u8] {
        &self.data[..COMMON_HEADER_SIZE]
    }
}

impl<'a, K: Key> BPlusTreePageViewMut for InternalPageMut<'a, K> {
    fn header_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data[..COMMON_HEADER_SIZE]
    }
}
