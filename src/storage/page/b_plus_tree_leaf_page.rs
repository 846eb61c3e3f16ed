//! A leaf page stores `size()` sorted `(key, value)` pairs and a pointer to
//! the next leaf, so a completed descent's leaf can be walked forward by an
//! iterator without re-entering the tree.
//!
//! Layout: the 24-byte common header, then a 4-byte `next_page_id`, then
//! `max_size` fixed-width `(key, value)` slots packed back to back.

use crate::common::config::{PageId, INVALID_PAGE_ID};
use crate::index::codec::{Key, Value};
use crate::storage::page::b_plus_tree_page::{
    BPlusTreePageView, BPlusTreePageViewMut, IndexPageType, COMMON_HEADER_SIZE,
};

const NEXT_PAGE_ID_OFFSET: usize = COMMON_HEADER_SIZE;
const SLOTS_OFFSET: usize = COMMON_HEADER_SIZE + 4;

pub struct LeafPage<'a, K, V> {
    data: &'a [u8],
    _k: std::marker::PhantomData<K>,
    _v: std::marker::PhantomData<V>,
}

pub struct LeafPageMut<'a, K, V> {
    data: &'a mut [u8],
    _k: std::marker::PhantomData<K>,
    _v: std::marker::PhantomData<V>,
}

fn slot_len<K: Key, V: Value>() -> usize {
    K::ENCODED_LEN + V::ENCODED_LEN
}

fn slot_offset<K: Key, V: Value>(index: usize) -> usize {
    SLOTS_OFFSET + index * slot_len::<K, V>()
}

impl<'a, K: Key, V: Value> LeafPage<'a, K, V> {
    pub fn new(data: &'a [u8]) -> Self {
        LeafPage {
            data,
            _k: std::marker::PhantomData,
            _v: std::marker::PhantomData,
        }
    }

    pub fn next_page_id(&self) -> PageId {
        u32::from_le_bytes(
            self.data[NEXT_PAGE_ID_OFFSET..NEXT_PAGE_ID_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn key_at(&self, index: usize) -> K {
        let off = slot_offset::<K, V>(index);
        K::decode(&self.data[off..off + K::ENCODED_LEN])
    }

    pub fn value_at(&self, index: usize) -> V {
        let off = slot_offset::<K, V>(index) + K::ENCODED_LEN;
        V::decode(&self.data[off..off + V::ENCODED_LEN])
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        (0..self.size()).map(|i| (self.key_at(i), self.value_at(i))).collect()
    }
}

impl<'a, K: Key, V: Value> BPlusTreePageView for LeafPage<'a, K, V> {
    fn header_bytes(&self) -> &[u8] {
        &self.data[..COMMON_HEADER_SIZE]
    }
}

impl<'a, K: Key, V: Value> LeafPageMut<'a, K, V> {
    pub fn new(data: &'a mut [u8]) -> Self {
        LeafPageMut {
            data,
            _k: std::marker::PhantomData,
            _v: std::marker::PhantomData,
        }
    }

    pub fn as_ref(&self) -> LeafPage<'_, K, V> {
        LeafPage::new(self.data)
    }

    pub fn init(&mut self, page_id: PageId, parent_page_id: PageId, max_size: usize) {
        self.init_header(IndexPageType::Leaf, page_id, parent_page_id, max_size);
        self.set_next_page_id(INVALID_PAGE_ID);
    }

    pub fn set_next_page_id(&mut self, next_page_id: PageId) {
        self.data[NEXT_PAGE_ID_OFFSET..NEXT_PAGE_ID_OFFSET + 4]
            .copy_from_slice(&next_page_id.to_le_bytes());
    }

    pub fn key_at(&self, index: usize) -> K {
        self.as_ref().key_at(index)
    }

    pub fn value_at(&self, index: usize) -> V {
        self.as_ref().value_at(index)
    }

    fn set_entry(&mut self, index: usize, key: &K, value: &V) {
        let off = slot_offset::<K, V>(index);
        key.encode(&mut self.data[off..off + K::ENCODED_LEN]);
        value.encode(&mut self.data[off + K::ENCODED_LEN..off + K::ENCODED_LEN + V::ENCODED_LEN]);
    }

    /// Finds the first index with `key_at(index) >= key` (i.e. where `key`
    /// would be inserted to keep the slots sorted).
    pub fn lower_bound(&self, key: &K, cmp: &impl crate::index::comparator::Comparator<K>) -> usize {
        let mut lo = 0usize;
        let mut hi = self.as_ref().size();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp.compare(&self.key_at(mid), key) == std::cmp::Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Inserts `(key, value)` at the position that keeps slots sorted by
    /// `cmp`. Returns `false` if `key` is already present (no duplicates).
    pub fn insert(&mut self, key: K, value: V, cmp: &impl crate::index::comparator::Comparator<K>) -> bool {
        let idx = self.lower_bound(&key, cmp);
        let size = self.as_ref().size();
        if idx < size && cmp.compare(&self.key_at(idx), &key) == std::cmp::Ordering::Equal {
            return false;
        }
        for i in (idx..size).rev() {
            let (k, v) = (self.key_at(i), self.value_at(i));
            self.set_entry(i + 1, &k, &v);
        }
        self.set_entry(idx, &key, &value);
        self.increase_size(1);
        true
    }

    /// Removes the slot holding `key`, if present. Returns the removed value.
    pub fn remove(&mut self, key: &K, cmp: &impl crate::index::comparator::Comparator<K>) -> Option<V> {
        let idx = self.lower_bound(key, cmp);
        let size = self.as_ref().size();
        if idx >= size || cmp.compare(&self.key_at(idx), key) != std::cmp::Ordering::Equal {
            return None;
        }
        let removed = self.value_at(idx);
        for i in idx..size - 1 {
            let (k, v) = (self.key_at(i + 1), self.value_at(i + 1));
            self.set_entry(i, &k, &v);
        }
        self.increase_size(-1);
        Some(removed)
    }

    /// Moves the upper half of this page's entries into `other`, which must
    /// already be initialized (with id `other_page_id`) and empty. Used when
    /// this page is split.
    pub fn move_half_to(&mut self, other: &mut LeafPageMut<'_, K, V>, other_page_id: PageId) {
        let size = self.as_ref().size();
        let split = size / 2;
        for i in split..size {
            let (k, v) = (self.key_at(i), self.value_at(i));
            other.set_entry(i - split, &k, &v);
        }
        other.set_size(size - split);
        self.set_size(split);
        other.set_next_page_id(self.as_ref().next_page_id());
        self.set_next_page_id(other_page_id);
    }

    /// Appends all of `other`'s entries after this page's own, used when
    /// merging an underfull right sibling into this page.
    pub fn absorb(&mut self, other: &LeafPage<'_, K, V>) {
        let base = self.as_ref().size();
        for i in 0..other.size() {
            let (k, v) = (other.key_at(i), other.value_at(i));
            self.set_entry(base + i, &k, &v);
        }
        self.increase_size(other.size() as i32);
        self.set_next_page_id(other.next_page_id());
    }

    pub fn first_entry(&self) -> (K, V) {
        (self.key_at(0), self.value_at(0))
    }

    pub fn pop_first(&mut self) -> (K, V) {
        let first = self.first_entry();
        let size = self.as_ref().size();
        for i in 1..size {
            let (k, v) = (self.key_at(i), self.value_at(i));
            self.set_entry(i - 1, &k, &v);
        }
        self.increase_size(-1);
        first
    }

    pub fn push_back(&mut self, key: K, value: V) {
        let idx = self.as_ref().size();
        self.set_entry(idx, &key, &value);
        self.increase_size(1);
    }

    pub fn last_entry(&self) -> (K, V) {
        let idx = self.as_ref().size() - 1;
        (self.key_at(idx), self.value_at(idx))
    }

    pub fn pop_last(&mut self) -> (K, V) {
        let last = self.last_entry();
        self.increase_size(-1);
        last
    }

    pub fn push_front(&mut self, key: K, value: V) {
        let size = self.as_ref().size();
        for i in (0..size).rev() {
            let (k, v) = (self.key_at(i), self.value_at(i));
            self.set_entry(i + 1, &k, &v);
        }
        self.set_entry(0, &key, &value);
        self.increase_size(1);
    }
}

impl<'a, K: Key, V: Value> BPlusTreePageView for LeafPageMut<'a, K, V> {
    fn header_bytes(&self) -> &[u8] {
        &self.data[..COMMON_HEADER_SIZE]
    }
}

impl<'a, K: Key, V: Value> BPlusTreePageViewMut for LeafPageMut<'a, K, V> {
    fn header_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data[..COMMON_HEADER_SIZE]
    }
}
