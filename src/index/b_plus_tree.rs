//! A disk-backed, latch-crabbing B+ tree index.
//!
//! Every node is a page fetched through a `BufferPoolManager`; concurrency
//! comes entirely from each page's own content latch (`ReadPageGuard`/
//! `WritePageGuard`), crabbed one level at a time, rather than from any
//! lock owned by the tree itself. `get_value` crabs down holding only read
//! latches; `insert`/`remove` crab down holding write latches but release
//! every ancestor as soon as the next child is known to be "safe" — unable
//! to propagate a split, merge, or redistribute back up past it.
//!
//! The tree's root page id is not kept in the `BPlusTree` struct itself (it
//! would then need its own synchronization); it lives in the header page
//! (`HEADER_PAGE_ID`), keyed by `index_name`, so concurrent operations only
//! ever learn the current root by reading that shared table.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::instrument;

use crate::buffer::BufferPoolManager;
use crate::common::config::{PageId, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::common::error::{Error, Result};
use crate::index::codec::{Key, Value};
use crate::index::comparator::Comparator;
use crate::index::iterator::BPlusTreeIndexIterator;
use crate::storage::page::b_plus_tree_internal_page::{InternalPage, InternalPageMut};
use crate::storage::page::b_plus_tree_leaf_page::{LeafPage, LeafPageMut};
use crate::storage::page::b_plus_tree_page::{BPlusTreePageView, BPlusTreePageViewMut, RawPageView, RawPageViewMut};
use crate::storage::page::{HeaderPage, HeaderPageMut, WritePageGuard};

pub struct BPlusTree<K, V, C> {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
    _marker: PhantomData<(K, V)>,
}

impl<K: Key, V: Value, C: Comparator<K>> BPlusTree<K, V, C> {
    pub fn new(
        index_name: String,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Self {
        BPlusTree {
            index_name,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            _marker: PhantomData,
        }
    }

    fn root_page_id(&self) -> Result<PageId> {
        let guard = self.bpm.fetch_page_read(HEADER_PAGE_ID).ok_or(Error::PoolExhausted)?;
        Ok(HeaderPage::new(guard.get_data()).get_root_id(&self.index_name))
    }

    fn set_root_page_id(&self, new_root_id: PageId) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(HEADER_PAGE_ID).ok_or(Error::PoolExhausted)?;
        let mut header = HeaderPageMut::new(guard.get_data_mut());
        if !header.update_record(&self.index_name, new_root_id) {
            header.insert_record(&self.index_name, new_root_id);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.root_page_id()? == INVALID_PAGE_ID)
    }

    fn fetch_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        self.bpm.fetch_page_write(page_id).ok_or(Error::PoolExhausted)
    }

    fn new_write(&self) -> Result<(PageId, WritePageGuard)> {
        let (page_id, basic) = self.bpm.new_page_guarded().ok_or(Error::PoolExhausted)?;
        Ok((page_id, basic.upgrade_write()))
    }

    fn set_parent(&self, child_id: PageId, parent_id: PageId) -> Result<()> {
        let mut guard = self.fetch_write(child_id)?;
        RawPageViewMut(guard.get_data_mut()).set_parent_page_id(parent_id);
        Ok(())
    }

    /*********************************************************************
     * SEARCH
     *********************************************************************/

    #[instrument(skip(self))]
    pub fn get_value(&self, key: &K) -> Result<Option<V>> {
        let root_id = self.root_page_id()?;
        if root_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let mut guard = self.bpm.fetch_page_read(root_id).ok_or(Error::PoolExhausted)?;
        loop {
            let child_id = {
                let view = RawPageView(guard.get_data());
                if view.is_leaf_page() {
                    None
                } else {
                    Some(InternalPage::<K>::new(guard.get_data()).child_for(key, &self.comparator))
                }
            };
            match child_id {
                Some(child_id) => {
                    guard = self.bpm.fetch_page_read(child_id).ok_or(Error::PoolExhausted)?;
                }
                None => {
                    let leaf = LeafPage::<K, V>::new(guard.get_data());
                    let idx = lower_bound(&leaf, key, &self.comparator);
                    if idx < leaf.size() && self.comparator.compare(&leaf.key_at(idx), key) == Ordering::Equal {
                        return Ok(Some(leaf.value_at(idx)));
                    }
                    return Ok(None);
                }
            }
        }
    }

    /*********************************************************************
     * INSERTION
     *********************************************************************/

    #[instrument(skip(self))]
    pub fn insert(&self, key: K, value: V) -> Result<bool> {
        if self.is_empty()? {
            return self.start_new_tree(key, value);
        }

        let root_id = self.root_page_id()?;
        let mut stack: Vec<WritePageGuard> = Vec::new();
        let mut current = self.fetch_write(root_id)?;

        loop {
            let is_leaf = RawPageView(current.get_data()).is_leaf_page();
            if is_leaf {
                break;
            }
            let child_id = InternalPage::<K>::new(current.get_data()).child_for(&key, &self.comparator);
            let child_guard = self.fetch_write(child_id)?;
            let safe = {
                let view = RawPageView(child_guard.get_data());
                // won't need to split even after the pending insert lands.
                view.size() + 1 < view.max_size()
            };
            if safe {
                stack.clear();
            } else {
                stack.push(current);
            }
            current = child_guard;
        }

        let mut leaf = LeafPageMut::<K, V>::new(current.get_data_mut());
        if !leaf.insert(key, value, &self.comparator) {
            return Ok(false);
        }
        if leaf.as_ref().size() < self.leaf_max_size {
            return Ok(true);
        }

        let old_leaf_id = current.page_id();
        let (new_leaf_id, sep_key) = self.split_leaf(&mut current)?;
        drop(current);
        self.insert_into_parent(&mut stack, old_leaf_id, new_leaf_id, sep_key)?;
        Ok(true)
    }

    fn start_new_tree(&self, key: K, value: V) -> Result<bool> {
        let (root_id, mut guard) = self.new_write()?;
        let mut leaf = LeafPageMut::<K, V>::new(guard.get_data_mut());
        leaf.init(root_id, INVALID_PAGE_ID, self.leaf_max_size);
        leaf.insert(key, value, &self.comparator);
        drop(guard);
        self.set_root_page_id(root_id)?;
        Ok(true)
    }

    fn split_leaf(&self, guard: &mut WritePageGuard) -> Result<(PageId, K)> {
        let (new_id, mut new_guard) = self.new_write()?;
        let parent_id = LeafPage::<K, V>::new(guard.get_data()).parent_page_id();
        {
            let mut new_leaf = LeafPageMut::<K, V>::new(new_guard.get_data_mut());
            new_leaf.init(new_id, parent_id, self.leaf_max_size);
        }
        {
            let mut old_leaf = LeafPageMut::<K, V>::new(guard.get_data_mut());
            let mut new_leaf = LeafPageMut::<K, V>::new(new_guard.get_data_mut());
            old_leaf.move_half_to(&mut new_leaf, new_id);
        }
        let sep_key = LeafPage::<K, V>::new(new_guard.get_data()).key_at(0);
        Ok((new_id, sep_key))
    }

    fn split_internal(&self, guard: &mut WritePageGuard) -> Result<(PageId, K)> {
        let (new_id, mut new_guard) = self.new_write()?;
        let parent_id = InternalPage::<K>::new(guard.get_data()).parent_page_id();
        {
            let mut new_internal = InternalPageMut::<K>::new(new_guard.get_data_mut());
            new_internal.init(new_id, parent_id, self.internal_max_size);
        }
        {
            let mut old_internal = InternalPageMut::<K>::new(guard.get_data_mut());
            let mut new_internal = InternalPageMut::<K>::new(new_guard.get_data_mut());
            old_internal.move_half_to(&mut new_internal);
        }
        let new_view = InternalPage::<K>::new(new_guard.get_data());
        let sep_key = new_view.key_at(0);
        let moved_children: Vec<PageId> = new_view.entries().into_iter().map(|(_, v)| v).collect();
        drop(new_guard);
        for child_id in moved_children {
            self.set_parent(child_id, new_id)?;
        }
        Ok((new_id, sep_key))
    }

    /// Propagates a split up the ancestor stack, creating a new root if the
    /// split reached the top. `old_child_id`/`new_child_id` are the two
    /// pages the split produced; `separator_key` routes to `new_child_id`.
    fn insert_into_parent(
        &self,
        stack: &mut Vec<WritePageGuard>,
        old_child_id: PageId,
        new_child_id: PageId,
        separator_key: K,
    ) -> Result<()> {
        let Some(mut parent_guard) = stack.pop() else {
            let (new_root_id, mut root_guard) = self.new_write()?;
            {
                let mut root = InternalPageMut::<K>::new(root_guard.get_data_mut());
                root.init(new_root_id, INVALID_PAGE_ID, self.internal_max_size);
                root.set_first_child(old_child_id);
                root.insert(separator_key, new_child_id, &self.comparator);
            }
            drop(root_guard);
            self.set_parent(old_child_id, new_root_id)?;
            self.set_parent(new_child_id, new_root_id)?;
            self.set_root_page_id(new_root_id)?;
            return Ok(());
        };

        {
            let mut parent = InternalPageMut::<K>::new(parent_guard.get_data_mut());
            parent.insert(separator_key, new_child_id, &self.comparator);
        }
        self.set_parent(new_child_id, parent_guard.page_id())?;

        if InternalPage::<K>::new(parent_guard.get_data()).size() < self.internal_max_size {
            return Ok(());
        }

        let parent_id = parent_guard.page_id();
        let (new_parent_id, sep) = self.split_internal(&mut parent_guard)?;
        drop(parent_guard);
        self.insert_into_parent(stack, parent_id, new_parent_id, sep)
    }

    /*********************************************************************
     * DELETION
     *********************************************************************/

    #[instrument(skip(self))]
    pub fn remove(&self, key: &K) -> Result<bool> {
        if self.is_empty()? {
            return Ok(false);
        }

        let root_id = self.root_page_id()?;
        let mut stack: Vec<WritePageGuard> = Vec::new();
        let mut current = self.fetch_write(root_id)?;

        loop {
            let is_leaf = RawPageView(current.get_data()).is_leaf_page();
            if is_leaf {
                break;
            }
            let child_id = InternalPage::<K>::new(current.get_data()).child_for(key, &self.comparator);
            let child_guard = self.fetch_write(child_id)?;
            let safe = {
                let view = RawPageView(child_guard.get_data());
                view.size() > view.min_size()
            };
            if safe {
                stack.clear();
            } else {
                stack.push(current);
            }
            current = child_guard;
        }

        let removed = {
            let mut leaf = LeafPageMut::<K, V>::new(current.get_data_mut());
            leaf.remove(key, &self.comparator).is_some()
        };
        if !removed {
            return Ok(false);
        }

        self.coalesce_or_redistribute(current, stack)?;
        Ok(true)
    }

    /// After a delete, brings an underfull page back into shape: merges it
    /// into a sibling (coalesce) when the combined size still fits one
    /// page, otherwise borrows a single entry from a sibling (redistribute).
    /// The root is handled separately, since it has no siblings.
    fn coalesce_or_redistribute(&self, mut node: WritePageGuard, mut stack: Vec<WritePageGuard>) -> Result<()> {
        let view = RawPageView(node.get_data());
        if view.is_root_page() {
            drop(view);
            return self.adjust_root(node);
        }
        if view.size() >= view.min_size() {
            return Ok(());
        }
        drop(view);

        let Some(mut parent_guard) = stack.pop() else {
            return self.adjust_root(node);
        };

        let node_id = node.page_id();
        let (sibling_id, sibling_is_predecessor, separator_index) = {
            let parent = InternalPage::<K>::new(parent_guard.get_data());
            let idx = parent.index_of_child(node_id).expect("node missing from its own parent");
            if idx > 0 {
                (parent.value_at(idx - 1), true, idx)
            } else {
                (parent.value_at(idx + 1), false, idx + 1)
            }
        };
        let mut sibling_guard = self.fetch_write(sibling_id)?;

        let combined_size = RawPageView(node.get_data()).size() + RawPageView(sibling_guard.get_data()).size();
        let capacity = RawPageView(node.get_data()).max_size();

        if combined_size < capacity {
            let (keep, drop_page_id) = if sibling_is_predecessor {
                self.coalesce_into(&mut sibling_guard, &mut node, &mut parent_guard, separator_index)?;
                (sibling_guard.page_id(), node_id)
            } else {
                self.coalesce_into(&mut node, &mut sibling_guard, &mut parent_guard, separator_index)?;
                (node_id, sibling_id)
            };
            let _ = keep;
            drop(node);
            drop(sibling_guard);
            self.bpm.delete_page(drop_page_id);
            self.coalesce_or_redistribute(parent_guard, stack)
        } else {
            self.redistribute(&mut node, &mut sibling_guard, &mut parent_guard, separator_index, sibling_is_predecessor)
        }
    }

    /// Merges `right`'s entries into `left` and removes the parent's
    /// separator slot at `separator_index` (which routed to `right`).
    fn coalesce_into(
        &self,
        left: &mut WritePageGuard,
        right: &mut WritePageGuard,
        parent: &mut WritePageGuard,
        separator_index: usize,
    ) -> Result<()> {
        let is_leaf = RawPageView(left.get_data()).is_leaf_page();
        if is_leaf {
            let right_view = LeafPage::<K, V>::new(right.get_data());
            let mut left_leaf = LeafPageMut::<K, V>::new(left.get_data_mut());
            left_leaf.absorb(&right_view);
        } else {
            let separator_key = InternalPage::<K>::new(parent.get_data()).key_at(separator_index);
            let right_view = InternalPage::<K>::new(right.get_data());
            let moved_children: Vec<PageId> = right_view.entries().into_iter().map(|(_, v)| v).collect();
            let mut left_internal = InternalPageMut::<K>::new(left.get_data_mut());
            left_internal.absorb(&right_view, separator_key);
            for child_id in moved_children {
                self.set_parent(child_id, left.page_id())?;
            }
        }
        let mut parent_internal = InternalPageMut::<K>::new(parent.get_data_mut());
        parent_internal.remove_at(separator_index);
        Ok(())
    }

    /// Borrows a single entry across `node`/`sibling` so both stay above
    /// their minimum size, updating the parent's separator key to match.
    fn redistribute(
        &self,
        node: &mut WritePageGuard,
        sibling: &mut WritePageGuard,
        parent: &mut WritePageGuard,
        separator_index: usize,
        sibling_is_predecessor: bool,
    ) -> Result<()> {
        let is_leaf = RawPageView(node.get_data()).is_leaf_page();
        if is_leaf {
            if sibling_is_predecessor {
                let (k, v) = {
                    let mut sib = LeafPageMut::<K, V>::new(sibling.get_data_mut());
                    sib.pop_last()
                };
                LeafPageMut::<K, V>::new(node.get_data_mut()).push_front(k, v);
                InternalPageMut::<K>::new(parent.get_data_mut()).set_entry_key(separator_index, k);
            } else {
                let (k, v) = {
                    let mut sib = LeafPageMut::<K, V>::new(sibling.get_data_mut());
                    sib.pop_first()
                };
                LeafPageMut::<K, V>::new(node.get_data_mut()).push_back(k, v);
                let new_sep = LeafPage::<K, V>::new(sibling.get_data()).key_at(0);
                InternalPageMut::<K>::new(parent.get_data_mut()).set_entry_key(separator_index, new_sep);
            }
        } else if sibling_is_predecessor {
            let (k, v) = {
                let mut sib = InternalPageMut::<K>::new(sibling.get_data_mut());
                sib.pop_last()
            };
            let down_key = InternalPage::<K>::new(parent.get_data()).key_at(separator_index);
            InternalPageMut::<K>::new(node.get_data_mut()).push_front(down_key, v);
            InternalPageMut::<K>::new(parent.get_data_mut()).set_entry_key(separator_index, k);
            self.set_parent(v, node.page_id())?;
        } else {
            let (_, v) = {
                let mut sib = InternalPageMut::<K>::new(sibling.get_data_mut());
                sib.pop_first()
            };
            let down_key = InternalPage::<K>::new(parent.get_data()).key_at(separator_index);
            InternalPageMut::<K>::new(node.get_data_mut()).push_back(down_key, v);
            // slot 0's key is routing-only; after the pop it holds what used
            // to be the sibling's real first separator, which is exactly the
            // new boundary key between `node` and `sibling`.
            let new_sep = InternalPage::<K>::new(sibling.get_data()).key_at(0);
            InternalPageMut::<K>::new(parent.get_data_mut()).set_entry_key(separator_index, new_sep);
            self.set_parent(v, node.page_id())?;
        }
        Ok(())
    }

    /// Collapses the root when it has shrunk to nothing useful: an internal
    /// root with a single child promotes that child, and a leaf root with
    /// zero entries leaves the tree empty.
    fn adjust_root(&self, root: WritePageGuard) -> Result<()> {
        let view = RawPageView(root.get_data());
        if !view.is_leaf_page() && view.size() == 1 {
            let only_child = InternalPage::<K>::new(root.get_data()).value_at(0);
            let root_id = root.page_id();
            drop(root);
            self.set_parent(only_child, INVALID_PAGE_ID)?;
            self.set_root_page_id(only_child)?;
            self.bpm.delete_page(root_id);
        } else if view.is_leaf_page() && view.size() == 0 {
            let root_id = root.page_id();
            drop(root);
            self.set_root_page_id(INVALID_PAGE_ID)?;
            self.bpm.delete_page(root_id);
        }
        Ok(())
    }

    /*********************************************************************
     * ITERATION
     *********************************************************************/

    pub fn begin(&self) -> Result<BPlusTreeIndexIterator<K, V, C>> {
        let root_id = self.root_page_id()?;
        if root_id == INVALID_PAGE_ID {
            return Ok(BPlusTreeIndexIterator::empty());
        }
        let leaf_id = self.find_leftmost_leaf(root_id)?;
        BPlusTreeIndexIterator::at_start(self.bpm.clone(), leaf_id)
    }

    pub fn begin_at(&self, key: &K) -> Result<BPlusTreeIndexIterator<K, V, C>> {
        let root_id = self.root_page_id()?;
        if root_id == INVALID_PAGE_ID {
            return Ok(BPlusTreeIndexIterator::empty());
        }
        let mut guard = self.bpm.fetch_page_read(root_id).ok_or(Error::PoolExhausted)?;
        loop {
            let child_id = {
                let view = RawPageView(guard.get_data());
                if view.is_leaf_page() {
                    None
                } else {
                    Some(InternalPage::<K>::new(guard.get_data()).child_for(key, &self.comparator))
                }
            };
            match child_id {
                Some(id) => guard = self.bpm.fetch_page_read(id).ok_or(Error::PoolExhausted)?,
                None => break,
            }
        }
        let leaf_id = guard.page_id();
        let leaf = LeafPage::<K, V>::new(guard.get_data());
        let start_index = lower_bound(&leaf, key, &self.comparator);
        drop(guard);
        BPlusTreeIndexIterator::at(self.bpm.clone(), leaf_id, start_index)
    }

    fn find_leftmost_leaf(&self, root_id: PageId) -> Result<PageId> {
        let mut guard = self.bpm.fetch_page_read(root_id).ok_or(Error::PoolExhausted)?;
        loop {
            let next = {
                let view = RawPageView(guard.get_data());
                if view.is_leaf_page() {
                    None
                } else {
                    Some(InternalPage::<K>::new(guard.get_data()).value_at(0))
                }
            };
            match next {
                Some(id) => guard = self.bpm.fetch_page_read(id).ok_or(Error::PoolExhausted)?,
                None => return Ok(guard.page_id()),
            }
        }
    }

    /*********************************************************************
     * DIAGNOSTICS
     *********************************************************************/

    /// Walks the whole tree checking the invariants this module relies on:
    /// every non-root page is at least half full, every leaf's keys are
    /// sorted, and every internal separator correctly routes to its child's
    /// keys. Intended for tests, not the hot path.
    pub fn check_invariants(&self) -> Result<()> {
        let root_id = self.root_page_id()?;
        if root_id == INVALID_PAGE_ID {
            return Ok(());
        }
        self.check_subtree(root_id)
    }

    fn check_subtree(&self, page_id: PageId) -> Result<()> {
        let guard = self.bpm.fetch_page_read(page_id).ok_or(Error::PoolExhausted)?;
        let view = RawPageView(guard.get_data());
        if !view.is_root_page() {
            assert!(view.size() >= view.min_size(), "page {page_id} fell below min_size");
        }
        assert!(view.size() <= view.max_size(), "page {page_id} exceeded max_size");

        if view.is_leaf_page() {
            let leaf = LeafPage::<K, V>::new(guard.get_data());
            for w in leaf.entries().windows(2) {
                assert_eq!(
                    self.comparator.compare(&w[0].0, &w[1].0),
                    Ordering::Less,
                    "leaf {page_id} keys out of order"
                );
            }
        } else {
            let internal = InternalPage::<K>::new(guard.get_data());
            let entries = internal.entries();
            for w in entries.windows(2) {
                assert_eq!(
                    self.comparator.compare(&w[0].0, &w[1].0),
                    Ordering::Less,
                    "internal {page_id} keys out of order"
                );
            }
            drop(guard);
            for (_, child_id) in entries {
                self.check_subtree(child_id)?;
            }
        }
        Ok(())
    }
}

fn lower_bound<K: Key, V: Value>(leaf: &LeafPage<'_, K, V>, key: &K, cmp: &impl Comparator<K>) -> usize {
    let mut lo = 0usize;
    let mut hi = leaf.size();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if cmp.compare(&leaf.key_at(mid), key) == Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}
