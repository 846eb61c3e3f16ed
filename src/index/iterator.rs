//! A forward-only cursor over an index's entries in key order, walking leaf
//! pages via their `next_page_id` chain rather than re-descending the tree.
//!
//! Unlike a C++ `operator++`, advancing past the last slot of the current
//! leaf immediately fetches the next leaf (rather than waiting for the next
//! dereference to notice), so a held iterator never pins a leaf it has
//! already fully consumed.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::config::{PageId, INVALID_PAGE_ID};
use crate::index::codec::{Key, Value};
use crate::index::comparator::Comparator;
use crate::storage::page::b_plus_tree_page::BPlusTreePageView;
use crate::storage::page::b_plus_tree_leaf_page::LeafPage;
use crate::storage::page::ReadPageGuard;

pub struct BPlusTreeIndexIterator<K, V, C> {
    bpm: Option<Arc<BufferPoolManager>>,
    guard: Option<ReadPageGuard>,
    index: usize,
    _marker: PhantomData<(K, V, C)>,
}

impl<K: Key, V: Value, C: Comparator<K>> BPlusTreeIndexIterator<K, V, C> {
    pub fn empty() -> Self {
        BPlusTreeIndexIterator {
            bpm: None,
            guard: None,
            index: 0,
            _marker: PhantomData,
        }
    }

    pub fn at_start(bpm: Arc<BufferPoolManager>, leaf_id: PageId) -> crate::common::error::Result<Self> {
        Self::at(bpm, leaf_id, 0)
    }

    pub fn at(bpm: Arc<BufferPoolManager>, leaf_id: PageId, index: usize) -> crate::common::error::Result<Self> {
        let guard = bpm
            .fetch_page_read(leaf_id)
            .ok_or(crate::common::error::Error::PoolExhausted)?;
        Ok(BPlusTreeIndexIterator {
            bpm: Some(bpm),
            guard: Some(guard),
            index,
            _marker: PhantomData,
        })
    }
}

impl<K: Key, V: Value, C: Comparator<K>> Iterator for BPlusTreeIndexIterator<K, V, C> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        loop {
            let guard = self.guard.as_ref()?;
            let leaf = LeafPage::<K, V>::new(guard.get_data());

            if self.index < leaf.size() {
                let item = (leaf.key_at(self.index), leaf.value_at(self.index));
                self.index += 1;
                return Some(item);
            }

            let next_id = leaf.next_page_id();
            if next_id == INVALID_PAGE_ID {
                self.guard = None;
                return None;
            }
            self.guard = self.bpm.as_ref().and_then(|bpm| bpm.fetch_page_read(next_id));
            self.index = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempdir::TempDir;

    use super::*;
    use crate::index::b_plus_tree::BPlusTree;
    use crate::index::codec::RecordId;
    use crate::index::comparator::NaturalOrderComparator;
    use crate::storage::disk::DiskManager;

    #[test]
    fn iterates_all_inserted_keys_in_order() {
        let dir = TempDir::new("bptree_iter_test").unwrap();
        let db_file = dir.path().join("test.db");
        let disk_manager = Arc::new(DiskManager::new(db_file.to_str().unwrap()));
        let bpm = Arc::new(BufferPoolManager::new(30, disk_manager));

        let tree: BPlusTree<i64, RecordId, NaturalOrderComparator<i64>> = BPlusTree::new(
            "iter_idx".to_string(),
            bpm,
            NaturalOrderComparator::new(),
            4,
            4,
        );

        let mut keys: Vec<i64> = (0..200).collect();
        keys.reverse();
        for k in &keys {
            assert!(tree.insert(*k, RecordId::new(*k as u32, 0)).unwrap());
        }

        let collected: Vec<i64> = tree.begin().unwrap().map(|(k, _)| k).collect();
        let mut expected: Vec<i64> = (0..200).collect();
        expected.sort();
        assert_eq!(collected, expected);

        let from_50: Vec<i64> = tree.begin_at(&50).unwrap().map(|(k, _)| k).collect();
        assert_eq!(from_50, (50..200).collect::<Vec<i64>>());
    }
}
