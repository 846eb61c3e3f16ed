//! Concurrent exercise of `BPlusTree` through its public API: several
//! threads hammering `insert`/`remove`/`get_value` on one shared tree,
//! checking the tree ends up holding exactly the keys that should survive.
//!
//! Each test owns a private `DiskManager`/`BufferPoolManager` pair backed by
//! a `tempdir`, so tests never contend with each other over a shared file.

use std::sync::Arc;

use crabtree::buffer::BufferPoolManager;
use crabtree::common::config::HEADER_PAGE_ID;
use crabtree::index::codec::RecordId;
use crabtree::index::comparator::NaturalOrderComparator;
use crabtree::index::BPlusTree;
use crabtree::storage::disk::DiskManager;
use tempdir::TempDir;

type TestTree = BPlusTree<i64, RecordId, NaturalOrderComparator<i64>>;

fn new_tree(name: &str, pool_size: usize) -> (TempDir, TestTree) {
    let dir = TempDir::new(name).unwrap();
    let db_file = dir.path().join("test.db");
    let disk_manager = Arc::new(DiskManager::new(db_file.to_str().unwrap()));
    let bpm = Arc::new(BufferPoolManager::new(pool_size, disk_manager));
    // the header page always lives at id 0; allocate it up front like a
    // freshly-formatted database would.
    let (page_id, _guard) = bpm.new_page_guarded().unwrap();
    assert_eq!(page_id, HEADER_PAGE_ID);
    let tree = BPlusTree::new(name.to_string(), bpm, NaturalOrderComparator::new(), 4, 4);
    (dir, tree)
}

fn rid(key: i64) -> RecordId {
    RecordId::new((key >> 32) as u32, key as u32)
}

fn collect_from(tree: &TestTree, start: i64) -> Vec<(i64, RecordId)> {
    tree.begin_at(&start).unwrap().collect()
}

#[test]
fn insert_test_two_threads_disjoint_ranges() {
    let (_dir, tree) = new_tree("insert_test1", 50);
    let tree = Arc::new(tree);
    let keys: Vec<i64> = (1..100).collect();

    crossbeam::thread::scope(|s| {
        for chunk in keys.chunks(50) {
            let tree = tree.clone();
            s.spawn(move |_| {
                for &k in chunk {
                    tree.insert(k, rid(k)).unwrap();
                }
            });
        }
    })
    .unwrap();

    for &k in &keys {
        assert_eq!(tree.get_value(&k).unwrap(), Some(rid(k)));
    }
    let scanned = collect_from(&tree, 1);
    assert_eq!(scanned.len(), keys.len());
    tree.check_invariants().unwrap();
}

#[test]
fn insert_and_get_test_four_threads_same_keys() {
    let (_dir, tree) = new_tree("insert_and_get_test", 50);
    let tree = Arc::new(tree);
    let keys: Vec<i64> = (1..1000).collect();

    crossbeam::thread::scope(|s| {
        for chunk in keys.chunks(250) {
            let tree = tree.clone();
            let chunk = chunk.to_vec();
            s.spawn(move |_| {
                for &k in &chunk {
                    tree.insert(k, rid(k)).unwrap();
                }
                for &k in &chunk {
                    assert_eq!(tree.get_value(&k).unwrap(), Some(rid(k)));
                }
            });
        }
    })
    .unwrap();

    let scanned = collect_from(&tree, 1);
    assert_eq!(scanned.len(), keys.len());
    tree.check_invariants().unwrap();
}

#[test]
fn delete_test_two_threads_disjoint_ranges() {
    let (_dir, tree) = new_tree("delete_test1", 50);
    for k in 1..=5i64 {
        tree.insert(k, rid(k)).unwrap();
    }

    let tree = Arc::new(tree);
    let remove_keys = vec![1i64, 5, 3, 4];
    crossbeam::thread::scope(|s| {
        for chunk in remove_keys.chunks(2) {
            let tree = tree.clone();
            let chunk = chunk.to_vec();
            s.spawn(move |_| {
                for k in chunk {
                    tree.remove(&k).unwrap();
                }
            });
        }
    })
    .unwrap();

    let scanned = collect_from(&tree, 2);
    assert_eq!(scanned, vec![(2, rid(2))]);
    tree.check_invariants().unwrap();
}

#[test]
fn delete_test_survives_large_scale_parallel_removal() {
    let (_dir, tree) = new_tree("delete_test3", 50);
    for k in 1..=100i64 {
        tree.insert(k, rid(k)).unwrap();
    }

    let tree = Arc::new(tree);
    let remove_keys: Vec<i64> = (1..=80).collect();
    let total_threads = 2usize;
    crossbeam::thread::scope(|s| {
        for thread_idx in 0..total_threads {
            let tree = tree.clone();
            let remove_keys = remove_keys.clone();
            s.spawn(move |_| {
                for &k in &remove_keys {
                    if (k as usize) % total_threads == thread_idx {
                        tree.remove(&k).unwrap();
                    }
                }
            });
        }
    })
    .unwrap();

    let scanned = collect_from(&tree, 81);
    assert_eq!(scanned.len(), 20);
    assert_eq!(scanned.first().unwrap().0, 81);
    assert_eq!(scanned.last().unwrap().0, 100);
    tree.check_invariants().unwrap();
}

#[test]
fn delete_and_get_test_removed_keys_stay_gone() {
    let (_dir, tree) = new_tree("delete_and_get_test", 50);
    for k in 1..=10i64 {
        tree.insert(k, rid(k)).unwrap();
    }

    let tree = Arc::new(tree);
    let remove_keys = vec![1i64, 5, 3, 4, 6, 7, 8, 9, 10];
    crossbeam::thread::scope(|s| {
        for chunk in remove_keys.chunks(5) {
            let tree = tree.clone();
            let chunk = chunk.to_vec();
            s.spawn(move |_| {
                for &k in &chunk {
                    tree.remove(&k).unwrap();
                }
                for &k in &chunk {
                    assert_eq!(tree.get_value(&k).unwrap(), None);
                }
            });
        }
    })
    .unwrap();

    let scanned = collect_from(&tree, 2);
    assert_eq!(scanned, vec![(2, rid(2))]);
}

#[test]
fn mix_test_concurrent_insert_then_concurrent_delete() {
    let (_dir, tree) = new_tree("mix_test", 50);
    for k in 1..=5i64 {
        tree.insert(k, rid(k)).unwrap();
    }

    let tree = Arc::new(tree);
    let extra: Vec<i64> = (6..=10).collect();
    crossbeam::thread::scope(|s| {
        let tree = tree.clone();
        let extra = extra.clone();
        s.spawn(move |_| {
            for k in extra {
                tree.insert(k, rid(k)).unwrap();
            }
        });
    })
    .unwrap();

    let remove_keys = vec![1i64, 4, 3, 5, 6];
    crossbeam::thread::scope(|s| {
        let tree = tree.clone();
        s.spawn(move |_| {
            for k in remove_keys {
                tree.remove(&k).unwrap();
            }
        });
    })
    .unwrap();

    let scanned = collect_from(&tree, 2);
    assert_eq!(scanned.len(), 5);
    tree.check_invariants().unwrap();
}

#[test]
fn mix_test_concurrent_insert_and_delete_leave_disjoint_survivors() {
    let (_dir, tree) = new_tree("mix_test2", 50);
    let tree = Arc::new(tree);

    let removed_keys: Vec<i64> = (1..=200).collect();
    let kept_keys: Vec<i64> = (201..=400).collect();

    crossbeam::thread::scope(|s| {
        for chunk in removed_keys.chunks(50) {
            let tree = tree.clone();
            let chunk = chunk.to_vec();
            s.spawn(move |_| {
                for k in chunk {
                    tree.insert(k, rid(k)).unwrap();
                }
            });
        }
    })
    .unwrap();

    crossbeam::thread::scope(|s| {
        let insert_tree = tree.clone();
        let kept = kept_keys.clone();
        s.spawn(move |_| {
            for k in kept {
                insert_tree.insert(k, rid(k)).unwrap();
            }
        });
        for chunk in removed_keys.chunks(50) {
            let tree = tree.clone();
            let chunk = chunk.to_vec();
            s.spawn(move |_| {
                for k in chunk {
                    tree.remove(&k).unwrap();
                }
            });
        }
    })
    .unwrap();

    for &k in &removed_keys {
        assert_eq!(tree.get_value(&k).unwrap(), None);
    }

    let scanned = collect_from(&tree, 201);
    assert_eq!(scanned.len(), kept_keys.len());
    tree.check_invariants().unwrap();
}

#[test]
fn empty_tree_iterator_yields_nothing() {
    let (_dir, tree) = new_tree("empty_iter_test", 10);
    assert!(tree.begin().unwrap().next().is_none());
    assert!(tree.is_empty().unwrap());
}
