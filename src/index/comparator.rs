//! Key ordering used by the tree during descent and slot search.
//!
//! The tree takes a `Comparator<K>` rather than requiring `K: Ord` directly
//! so an index can later be built over keys whose natural byte order isn't
//! the comparison order it needs (e.g. composite keys, descending indexes)
//! without changing the tree itself.

use std::cmp::Ordering;
use std::marker::PhantomData;

pub trait Comparator<K>: Clone + Send + Sync + 'static {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

pub struct NaturalOrderComparator<K>(PhantomData<K>);

impl<K> NaturalOrderComparator<K> {
    pub fn new() -> Self {
        NaturalOrderComparator(PhantomData)
    }
}

impl<K> Clone for NaturalOrderComparator<K> {
    fn clone(&self) -> Self {
        NaturalOrderComparator(PhantomData)
    }
}

impl<K> Default for NaturalOrderComparator<K> {
    fn default() -> Self {
        NaturalOrderComparator(PhantomData)
    }
}

impl<K: Ord + Clone + Send + Sync + 'static> Comparator<K> for NaturalOrderComparator<K> {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}
