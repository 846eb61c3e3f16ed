pub mod b_plus_tree;
pub mod codec;
pub mod comparator;
pub mod iterator;

pub use b_plus_tree::BPlusTree;
pub use codec::{Key, RecordId, Value};
pub use comparator::{Comparator, NaturalOrderComparator};
pub use iterator::BPlusTreeIndexIterator;
