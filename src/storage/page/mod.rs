pub mod b_plus_tree_internal_page;
pub mod b_plus_tree_leaf_page;
pub mod b_plus_tree_page;
pub mod header_page;
pub mod page;
pub mod page_guard;

pub use header_page::{HeaderPage, HeaderPageMut};
pub use page::Page;
pub use page_guard::{BasicPageGuard, ReadPageGuard, WritePageGuard};
