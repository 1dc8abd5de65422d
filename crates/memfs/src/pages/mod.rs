//! Page-granular storage for regular file content.

mod page;
mod store;

pub use page::Page;
pub use store::{size_after_write, PageSpan, PageStore, StagedPages};
