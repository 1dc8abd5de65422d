//! Directory namespace: named edges and resumable enumeration.

mod graph;
mod readdir;

pub use graph::{validate_name, DirectoryGraph, MAX_NAME_LEN};
pub use readdir::{ReaddirBatch, ReaddirCursor, ReaddirEntry, DOT_ENTRIES};
