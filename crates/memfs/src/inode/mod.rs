//! Inode primitives for the filesystem engine.
//!
//! This module provides the inode records (directories and regular files),
//! the capability trait they share, and the table that allocates and owns
//! them.

mod dir;
mod file;
mod manager;
mod types;

pub use dir::INodeDir;
pub use file::{FileState, INodeFile};
pub use manager::InodeTable;
pub use types::{
    DirEntry, INode, InodeId, InodeKind, InodeRefs, OwnerInfo, Stat, Timestamps,
    DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, ROOT_INODE, S_IFDIR, S_IFREG,
};
