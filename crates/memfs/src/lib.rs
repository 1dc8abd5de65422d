//! In-memory filesystem engine.
//!
//! This crate provides the core of a RAM-backed filesystem: an inode table,
//! a directory graph, a page store per regular file and a write transaction
//! pipeline. A host adapter (VFS glue, FUSE, a test harness) drives it
//! through the [`MemFs`] context object.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: MemFs (mount, lookup, create, read, write, list_dir, stat)
//! Layer 2: DirectoryGraph + readdir cursor │ WriteTransaction
//! Layer 1: Primitives (InodeTable, PageStore, MemoryPool, Clock)
//! ```
//!
//! # Example
//!
//! ```
//! use memfs::{InodeKind, MemFs, MemFsOptions, OwnerInfo, DEFAULT_FILE_MODE};
//!
//! let fs = MemFs::mount(MemFsOptions::default())?;
//! let owner = OwnerInfo::new(1000, 1000, DEFAULT_FILE_MODE);
//! let id = fs.create(fs.root(), b"hello.txt", InodeKind::RegularFile, owner)?;
//!
//! fs.write(id, 0, b"hello")?;
//! assert_eq!(fs.read(id, 0, 64)?, b"hello");
//! assert_eq!(fs.lookup(fs.root(), b"hello.txt")?, Some(id));
//! # Ok::<(), memfs::MemFsError>(())
//! ```

pub mod clock;
pub mod error;
pub mod filesystem;
pub mod inode;
pub mod memory_pool;
pub mod namespace;
pub mod options;
pub mod pages;
pub mod stats;
pub mod write;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{MemFsError, Result};
pub use filesystem::MemFs;
pub use inode::{
    DirEntry, INode, INodeDir, INodeFile, InodeId, InodeKind, InodeTable, OwnerInfo, Stat,
    Timestamps, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, ROOT_INODE,
};
pub use memory_pool::{
    MemoryPool, MemoryPoolConfig, MemoryPoolError, MemoryPoolStats, PageAllocator,
};
pub use namespace::{DirectoryGraph, ReaddirBatch, ReaddirCursor, ReaddirEntry};
pub use options::{MemFsOptions, DEFAULT_MAX_READ_SIZE, MEMFS_MAGIC, MEMFS_VERSION};
pub use pages::{size_after_write, PageStore};
pub use stats::{FsStats, FsStatsCollector, SuperblockParams};
pub use write::{TxState, WriteTransaction};
