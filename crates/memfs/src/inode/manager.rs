//! Inode table for allocating and tracking inodes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::dir::INodeDir;
use super::file::INodeFile;
use super::types::{INode, InodeId, InodeKind, OwnerInfo, ROOT_INODE};
use crate::clock::Clock;
use crate::error::{MemFsError, Result};
use crate::memory_pool::PageAllocator;

/// Owns every inode record of a mount.
///
/// Identity assignment, first-creator-wins initialization and freeing all
/// happen under the table's per-shard locks, so two threads can never
/// initialize the same identity twice or free an inode someone is
/// acquiring.
pub struct InodeTable {
    /// Next inode ID to allocate.
    next_id: AtomicU64,
    /// All live inodes by ID.
    inodes: DashMap<InodeId, Arc<dyn INode>>,
    /// Page frame source handed to new files.
    allocator: Arc<dyn PageAllocator>,
    /// Timestamp source.
    clock: Arc<dyn Clock>,
    /// Number of inodes freed since creation.
    freed_count: AtomicU64,
}

impl InodeTable {
    /// Create an empty table.
    ///
    /// IDs up to and including `ROOT_INODE` are reserved for well-known
    /// inodes created through `get_or_create`.
    ///
    /// # Arguments
    /// * `allocator` - Page frame source for regular files
    /// * `clock` - Timestamp source
    pub fn new(allocator: Arc<dyn PageAllocator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            next_id: AtomicU64::new(ROOT_INODE + 1),
            inodes: DashMap::new(),
            allocator,
            clock,
            freed_count: AtomicU64::new(0),
        }
    }

    /// Allocate a new inode ID.
    fn allocate_id(&self) -> InodeId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Build a fresh record holding one handle.
    fn build(&self, id: InodeId, kind: InodeKind, owner: OwnerInfo) -> Arc<dyn INode> {
        let now = self.clock.now();
        match kind {
            InodeKind::Directory => Arc::new(INodeDir::new(id, owner, now)),
            InodeKind::RegularFile => {
                Arc::new(INodeFile::new(id, self.allocator.clone(), owner, now))
            }
        }
    }

    /// Timestamp source shared by the mount.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Page frame source shared by the mount.
    pub fn allocator(&self) -> &Arc<dyn PageAllocator> {
        &self.allocator
    }

    /// Create a record under a fresh identity.
    ///
    /// The record starts with one handle held by the caller and no
    /// directory entries; `release` it once it is linked (or abandoned).
    ///
    /// # Arguments
    /// * `kind` - Directory or regular file
    /// * `owner` - Owner and mode bits
    ///
    /// # Returns
    /// The new inode ID.
    pub fn allocate(&self, kind: InodeKind, owner: OwnerInfo) -> InodeId {
        loop {
            let id: InodeId = self.allocate_id();
            if let Entry::Vacant(slot) = self.inodes.entry(id) {
                slot.insert(self.build(id, kind, owner));
                tracing::trace!(ino = id, ?kind, "inode allocated");
                return id;
            }
            // Taken by an explicit get_or_create; try the next one.
        }
    }

    /// Fetch a record, initializing it if the identity is not live.
    ///
    /// The first creator wins: an existing record is returned unchanged,
    /// whatever `kind` and `owner` say. Either way the caller receives one
    /// handle.
    ///
    /// # Arguments
    /// * `id` - Identity known in advance
    /// * `kind` - Kind to initialize with
    /// * `owner` - Owner to initialize with
    pub fn get_or_create(&self, id: InodeId, kind: InodeKind, owner: OwnerInfo) -> Arc<dyn INode> {
        match self.inodes.entry(id) {
            Entry::Occupied(existing) => {
                let node: Arc<dyn INode> = existing.get().clone();
                node.refs().acquire();
                tracing::trace!(ino = id, "returning existing inode");
                node
            }
            Entry::Vacant(slot) => {
                let node: Arc<dyn INode> = self.build(id, kind, owner);
                self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
                slot.insert(node.clone());
                tracing::debug!(ino = id, ?kind, "inode initialized");
                node
            }
        }
    }

    /// Get an inode by ID.
    ///
    /// # Arguments
    /// * `id` - Inode ID to look up
    ///
    /// # Returns
    /// The inode if live.
    pub fn get(&self, id: InodeId) -> Option<Arc<dyn INode>> {
        self.inodes.get(&id).map(|node| node.value().clone())
    }

    /// Check if an identity is live.
    pub fn contains(&self, id: InodeId) -> bool {
        self.inodes.contains_key(&id)
    }

    /// Take a handle on a live inode.
    ///
    /// # Arguments
    /// * `id` - Inode ID
    pub fn acquire(&self, id: InodeId) -> Result<Arc<dyn INode>> {
        let node = self.inodes.get(&id).ok_or(MemFsError::InodeNotFound(id))?;
        // Counted while the shard guard is held, so a concurrent free cannot
        // slip in between lookup and increment.
        node.refs().acquire();
        Ok(node.value().clone())
    }

    /// Drop a handle.
    ///
    /// Frees the record (and its pages) once no handle and no directory
    /// entry refers to it.
    ///
    /// # Arguments
    /// * `id` - Inode ID
    ///
    /// # Returns
    /// true if the inode was freed.
    pub fn release(&self, id: InodeId) -> Result<bool> {
        let node: Arc<dyn INode> = self.get(id).ok_or(MemFsError::InodeNotFound(id))?;
        let remaining: usize = node.refs().release().ok_or(MemFsError::StaleHandle(id))?;
        drop(node);
        if remaining > 0 {
            return Ok(false);
        }
        Ok(self.forget_if_unreferenced(id))
    }

    /// Remove a record whose handle and link counts are both zero.
    ///
    /// # Returns
    /// true if the record was removed.
    pub(crate) fn forget_if_unreferenced(&self, id: InodeId) -> bool {
        match self.inodes.remove_if(&id, |_, node| node.refs().is_unreferenced()) {
            Some((_, node)) => {
                self.freed_count.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(ino = id, kind = ?node.kind(), "inode freed");
                true
            }
            None => false,
        }
    }

    /// Get the number of live inodes.
    pub fn inode_count(&self) -> usize {
        self.inodes.len()
    }

    /// Get the number of inodes freed so far.
    pub fn freed_count(&self) -> u64 {
        self.freed_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for InodeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InodeTable")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("live", &self.inodes.len())
            .finish()
    }
}
