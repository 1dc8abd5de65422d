//! Regular file inode implementation.

use std::any::Any;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use super::types::{INode, InodeAttrs, InodeId, InodeKind, InodeRefs, OwnerInfo, Stat};
use crate::clock::Clock;
use crate::error::Result;
use crate::memory_pool::PageAllocator;
use crate::pages::PageStore;
use crate::write::WriteTransaction;

/// Lock-protected file contents and metadata.
#[derive(Debug)]
pub struct FileState {
    /// Owner, times and dirty flag.
    pub(crate) attrs: InodeAttrs,
    /// Committed size in bytes.
    pub(crate) size: u64,
    /// Content pages.
    pub(crate) store: PageStore,
}

impl FileState {
    /// Create the state of an empty file.
    ///
    /// # Arguments
    /// * `allocator` - Page frame source
    /// * `owner` - Owner and mode bits
    /// * `now` - Creation time
    pub fn new(allocator: Arc<dyn PageAllocator>, owner: OwnerInfo, now: SystemTime) -> Self {
        Self {
            attrs: InodeAttrs::new(owner, now),
            size: 0,
            store: PageStore::new(allocator),
        }
    }

    /// Committed size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Content pages.
    pub fn store(&self) -> &PageStore {
        &self.store
    }
}

/// Regular file inode.
///
/// Size, times and pages share one per-inode lock; a write holds it in
/// write mode from transaction begin to commit.
#[derive(Debug)]
pub struct INodeFile {
    /// Inode ID.
    id: InodeId,
    /// Reference counts.
    refs: InodeRefs,
    /// Contents under the per-inode lock.
    state: RwLock<FileState>,
}

impl INodeFile {
    /// Create a new, empty file inode.
    ///
    /// # Arguments
    /// * `id` - Inode ID
    /// * `allocator` - Page frame source
    /// * `owner` - Owner and mode bits
    /// * `now` - Creation time
    pub fn new(id: InodeId, allocator: Arc<dyn PageAllocator>, owner: OwnerInfo, now: SystemTime) -> Self {
        Self {
            id,
            refs: InodeRefs::held(),
            state: RwLock::new(FileState::new(allocator, owner, now)),
        }
    }

    /// Get the committed size in bytes.
    pub fn size(&self) -> u64 {
        self.state.read().size
    }

    /// Run a closure with read access to the file state.
    pub fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&FileState) -> R,
    {
        let guard = self.state.read();
        f(&guard)
    }
}

impl INode for INodeFile {
    fn id(&self) -> InodeId {
        self.id
    }

    fn kind(&self) -> InodeKind {
        InodeKind::RegularFile
    }

    fn refs(&self) -> &InodeRefs {
        &self.refs
    }

    fn stat(&self) -> Stat {
        let state = self.state.read();
        Stat {
            ino: self.id,
            kind: InodeKind::RegularFile,
            size: state.size,
            pages: state.store.resident_pages() as u64,
            nlink: self.refs.links(),
            owner: state.attrs.owner,
            times: state.attrs.times,
            dirty: state.attrs.dirty,
        }
    }

    fn set_owner(&self, owner: OwnerInfo, now: SystemTime) {
        let mut state = self.state.write();
        state.attrs.owner = owner;
        state.attrs.times.ctime = now;
        state.attrs.dirty = true;
    }

    fn sync(&self) -> usize {
        let mut state = self.state.write();
        state.attrs.dirty = false;
        state.store.clean()
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let state = self.state.read();
        if offset >= state.size {
            return Ok(Vec::new());
        }
        let available: u64 = state.size - offset;
        let to_read: usize = usize::try_from(available).map_or(length, |a| a.min(length));

        let mut buf: Vec<u8> = vec![0u8; to_read];
        state.store.read_into(offset, &mut buf);
        Ok(buf)
    }

    fn write_at(&self, offset: u64, bytes: &[u8], clock: &dyn Clock) -> Result<usize> {
        let mut state = self.state.write();
        let mut tx: WriteTransaction<'_> = WriteTransaction::new(self.id, &mut state, offset, bytes)?;
        tx.begin()?;
        tx.commit(clock.now())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
