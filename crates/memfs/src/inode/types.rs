//! Core inode types and traits.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{MemFsError, Result};

/// Unique identifier for an inode.
pub type InodeId = u64;

/// Root directory inode ID, reserved before any lookup.
pub const ROOT_INODE: InodeId = 1;

/// File type bits for a directory.
pub const S_IFDIR: u32 = 0o040_000;

/// File type bits for a regular file.
pub const S_IFREG: u32 = 0o100_000;

/// Default mode of the root directory (drwxr-xr-x).
pub const DEFAULT_DIR_MODE: u32 = S_IFDIR | 0o755;

/// Default mode of a regular file (-rw-r--r--).
pub const DEFAULT_FILE_MODE: u32 = S_IFREG | 0o644;

/// Type of inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InodeKind {
    /// Directory.
    Directory,
    /// Regular file.
    RegularFile,
}

/// Owner and mode bits.
///
/// Opaque to the engine: stored and returned verbatim, never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerInfo {
    /// User ID.
    pub uid: u32,
    /// Group ID.
    pub gid: u32,
    /// Mode bits as supplied by the host.
    pub mode: u32,
}

impl OwnerInfo {
    /// Create owner info.
    ///
    /// # Arguments
    /// * `uid` - User ID
    /// * `gid` - Group ID
    /// * `mode` - Mode bits
    pub fn new(uid: u32, gid: u32, mode: u32) -> Self {
        Self { uid, gid, mode }
    }
}

impl Default for OwnerInfo {
    fn default() -> Self {
        Self::new(0, 0, DEFAULT_DIR_MODE)
    }
}

/// Access, modification and change times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timestamps {
    /// Last access time.
    pub atime: SystemTime,
    /// Last content modification time.
    pub mtime: SystemTime,
    /// Last metadata change time.
    pub ctime: SystemTime,
}

impl Timestamps {
    /// All three times set to `now`.
    pub fn at(now: SystemTime) -> Self {
        Self {
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    /// Stamp modification and change times.
    pub fn modified(&mut self, now: SystemTime) {
        self.mtime = now;
        self.ctime = now;
    }
}

/// Metadata shared by every inode kind, kept under the inode's own lock.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InodeAttrs {
    /// Owner and mode bits.
    pub(crate) owner: OwnerInfo,
    /// Timestamps.
    pub(crate) times: Timestamps,
    /// Metadata or content changed since the last sync.
    pub(crate) dirty: bool,
}

impl InodeAttrs {
    pub(crate) fn new(owner: OwnerInfo, now: SystemTime) -> Self {
        Self {
            owner,
            times: Timestamps::at(now),
            dirty: false,
        }
    }
}

/// Attribute snapshot returned by `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stat {
    /// Inode ID.
    pub ino: InodeId,
    /// Inode type.
    pub kind: InodeKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Resident pages backing the content.
    pub pages: u64,
    /// Number of directory entries naming this inode.
    pub nlink: usize,
    /// Owner and mode bits.
    pub owner: OwnerInfo,
    /// Timestamps.
    pub times: Timestamps,
    /// Unsynced modifications exist.
    pub dirty: bool,
}

/// Reference counts deciding when an inode may be freed.
///
/// An inode is freed once it has neither namespace entries (`links`) nor
/// outstanding handles (`handles`).
#[derive(Debug)]
pub struct InodeRefs {
    /// Outstanding handles.
    handles: AtomicUsize,
    /// Directory entries naming this inode.
    links: AtomicUsize,
}

impl InodeRefs {
    /// Counts for a record held by one handle and no entries.
    pub(crate) fn held() -> Self {
        Self {
            handles: AtomicUsize::new(1),
            links: AtomicUsize::new(0),
        }
    }

    /// Outstanding handles.
    pub fn handles(&self) -> usize {
        self.handles.load(Ordering::Acquire)
    }

    /// Directory entries naming this inode.
    pub fn links(&self) -> usize {
        self.links.load(Ordering::Acquire)
    }

    /// Check if nothing keeps the inode alive.
    pub fn is_unreferenced(&self) -> bool {
        self.handles() == 0 && self.links() == 0
    }

    pub(crate) fn acquire(&self) {
        self.handles.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one handle.
    ///
    /// # Returns
    /// Remaining handle count, or None if none were held.
    pub(crate) fn release(&self) -> Option<usize> {
        self.handles
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .ok()
            .map(|previous| previous - 1)
    }

    pub(crate) fn link(&self) {
        self.links.fetch_add(1, Ordering::AcqRel);
    }

    /// Take the first entry, if no entry names the inode yet.
    ///
    /// # Returns
    /// false if the inode is already linked somewhere.
    pub(crate) fn link_first(&self) -> bool {
        self.links
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Drop one entry.
    ///
    /// # Returns
    /// Remaining link count.
    pub(crate) fn unlink(&self) -> usize {
        self.links
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
            .map(|previous| previous.saturating_sub(1))
            .unwrap_or(0)
    }
}

/// One entry of a directory, as stored and as enumerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name.
    pub name: Vec<u8>,
    /// Target inode ID.
    pub ino: InodeId,
    /// Target inode type.
    pub kind: InodeKind,
    /// Insertion sequence number within the parent. Never reused.
    pub seq: u64,
}

impl DirEntry {
    /// Entry name as UTF-8, replacing invalid sequences.
    pub fn name_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

/// Capability set shared by every inode kind.
///
/// Directories implement the namespace capabilities (`resolve`, `create`,
/// `unlink`, `list_children`), regular files the content capabilities
/// (`read_at`, `write_at`). The defaults reject the call, so callers
/// dispatch through this trait instead of inspecting the kind.
pub trait INode: Send + Sync + std::fmt::Debug {
    /// Get the inode ID.
    fn id(&self) -> InodeId;

    /// Get the inode type.
    fn kind(&self) -> InodeKind;

    /// Reference counts.
    fn refs(&self) -> &InodeRefs;

    /// Attribute snapshot.
    fn stat(&self) -> Stat;

    /// Replace owner and mode bits, stamping change time.
    ///
    /// # Arguments
    /// * `owner` - New owner info
    /// * `now` - Current time
    fn set_owner(&self, owner: OwnerInfo, now: SystemTime);

    /// Clear dirty flags (writeback hook).
    ///
    /// # Returns
    /// Number of pages that were dirty.
    fn sync(&self) -> usize;

    /// Find a child entry by name.
    ///
    /// # Returns
    /// The child inode ID, or None if no entry matches.
    fn resolve(&self, _name: &[u8]) -> Result<Option<InodeId>> {
        Err(MemFsError::InvalidParent(self.id()))
    }

    /// Add a named entry for `child`.
    ///
    /// # Arguments
    /// * `name` - Entry name (already validated)
    /// * `child` - Target inode ID
    /// * `kind` - Target inode type
    /// * `now` - Current time
    fn create(&self, _name: &[u8], _child: InodeId, _kind: InodeKind, _now: SystemTime) -> Result<()> {
        Err(MemFsError::InvalidParent(self.id()))
    }

    /// Remove a named entry.
    ///
    /// # Returns
    /// The removed entry, or None if no entry matches.
    fn unlink(&self, _name: &[u8], _now: SystemTime) -> Result<Option<DirEntry>> {
        Err(MemFsError::InvalidParent(self.id()))
    }

    /// Enumerate entries in insertion order.
    ///
    /// # Arguments
    /// * `from_seq` - Smallest sequence number to include
    /// * `limit` - Maximum number of entries to return
    fn list_children(&self, _from_seq: u64, _limit: usize) -> Result<Vec<DirEntry>> {
        Err(MemFsError::InvalidParent(self.id()))
    }

    /// Read up to `length` bytes at `offset`, stopping at end of file.
    fn read_at(&self, _offset: u64, _length: usize) -> Result<Vec<u8>> {
        Err(MemFsError::NotAFile(self.id()))
    }

    /// Write `bytes` at `offset` as a single transaction.
    ///
    /// # Returns
    /// Number of bytes written.
    fn write_at(&self, _offset: u64, _bytes: &[u8], _clock: &dyn Clock) -> Result<usize> {
        Err(MemFsError::NotAFile(self.id()))
    }

    /// Downcast to Any for type-safe downcasting.
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refs_lifecycle() {
        let refs: InodeRefs = InodeRefs::held();
        assert_eq!(refs.handles(), 1);
        assert!(!refs.is_unreferenced());

        refs.link();
        assert_eq!(refs.release(), Some(0));
        assert!(!refs.is_unreferenced());
        assert_eq!(refs.unlink(), 0);
        assert!(refs.is_unreferenced());
    }

    #[test]
    fn test_link_first_only_once() {
        let refs: InodeRefs = InodeRefs::held();
        assert!(refs.link_first());
        assert!(!refs.link_first());
        assert_eq!(refs.links(), 1);

        refs.unlink();
        assert!(refs.link_first());
    }

    #[test]
    fn test_release_below_zero_is_refused() {
        let refs: InodeRefs = InodeRefs::held();
        assert_eq!(refs.release(), Some(0));
        assert_eq!(refs.release(), None);
        assert_eq!(refs.handles(), 0);
    }

    #[test]
    fn test_timestamps_modified_keeps_atime() {
        let start: SystemTime = SystemTime::UNIX_EPOCH;
        let later: SystemTime = start + std::time::Duration::from_secs(5);
        let mut times: Timestamps = Timestamps::at(start);
        times.modified(later);
        assert_eq!(times.atime, start);
        assert_eq!(times.mtime, later);
        assert_eq!(times.ctime, later);
    }
}
