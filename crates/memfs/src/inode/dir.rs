//! Directory inode implementation.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::RwLock;

use super::types::{DirEntry, INode, InodeAttrs, InodeId, InodeKind, InodeRefs, OwnerInfo, Stat};
use crate::error::{MemFsError, Result};

/// Lock-protected directory contents.
#[derive(Debug)]
struct DirState {
    /// Owner, times and dirty flag.
    attrs: InodeAttrs,
    /// Entries keyed by insertion sequence (enumeration order).
    entries: BTreeMap<u64, DirEntry>,
    /// Name → sequence index for lookups.
    by_name: HashMap<Vec<u8>, u64>,
    /// Sequence number for the next insertion.
    next_seq: u64,
    /// Detached from the namespace; refuses new entries.
    retired: bool,
}

/// Directory inode.
///
/// Entries are kept in insertion order and indexed by name. Sequence
/// numbers are never reused, so they double as stable readdir positions.
#[derive(Debug)]
pub struct INodeDir {
    /// Inode ID.
    id: InodeId,
    /// Parent directory inode ID (self until linked).
    parent_id: AtomicU64,
    /// Reference counts.
    refs: InodeRefs,
    /// Contents under the per-directory lock.
    state: RwLock<DirState>,
}

impl INodeDir {
    /// Create a new, empty directory inode.
    ///
    /// # Arguments
    /// * `id` - Inode ID
    /// * `owner` - Owner and mode bits
    /// * `now` - Creation time
    pub fn new(id: InodeId, owner: OwnerInfo, now: SystemTime) -> Self {
        Self {
            id,
            parent_id: AtomicU64::new(id),
            refs: InodeRefs::held(),
            state: RwLock::new(DirState {
                attrs: InodeAttrs::new(owner, now),
                entries: BTreeMap::new(),
                by_name: HashMap::new(),
                next_seq: 0,
                retired: false,
            }),
        }
    }

    /// Get the parent directory inode ID.
    pub fn parent_id(&self) -> InodeId {
        self.parent_id.load(Ordering::Acquire)
    }

    pub(crate) fn set_parent(&self, parent: InodeId) {
        self.parent_id.store(parent, Ordering::Release);
    }

    /// Get the number of children.
    pub fn child_count(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Check if the directory has been removed from the namespace.
    pub fn is_retired(&self) -> bool {
        self.state.read().retired
    }

    /// Remove a named entry after `check` approves it.
    ///
    /// The directory stays write-locked across the check and the removal,
    /// so the entry cannot be swapped for another one in between.
    ///
    /// # Arguments
    /// * `name` - Entry name
    /// * `now` - Current time
    /// * `check` - Veto hook run on the matching entry
    ///
    /// # Returns
    /// The removed entry, or None if no entry matches.
    pub fn unlink_if<F>(&self, name: &[u8], now: SystemTime, check: F) -> Result<Option<DirEntry>>
    where
        F: FnOnce(&DirEntry) -> Result<()>,
    {
        let mut state = self.state.write();
        let Some(&seq) = state.by_name.get(name) else {
            return Ok(None);
        };
        if let Some(entry) = state.entries.get(&seq) {
            check(entry)?;
        }
        state.by_name.remove(name);
        let removed: Option<DirEntry> = state.entries.remove(&seq);
        state.attrs.times.modified(now);
        state.attrs.dirty = true;
        Ok(removed)
    }

    /// Detach the directory so that it accepts no further entries.
    ///
    /// # Returns
    /// `DirectoryNotEmpty` if it still holds entries.
    pub(crate) fn retire_if_empty(&self) -> Result<()> {
        let mut state = self.state.write();
        if !state.entries.is_empty() {
            return Err(MemFsError::DirectoryNotEmpty(self.id));
        }
        state.retired = true;
        Ok(())
    }
}

impl INode for INodeDir {
    fn id(&self) -> InodeId {
        self.id
    }

    fn kind(&self) -> InodeKind {
        InodeKind::Directory
    }

    fn refs(&self) -> &InodeRefs {
        &self.refs
    }

    fn stat(&self) -> Stat {
        let state = self.state.read();
        Stat {
            ino: self.id,
            kind: InodeKind::Directory,
            size: 0,
            pages: 0,
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
        self.state.write().attrs.dirty = false;
        0
    }

    fn resolve(&self, name: &[u8]) -> Result<Option<InodeId>> {
        let state = self.state.read();
        Ok(state
            .by_name
            .get(name)
            .and_then(|seq| state.entries.get(seq))
            .map(|entry| entry.ino))
    }

    fn create(&self, name: &[u8], child: InodeId, kind: InodeKind, now: SystemTime) -> Result<()> {
        let mut state = self.state.write();
        if state.retired {
            return Err(MemFsError::InvalidParent(self.id));
        }
        if state.by_name.contains_key(name) {
            return Err(MemFsError::collision(self.id, name));
        }

        let seq: u64 = state.next_seq;
        state.next_seq += 1;
        state.by_name.insert(name.to_vec(), seq);
        state.entries.insert(
            seq,
            DirEntry {
                name: name.to_vec(),
                ino: child,
                kind,
                seq,
            },
        );
        state.attrs.times.modified(now);
        state.attrs.dirty = true;
        Ok(())
    }

    fn unlink(&self, name: &[u8], now: SystemTime) -> Result<Option<DirEntry>> {
        self.unlink_if(name, now, |_| Ok(()))
    }

    fn list_children(&self, from_seq: u64, limit: usize) -> Result<Vec<DirEntry>> {
        let state = self.state.read();
        Ok(state
            .entries
            .range(from_seq..)
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir() -> INodeDir {
        INodeDir::new(1, OwnerInfo::default(), SystemTime::UNIX_EPOCH)
    }

    #[test]
    fn test_inode_dir_basic() {
        let dir: INodeDir = dir();
        assert_eq!(dir.id(), 1);
        assert_eq!(dir.parent_id(), 1);
        assert_eq!(dir.kind(), InodeKind::Directory);
        assert_eq!(dir.child_count(), 0);
        assert_eq!(dir.stat().size, 0);
    }

    #[test]
    fn test_inode_dir_children_in_insertion_order() {
        let dir: INodeDir = dir();
        let now: SystemTime = SystemTime::UNIX_EPOCH;

        dir.create(b"zeta", 2, InodeKind::RegularFile, now).unwrap();
        dir.create(b"alpha", 3, InodeKind::Directory, now).unwrap();

        assert_eq!(dir.resolve(b"zeta").unwrap(), Some(2));
        assert_eq!(dir.resolve(b"alpha").unwrap(), Some(3));
        assert_eq!(dir.resolve(b"nonexistent").unwrap(), None);

        let names: Vec<Vec<u8>> = dir
            .list_children(0, usize::MAX)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec![b"zeta".to_vec(), b"alpha".to_vec()]);
    }

    #[test]
    fn test_inode_dir_collision_leaves_entry() {
        let dir: INodeDir = dir();
        let now: SystemTime = SystemTime::UNIX_EPOCH;
        dir.create(b"x", 2, InodeKind::RegularFile, now).unwrap();

        let err: MemFsError = dir.create(b"x", 3, InodeKind::RegularFile, now).unwrap_err();
        assert!(matches!(err, MemFsError::NameCollision { parent: 1, .. }));
        assert_eq!(dir.resolve(b"x").unwrap(), Some(2));
        assert_eq!(dir.child_count(), 1);
    }

    #[test]
    fn test_inode_dir_unlink_keeps_sequence() {
        let dir: INodeDir = dir();
        let now: SystemTime = SystemTime::UNIX_EPOCH;
        dir.create(b"a", 2, InodeKind::RegularFile, now).unwrap();
        dir.create(b"b", 3, InodeKind::RegularFile, now).unwrap();

        let removed: DirEntry = dir.unlink(b"a", now).unwrap().unwrap();
        assert_eq!(removed.seq, 0);
        assert_eq!(dir.unlink(b"a", now).unwrap(), None);

        dir.create(b"a", 4, InodeKind::RegularFile, now).unwrap();
        let seqs: Vec<u64> = dir
            .list_children(0, usize::MAX)
            .unwrap()
            .iter()
            .map(|e| e.seq)
            .collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(dir.list_children(2, 10).unwrap()[0].ino, 4);
    }

    #[test]
    fn test_unlink_if_veto_keeps_entry() {
        let dir: INodeDir = dir();
        let now: SystemTime = SystemTime::UNIX_EPOCH;
        dir.create(b"sub", 5, InodeKind::Directory, now).unwrap();

        let err: MemFsError = dir
            .unlink_if(b"sub", now, |entry| Err(MemFsError::DirectoryNotEmpty(entry.ino)))
            .unwrap_err();
        assert!(matches!(err, MemFsError::DirectoryNotEmpty(5)));
        assert_eq!(dir.resolve(b"sub").unwrap(), Some(5));

        let removed: Option<DirEntry> = dir.unlink_if(b"sub", now, |_| Ok(())).unwrap();
        assert_eq!(removed.map(|e| e.ino), Some(5));
    }

    #[test]
    fn test_retired_dir_refuses_entries() {
        let dir: INodeDir = dir();
        let now: SystemTime = SystemTime::UNIX_EPOCH;
        dir.create(b"a", 2, InodeKind::RegularFile, now).unwrap();
        assert!(matches!(
            dir.retire_if_empty(),
            Err(MemFsError::DirectoryNotEmpty(1))
        ));

        dir.unlink(b"a", now).unwrap();
        dir.retire_if_empty().unwrap();
        assert!(dir.is_retired());
        assert!(matches!(
            dir.create(b"b", 3, InodeKind::RegularFile, now),
            Err(MemFsError::InvalidParent(1))
        ));
    }

    #[test]
    fn test_create_stamps_times() {
        let dir: INodeDir = dir();
        let later: SystemTime = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(3);
        dir.create(b"a", 2, InodeKind::RegularFile, later).unwrap();
        let stat: Stat = dir.stat();
        assert_eq!(stat.times.mtime, later);
        assert_eq!(stat.times.atime, SystemTime::UNIX_EPOCH);
        assert!(stat.dirty);
        dir.sync();
        assert!(!dir.stat().dirty);
    }
}
