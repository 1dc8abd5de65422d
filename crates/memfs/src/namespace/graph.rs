//! Parent/child namespace edges.

use std::sync::Arc;

use crate::error::{MemFsError, Result};
use crate::inode::{DirEntry, INode, INodeDir, InodeId, InodeKind, InodeTable, OwnerInfo, ROOT_INODE};

/// Longest accepted entry name in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Validate an entry name.
///
/// # Arguments
/// * `name` - Candidate name
///
/// # Returns
/// `InvalidName` if the name is empty, `.` or `..`, longer than
/// `MAX_NAME_LEN`, or contains `/` or NUL.
pub fn validate_name(name: &[u8]) -> Result<()> {
    let invalid = || MemFsError::InvalidName(String::from_utf8_lossy(name).into_owned());
    if name.is_empty() || name == b"." || name == b".." {
        return Err(invalid());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid());
    }
    if name.iter().any(|&b| b == b'/' || b == 0) {
        return Err(invalid());
    }
    Ok(())
}

/// The directory graph: named edges from directories to inodes.
///
/// Holds no inode records of its own. Every edge is an identity looked up in
/// the [`InodeTable`], which stays the sole owner.
#[derive(Debug, Clone)]
pub struct DirectoryGraph {
    /// Table owning every record.
    table: Arc<InodeTable>,
}

impl DirectoryGraph {
    /// Create a graph over a table.
    ///
    /// # Arguments
    /// * `table` - Inode table
    pub fn new(table: Arc<InodeTable>) -> Self {
        Self { table }
    }

    /// Underlying inode table.
    pub fn table(&self) -> &Arc<InodeTable> {
        &self.table
    }

    /// Resolve an identity that must be a live directory.
    pub(crate) fn directory(&self, id: InodeId) -> Result<Arc<dyn INode>> {
        match self.table.get(id) {
            Some(node) if node.kind() == InodeKind::Directory => Ok(node),
            _ => Err(MemFsError::InvalidParent(id)),
        }
    }

    /// Look up a child by name.
    ///
    /// # Arguments
    /// * `parent` - Directory inode ID
    /// * `name` - Entry name
    ///
    /// # Returns
    /// The child ID, or None if no entry matches. `InvalidParent` if
    /// `parent` is unknown or not a directory.
    pub fn lookup(&self, parent: InodeId, name: &[u8]) -> Result<Option<InodeId>> {
        self.directory(parent)?.resolve(name)
    }

    /// Add an edge `parent/name → child`.
    ///
    /// The child must not be named by any entry yet: the graph is a tree,
    /// so hard links, the root as a child and edges out of a detached
    /// directory are all refused. A handle on the child is held for the
    /// whole call, so it cannot be freed while the edge is being added.
    ///
    /// # Arguments
    /// * `parent` - Directory inode ID
    /// * `name` - Entry name
    /// * `child` - Live inode ID
    ///
    /// # Returns
    /// `AlreadyLinked` if the child is the root or already has an entry,
    /// `InvalidParent` if `parent` is the child itself or is not a linked
    /// directory, `InodeNotFound` if the child is gone or was removed.
    pub fn insert(&self, parent: InodeId, name: &[u8], child: InodeId) -> Result<()> {
        validate_name(name)?;
        if child == ROOT_INODE {
            return Err(MemFsError::AlreadyLinked(child));
        }
        if child == parent {
            return Err(MemFsError::InvalidParent(parent));
        }
        let dir: Arc<dyn INode> = self.directory(parent)?;
        if dir.refs().links() == 0 {
            return Err(MemFsError::InvalidParent(parent));
        }

        let node: Arc<dyn INode> = self.table.acquire(child)?;
        let linked: Result<()> = self.attach(dir.as_ref(), parent, name, node.as_ref());
        drop(node);
        self.table.release(child)?;
        linked
    }

    /// Claim the child's first link and publish the entry.
    fn attach(&self, dir: &dyn INode, parent: InodeId, name: &[u8], node: &dyn INode) -> Result<()> {
        let child: InodeId = node.id();
        // Counted before the edge becomes visible so that a racing remove
        // never drives the count below the number of entries.
        if !node.refs().link_first() {
            return Err(MemFsError::AlreadyLinked(child));
        }
        let subdir: Option<&INodeDir> = node.as_any().downcast_ref::<INodeDir>();
        if subdir.is_some_and(|d| d.is_retired()) {
            node.refs().unlink();
            return Err(MemFsError::InodeNotFound(child));
        }

        if let Err(e) = dir.create(name, child, node.kind(), self.table.clock().now()) {
            node.refs().unlink();
            return Err(e);
        }
        if let Some(subdir) = subdir {
            subdir.set_parent(parent);
        }
        Ok(())
    }

    /// Allocate a new inode and link it under `parent`.
    ///
    /// On failure the freshly allocated inode is released and freed.
    ///
    /// # Arguments
    /// * `parent` - Directory inode ID
    /// * `name` - Entry name
    /// * `kind` - Kind of the new inode
    /// * `owner` - Owner and mode bits
    ///
    /// # Returns
    /// The new inode ID.
    pub fn create(&self, parent: InodeId, name: &[u8], kind: InodeKind, owner: OwnerInfo) -> Result<InodeId> {
        validate_name(name)?;
        self.directory(parent)?;

        let child: InodeId = self.table.allocate(kind, owner);
        let linked: Result<()> = self.insert(parent, name, child);
        self.table.release(child)?;
        linked?;

        tracing::debug!(parent, ino = child, ?kind, name = %String::from_utf8_lossy(name), "entry created");
        Ok(child)
    }

    /// Remove the edge `parent/name`.
    ///
    /// Directories must be empty. The target is freed once no handle holds
    /// it.
    ///
    /// # Returns
    /// The ID the entry pointed to, or None if no entry matches.
    pub fn remove(&self, parent: InodeId, name: &[u8]) -> Result<Option<InodeId>> {
        validate_name(name)?;
        let dir_node: Arc<dyn INode> = self.directory(parent)?;
        let Some(dir) = dir_node.as_any().downcast_ref::<INodeDir>() else {
            return Err(MemFsError::InvalidParent(parent));
        };

        let now = self.table.clock().now();
        let removed: Option<DirEntry> = dir.unlink_if(name, now, |entry| {
            if entry.kind != InodeKind::Directory {
                return Ok(());
            }
            match self.table.get(entry.ino) {
                Some(child) => match child.as_any().downcast_ref::<INodeDir>() {
                    Some(subdir) => subdir.retire_if_empty(),
                    None => Ok(()),
                },
                None => Ok(()),
            }
        })?;
        let Some(entry) = removed else {
            return Ok(None);
        };

        if let Some(child) = self.table.get(entry.ino) {
            child.refs().unlink();
        }
        let freed: bool = self.table.forget_if_unreferenced(entry.ino);
        tracing::debug!(parent, ino = entry.ino, freed, name = %entry.name_lossy(), "entry removed");
        Ok(Some(entry.ino))
    }

    /// Enumerate a directory's children in insertion order.
    ///
    /// # Arguments
    /// * `parent` - Directory inode ID
    ///
    /// # Returns
    /// (name, inode ID) pairs.
    pub fn children_ordered(&self, parent: InodeId) -> Result<Vec<(Vec<u8>, InodeId)>> {
        Ok(self
            .directory(parent)?
            .list_children(0, usize::MAX)?
            .into_iter()
            .map(|entry| (entry.name, entry.ino))
            .collect())
    }

    /// Enumerate full entries starting at an insertion sequence number.
    ///
    /// # Arguments
    /// * `parent` - Directory inode ID
    /// * `from_seq` - Smallest sequence number to include
    /// * `limit` - Maximum number of entries
    pub fn entries(&self, parent: InodeId, from_seq: u64, limit: usize) -> Result<Vec<DirEntry>> {
        self.directory(parent)?.list_children(from_seq, limit)
    }
}
