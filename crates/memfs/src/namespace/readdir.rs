//! Resumable directory enumeration.
//!
//! Positions are stable cookies: 0 is `.`, 1 is `..` and a child inserted
//! with sequence number `s` sits at `s + 2`. Removing or adding entries never
//! shifts the position of the others, so a listing resumed from a returned
//! position neither repeats nor skips surviving entries.

use std::sync::Arc;

use super::graph::DirectoryGraph;
use crate::error::Result;
use crate::inode::{DirEntry, INode, INodeDir, InodeId, InodeKind};

/// Positions taken by the `.` and `..` entries.
pub const DOT_ENTRIES: u64 = 2;

/// One enumerated entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaddirEntry {
    /// Entry name.
    pub name: Vec<u8>,
    /// Target inode ID.
    pub ino: InodeId,
    /// Target inode type.
    pub kind: InodeKind,
    /// Position to resume from after this entry.
    pub next_position: u64,
}

impl ReaddirEntry {
    fn from_child(entry: DirEntry) -> Self {
        Self {
            next_position: entry.seq + DOT_ENTRIES + 1,
            name: entry.name,
            ino: entry.ino,
            kind: entry.kind,
        }
    }
}

/// Result of one enumeration call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaddirBatch {
    /// Entries in enumeration order.
    pub entries: Vec<ReaddirEntry>,
    /// Position to resume from; unchanged if the batch is empty.
    pub next_position: u64,
}

impl ReaddirBatch {
    /// Check if the enumeration reached the end.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in enumeration order.
    pub fn names(&self) -> Vec<&[u8]> {
        self.entries.iter().map(|e| e.name.as_slice()).collect()
    }
}

impl DirectoryGraph {
    /// Enumerate a directory starting at `position`.
    ///
    /// # Arguments
    /// * `dir` - Directory inode ID
    /// * `position` - Position returned by a previous call, or 0
    /// * `limit` - Maximum number of entries
    ///
    /// # Returns
    /// Up to `limit` entries and the position to resume from.
    pub fn list_from(&self, dir: InodeId, position: u64, limit: usize) -> Result<ReaddirBatch> {
        let node: Arc<dyn INode> = self.directory(dir)?;
        let mut entries: Vec<ReaddirEntry> = Vec::new();

        if position == 0 && entries.len() < limit {
            entries.push(ReaddirEntry {
                name: b".".to_vec(),
                ino: dir,
                kind: InodeKind::Directory,
                next_position: 1,
            });
        }
        if position <= 1 && entries.len() < limit {
            let parent: InodeId = node
                .as_any()
                .downcast_ref::<INodeDir>()
                .map_or(dir, INodeDir::parent_id);
            entries.push(ReaddirEntry {
                name: b"..".to_vec(),
                ino: parent,
                kind: InodeKind::Directory,
                next_position: DOT_ENTRIES,
            });
        }

        let remaining: usize = limit - entries.len();
        if remaining > 0 {
            let from_seq: u64 = position.saturating_sub(DOT_ENTRIES);
            entries.extend(
                node.list_children(from_seq, remaining)?
                    .into_iter()
                    .map(ReaddirEntry::from_child),
            );
        }

        let next_position: u64 = entries.last().map_or(position, |e| e.next_position);
        Ok(ReaddirBatch {
            entries,
            next_position,
        })
    }
}

/// Iteration state over one directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaddirCursor {
    /// Directory being enumerated.
    dir: InodeId,
    /// Position of the next entry.
    position: u64,
}

impl ReaddirCursor {
    /// Start at the beginning of a directory.
    pub fn new(dir: InodeId) -> Self {
        Self::at(dir, 0)
    }

    /// Resume at a previously returned position.
    pub fn at(dir: InodeId, position: u64) -> Self {
        Self { dir, position }
    }

    /// Directory being enumerated.
    pub fn dir(&self) -> InodeId {
        self.dir
    }

    /// Position of the next entry.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next batch and advance.
    ///
    /// # Arguments
    /// * `graph` - Namespace to read from
    /// * `limit` - Maximum number of entries
    pub fn read(&mut self, graph: &DirectoryGraph, limit: usize) -> Result<ReaddirBatch> {
        let batch: ReaddirBatch = graph.list_from(self.dir, self.position, limit)?;
        self.position = batch.next_position;
        Ok(batch)
    }
}
