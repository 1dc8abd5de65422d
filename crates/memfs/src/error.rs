//! Error types for the memfs crate.

use thiserror::Error;

use crate::inode::InodeId;
use crate::memory_pool::MemoryPoolError;
use crate::write::TxState;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, MemFsError>;

/// Errors that can occur during filesystem operations.
///
/// Every variant is scoped to the single failing call: no operation leaves
/// partial state behind when it returns one of these.
#[derive(Debug, Error)]
pub enum MemFsError {
    /// The page provider could not supply a page frame.
    #[error("Out of memory: {0}")]
    OutOfMemory(#[from] MemoryPoolError),

    /// An entry with the same name already exists in the directory.
    #[error("Name collision in directory {parent}: {name}")]
    NameCollision {
        /// Parent directory inode ID.
        parent: InodeId,
        /// Colliding entry name (lossy UTF-8).
        name: String,
    },

    /// The target is unknown or is not a directory.
    #[error("Invalid parent: {0}")]
    InvalidParent(InodeId),

    /// The inode already has a directory entry, or is the root.
    #[error("Inode already linked: {0}")]
    AlreadyLinked(InodeId),

    /// Inode not found.
    #[error("Inode not found: {0}")]
    InodeNotFound(InodeId),

    /// File I/O was attempted on something that is not a regular file.
    #[error("Not a file: {0}")]
    NotAFile(InodeId),

    /// The entry name is empty, reserved, too long or contains a separator.
    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),

    /// A directory still holds entries and cannot be removed.
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(InodeId),

    /// The byte range end does not fit in a 64-bit offset.
    #[error("Offset overflow: offset {offset} + length {length}")]
    OffsetOverflow {
        /// Requested start offset.
        offset: u64,
        /// Requested length in bytes.
        length: u64,
    },

    /// A handle was released more times than it was acquired.
    #[error("Stale handle: {0}")]
    StaleHandle(InodeId),

    /// A write transaction step was called out of order.
    #[error("Write transaction in state {0:?}")]
    TransactionState(TxState),

    /// Mount options failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MemFsError {
    /// Build a name collision error from a raw entry name.
    ///
    /// # Arguments
    /// * `parent` - Directory the insertion targeted
    /// * `name` - Raw entry name
    pub(crate) fn collision(parent: InodeId, name: &[u8]) -> Self {
        MemFsError::NameCollision {
            parent,
            name: String::from_utf8_lossy(name).into_owned(),
        }
    }

    /// Check if this error is an out-of-memory condition.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, MemFsError::OutOfMemory(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_display_is_lossy() {
        let err: MemFsError = MemFsError::collision(1, b"a\xffb");
        assert_eq!(err.to_string(), "Name collision in directory 1: a\u{fffd}b");
    }

    #[test]
    fn test_out_of_memory_from_pool_error() {
        let err: MemFsError = MemoryPoolError::PoolExhausted {
            in_use_pages: 4,
            max_pages: 4,
        }
        .into();
        assert!(err.is_out_of_memory());
        assert!(err.to_string().contains("4 of 4 pages"));
    }
}
