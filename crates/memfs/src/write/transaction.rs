//! Begin/commit protocol for a single write call.
//!
//! # State machine
//!
//! ```text
//! Idle ──begin()──▶ Begun ──commit()──▶ Committed
//!   │                 │
//!   └── page refused ─┴── dropped ──────▶ Aborted
//! ```
//!
//! `begin` acquires a frame for every page the range touches that is not
//! yet resident. Nothing in the file changes until `commit`, which installs
//! the frames, copies the bytes, flags the pages dirty and up to date, grows
//! the size and stamps the times in one step. The caller holds the file's
//! write lock for the whole span, so other writers of the same inode see
//! either none or all of the write.

use std::time::SystemTime;

use crate::error::{MemFsError, Result};
use crate::inode::{FileState, InodeId};
use crate::pages::{size_after_write, PageSpan, StagedPages};

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Created; no pages acquired yet.
    Idle,
    /// All needed pages acquired; file untouched.
    Begun,
    /// Changes applied. Terminal.
    Committed,
    /// Page acquisition failed; file untouched. Terminal.
    Aborted,
}

/// One write call's transaction against a locked file.
pub struct WriteTransaction<'a> {
    /// Target inode ID (for logging and errors).
    inode: InodeId,
    /// File state, borrowed under the inode's write lock.
    file: &'a mut FileState,
    /// Start offset.
    offset: u64,
    /// Bytes to write.
    bytes: &'a [u8],
    /// Pages the range touches (None for an empty write).
    span: Option<PageSpan>,
    /// Frames acquired in `begin`.
    staged: Option<StagedPages>,
    /// Current state.
    state: TxState,
}

impl<'a> WriteTransaction<'a> {
    /// Create an idle transaction.
    ///
    /// # Arguments
    /// * `inode` - Target inode ID
    /// * `file` - Locked file state
    /// * `offset` - Start offset
    /// * `bytes` - Data to write
    ///
    /// # Returns
    /// `OffsetOverflow` if the range end does not fit in 64 bits.
    pub fn new(inode: InodeId, file: &'a mut FileState, offset: u64, bytes: &'a [u8]) -> Result<Self> {
        let length: u64 = bytes.len() as u64;
        if offset.checked_add(length).is_none() {
            return Err(MemFsError::OffsetOverflow { offset, length });
        }
        let span: Option<PageSpan> = file.store.span(offset, length);
        Ok(Self {
            inode,
            file,
            offset,
            bytes,
            span,
            staged: None,
            state: TxState::Idle,
        })
    }

    /// Current state.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Pages the write touches.
    pub fn span(&self) -> Option<PageSpan> {
        self.span
    }

    /// Number of frames acquired for pages that were not yet resident.
    pub fn staged_pages(&self) -> usize {
        self.staged.as_ref().map_or(0, StagedPages::len)
    }

    /// Acquire every page the write touches.
    ///
    /// On failure the transaction is aborted and the file is untouched.
    pub fn begin(&mut self) -> Result<()> {
        if self.state != TxState::Idle {
            return Err(MemFsError::TransactionState(self.state));
        }
        if let Some(span) = self.span {
            match self.file.store.stage(span) {
                Ok(staged) => {
                    tracing::trace!(
                        ino = self.inode,
                        first = span.first,
                        last = span.last,
                        fresh = staged.len(),
                        "write transaction begun"
                    );
                    self.staged = Some(staged);
                }
                Err(e) => {
                    self.state = TxState::Aborted;
                    tracing::debug!(ino = self.inode, offset = self.offset, "write transaction aborted: {}", e);
                    return Err(e.into());
                }
            }
        }
        self.state = TxState::Begun;
        Ok(())
    }

    /// Apply the write.
    ///
    /// # Arguments
    /// * `now` - Modification time to stamp
    ///
    /// # Returns
    /// Number of bytes written.
    pub fn commit(mut self, now: SystemTime) -> Result<usize> {
        if self.state != TxState::Begun {
            return Err(MemFsError::TransactionState(self.state));
        }
        let copied: usize = match self.staged.take() {
            Some(staged) => self.file.store.commit_staged(staged, self.offset, self.bytes),
            None => 0,
        };
        if copied > 0 {
            self.file.size = size_after_write(self.offset, copied as u64, self.file.size);
            self.file.attrs.times.modified(now);
            self.file.attrs.dirty = true;
        }
        self.state = TxState::Committed;
        tracing::trace!(ino = self.inode, copied, size = self.file.size, "write committed");
        Ok(copied)
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if self.state == TxState::Begun {
            tracing::trace!(ino = self.inode, "write transaction dropped before commit");
            self.state = TxState::Aborted;
        }
    }
}
