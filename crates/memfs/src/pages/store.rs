//! Per-file sparse page store.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::memory_pool::{MemoryPoolError, PageAllocator};

use super::page::Page;

/// Compute the file size after a write.
///
/// Size only grows on a write, never shrinks.
///
/// # Arguments
/// * `offset` - Start of the written range
/// * `length` - Number of bytes written
/// * `current_size` - Size before the write
///
/// # Returns
/// `max(current_size, offset + length)`, saturating at `u64::MAX`.
pub fn size_after_write(offset: u64, length: u64, current_size: u64) -> u64 {
    current_size.max(offset.saturating_add(length))
}

/// Inclusive range of page indices touched by a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    /// First touched page index.
    pub first: u64,
    /// Last touched page index.
    pub last: u64,
}

impl PageSpan {
    /// Iterate over the page indices.
    pub fn indices(&self) -> impl Iterator<Item = u64> {
        self.first..=self.last
    }
}

/// Page frames acquired for a write but not yet installed.
///
/// Dropping the set returns every frame to the allocator, which is how an
/// aborted write leaves no trace.
pub struct StagedPages {
    /// (page index, zero-filled frame) pairs.
    frames: Vec<(u64, Box<[u8]>)>,
    /// Allocator the frames came from.
    allocator: Arc<dyn PageAllocator>,
}

impl StagedPages {
    fn new(allocator: Arc<dyn PageAllocator>) -> Self {
        Self {
            frames: Vec::new(),
            allocator,
        }
    }

    /// Number of staged frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if nothing had to be allocated.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Page indices that will become resident on install.
    pub fn indices(&self) -> Vec<u64> {
        self.frames.iter().map(|(index, _)| *index).collect()
    }
}

impl Drop for StagedPages {
    fn drop(&mut self) {
        for (index, frame) in self.frames.drain(..) {
            tracing::trace!(index, "releasing staged page frame");
            self.allocator.free_page(frame);
        }
    }
}

impl fmt::Debug for StagedPages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedPages")
            .field("indices", &self.indices())
            .finish()
    }
}

/// Growable, sparse sequence of pages holding one file's content.
///
/// Pages are addressed by zero-based index (`offset / page_size`) and are
/// allocated lazily on first write. Indices that were never written read
/// as zeros without occupying memory.
pub struct PageStore {
    /// Frame source; frames go back here when the store is dropped.
    allocator: Arc<dyn PageAllocator>,
    /// Page size in bytes (power of two).
    page_size: usize,
    /// log2(page_size).
    page_shift: u32,
    /// Resident pages by index.
    pages: BTreeMap<u64, Page>,
}

impl PageStore {
    /// Create an empty store.
    ///
    /// # Arguments
    /// * `allocator` - Frame source shared with the rest of the mount
    pub fn new(allocator: Arc<dyn PageAllocator>) -> Self {
        let page_size: usize = allocator.page_size();
        debug_assert!(page_size.is_power_of_two());
        Self {
            allocator,
            page_size,
            page_shift: page_size.trailing_zeros(),
            pages: BTreeMap::new(),
        }
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Page index holding a byte offset.
    pub fn page_index(&self, offset: u64) -> u64 {
        offset >> self.page_shift
    }

    /// Byte position of an offset within its page.
    fn page_offset(&self, offset: u64) -> usize {
        (offset & (self.page_size as u64 - 1)) as usize
    }

    /// Pages touched by a byte range.
    ///
    /// # Arguments
    /// * `offset` - Start of the range
    /// * `length` - Length of the range
    ///
    /// # Returns
    /// None for an empty range.
    pub fn span(&self, offset: u64, length: u64) -> Option<PageSpan> {
        if length == 0 {
            return None;
        }
        let end: u64 = offset.saturating_add(length - 1);
        Some(PageSpan {
            first: self.page_index(offset),
            last: self.page_index(end),
        })
    }

    /// Get a resident page.
    pub fn page(&self, index: u64) -> Option<&Page> {
        self.pages.get(&index)
    }

    /// Number of resident pages.
    pub fn resident_pages(&self) -> usize {
        self.pages.len()
    }

    /// Number of resident pages with unflushed modifications.
    pub fn dirty_pages(&self) -> usize {
        self.pages.values().filter(|p| p.is_dirty()).count()
    }

    /// Highest resident page index.
    pub fn last_index(&self) -> Option<u64> {
        self.pages.keys().next_back().copied()
    }

    /// Read one page.
    ///
    /// # Arguments
    /// * `index` - Page index
    ///
    /// # Returns
    /// The stored bytes, or a zero page if the index was never written.
    pub fn read_page(&self, index: u64) -> Cow<'_, [u8]> {
        match self.pages.get(&index) {
            Some(page) => Cow::Borrowed(page.data()),
            None => Cow::Owned(vec![0u8; self.page_size]),
        }
    }

    /// Copy bytes starting at `offset` into `dst`, filling holes with zeros.
    ///
    /// # Arguments
    /// * `offset` - Start offset
    /// * `dst` - Destination; filled completely
    pub fn read_into(&self, offset: u64, dst: &mut [u8]) {
        let mut done: usize = 0;
        let mut pos: u64 = offset;
        while done < dst.len() {
            let index: u64 = self.page_index(pos);
            let in_page: usize = self.page_offset(pos);
            let n: usize = (self.page_size - in_page).min(dst.len() - done);
            let out: &mut [u8] = &mut dst[done..done + n];
            match self.pages.get(&index) {
                Some(page) => out.copy_from_slice(&page.data()[in_page..in_page + n]),
                None => out.fill(0),
            }
            done += n;
            pos += n as u64;
        }
    }

    /// Acquire frames for every page in `span` that is not yet resident.
    ///
    /// Either all missing frames are acquired or none are kept: on failure
    /// the frames obtained so far go straight back to the allocator.
    ///
    /// # Arguments
    /// * `span` - Pages the upcoming write touches
    pub fn stage(&self, span: PageSpan) -> Result<StagedPages, MemoryPoolError> {
        let mut staged: StagedPages = StagedPages::new(self.allocator.clone());
        for index in span.indices() {
            if self.pages.contains_key(&index) {
                continue;
            }
            let frame: Box<[u8]> = self.allocator.allocate_page()?;
            tracing::trace!(index, "staged page frame");
            staged.frames.push((index, frame));
        }
        Ok(staged)
    }

    /// Install staged frames and copy `bytes` in at `offset`.
    ///
    /// Cannot fail: every page the range touches is resident once the
    /// staged frames are installed. Partially covered fresh pages keep zeros
    /// outside the written sub-range.
    ///
    /// # Returns
    /// Number of bytes copied (always `bytes.len()`).
    pub fn commit_staged(&mut self, mut staged: StagedPages, offset: u64, bytes: &[u8]) -> usize {
        for (index, frame) in staged.frames.drain(..) {
            self.pages.insert(index, Page::from_frame(frame));
        }

        let mut written: usize = 0;
        let mut pos: u64 = offset;
        while written < bytes.len() {
            let index: u64 = self.page_index(pos);
            let in_page: usize = self.page_offset(pos);
            let n: usize = (self.page_size - in_page).min(bytes.len() - written);
            let Some(page) = self.pages.get_mut(&index) else {
                tracing::error!(index, "page missing after staging");
                break;
            };
            page.fill(in_page, &bytes[written..written + n]);
            written += n;
            pos += n as u64;
        }
        written
    }

    /// Write a byte range, allocating pages on first touch.
    ///
    /// # Arguments
    /// * `offset` - Start offset
    /// * `bytes` - Data to write
    ///
    /// # Returns
    /// Number of bytes accepted (always all of `bytes`), or the allocator
    /// error with the store unchanged.
    pub fn write_range(&mut self, offset: u64, bytes: &[u8]) -> Result<usize, MemoryPoolError> {
        let Some(span) = self.span(offset, bytes.len() as u64) else {
            return Ok(0);
        };
        let staged: StagedPages = self.stage(span)?;
        Ok(self.commit_staged(staged, offset, bytes))
    }

    /// Clear every dirty flag.
    ///
    /// # Returns
    /// Number of pages that were dirty.
    pub fn clean(&mut self) -> usize {
        self.pages.values_mut().map(Page::mark_clean).filter(|&was| was).count()
    }
}

impl Drop for PageStore {
    fn drop(&mut self) {
        for (_, page) in std::mem::take(&mut self.pages) {
            self.allocator.free_page(page.into_frame());
        }
    }
}

impl fmt::Debug for PageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageStore")
            .field("page_size", &self.page_size)
            .field("resident", &self.pages.len())
            .field("dirty", &self.dirty_pages())
            .finish()
    }
}
