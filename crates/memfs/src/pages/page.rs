//! A single resident page of file content.

/// One fixed-size block of file content.
///
/// A page that has never been written is not resident at all; the store
/// reports it as zeros. A resident page always holds exactly one page frame.
#[derive(Debug)]
pub struct Page {
    /// Page frame obtained from the allocator.
    data: Box<[u8]>,
    /// Modified since the last writeback.
    dirty: bool,
    /// Bytes are authoritative.
    uptodate: bool,
}

impl Page {
    /// Wrap a freshly allocated, zero-filled frame.
    ///
    /// The page starts clean and not up to date until a write commits into it.
    pub(crate) fn from_frame(data: Box<[u8]>) -> Self {
        Self {
            data,
            dirty: false,
            uptodate: false,
        }
    }

    /// Page contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Check if the page has unflushed modifications.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Check if the page contents are authoritative.
    pub fn is_uptodate(&self) -> bool {
        self.uptodate
    }

    /// Copy `src` into the page at `offset` and flag it dirty and up to date.
    ///
    /// # Arguments
    /// * `offset` - Byte offset within the page
    /// * `src` - Bytes to copy; must fit within the page
    pub(crate) fn fill(&mut self, offset: usize, src: &[u8]) {
        self.data[offset..offset + src.len()].copy_from_slice(src);
        self.dirty = true;
        self.uptodate = true;
    }

    /// Clear the dirty flag.
    ///
    /// # Returns
    /// true if the page was dirty.
    pub(crate) fn mark_clean(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// Give the frame back for release to the allocator.
    pub(crate) fn into_frame(self) -> Box<[u8]> {
        self.data
    }
}
