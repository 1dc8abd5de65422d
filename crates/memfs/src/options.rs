//! Mount options.

use serde::Deserialize;

use crate::error::{MemFsError, Result};
use crate::inode::OwnerInfo;
use crate::memory_pool::{MemoryPoolConfig, DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};

/// Filesystem magic number reported by `superblock`.
pub const MEMFS_MAGIC: u64 = 0xabcd;

/// On-memory format version reported by `superblock`.
pub const MEMFS_VERSION: u32 = 1;

/// Default upper bound on the bytes a single read returns (1 MiB).
pub const DEFAULT_MAX_READ_SIZE: usize = 1024 * 1024;

/// Configuration for a MemFs mount.
///
/// Every field has a default, so a partial document deserializes:
///
/// ```
/// use memfs::MemFsOptions;
///
/// let options: MemFsOptions = MemFsOptions::default().with_page_size(8192);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemFsOptions {
    /// Page size in bytes. Power of two, at least `MIN_PAGE_SIZE`.
    pub page_size: usize,

    /// Memory budget for file content.
    pub memory: MemoryPoolConfig,

    /// Owner and mode of the root directory.
    pub root: OwnerInfo,

    /// Magic number reported by `superblock`.
    pub magic: u64,

    /// Most bytes a single `read` returns. Longer requests come back short.
    pub max_read_size: usize,
}

impl Default for MemFsOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            memory: MemoryPoolConfig::default(),
            root: OwnerInfo::default(),
            magic: MEMFS_MAGIC,
            max_read_size: DEFAULT_MAX_READ_SIZE,
        }
    }
}

impl MemFsOptions {
    /// Set the page size.
    ///
    /// # Arguments
    /// * `page_size` - Page size in bytes
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the memory budget.
    ///
    /// # Arguments
    /// * `max_size` - Budget in bytes
    pub fn with_max_memory(mut self, max_size: u64) -> Self {
        self.memory = MemoryPoolConfig::with_max_size(max_size);
        self
    }

    /// Set the owner of the root directory.
    ///
    /// # Arguments
    /// * `root` - Owner and mode bits
    pub fn with_root_owner(mut self, root: OwnerInfo) -> Self {
        self.root = root;
        self
    }

    /// Set the per-call read limit.
    ///
    /// # Arguments
    /// * `max_read_size` - Most bytes one read returns
    pub fn with_max_read_size(mut self, max_read_size: usize) -> Self {
        self.max_read_size = max_read_size;
        self
    }

    /// Check the options before mounting.
    ///
    /// # Returns
    /// `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if !self.page_size.is_power_of_two() || self.page_size < MIN_PAGE_SIZE {
            return Err(MemFsError::InvalidConfig(format!(
                "page_size must be a power of two of at least {MIN_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.memory.max_pages(self.page_size) == 0 {
            return Err(MemFsError::InvalidConfig(format!(
                "memory.max_size {} holds no page of {} bytes",
                self.memory.max_size, self.page_size
            )));
        }
        if self.max_read_size == 0 {
            return Err(MemFsError::InvalidConfig("max_read_size must be non-zero".to_string()));
        }
        Ok(())
    }
}
