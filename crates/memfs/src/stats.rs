//! Statistics and superblock parameters.
//!
//! Provides the snapshot returned by `statfs` and the collector that builds
//! it from a live inode table.

use std::sync::Arc;
use std::time::Instant;

use crate::inode::InodeTable;
use crate::memory_pool::MemoryPoolStats;
use crate::namespace::MAX_NAME_LEN;
use crate::options::MEMFS_VERSION;

/// Parameters a host needs to describe the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperblockParams {
    /// Page size in bytes.
    pub page_size: usize,
    /// log2 of `page_size`.
    pub page_shift: u32,
    /// Filesystem magic number.
    pub magic: u64,
    /// Format version.
    pub version: u32,
    /// Longest entry name in bytes.
    pub max_name_len: usize,
}

impl SuperblockParams {
    /// Build parameters for a page size and magic number.
    ///
    /// # Arguments
    /// * `page_size` - Page size in bytes (power of two)
    /// * `magic` - Filesystem magic number
    pub fn new(page_size: usize, magic: u64) -> Self {
        Self {
            page_size,
            page_shift: page_size.trailing_zeros(),
            magic,
            version: MEMFS_VERSION,
            max_name_len: MAX_NAME_LEN,
        }
    }
}

/// Point-in-time statistics of a mount.
#[derive(Debug, Clone, Default)]
pub struct FsStats {
    /// Number of live inodes (root included).
    pub inode_count: usize,
    /// Inodes freed since mount.
    pub freed_inodes: u64,
    /// Page size in bytes.
    pub page_size: usize,
    /// Filesystem magic number.
    pub magic: u64,
    /// Memory pool statistics, if the allocator reports them.
    pub pool_stats: Option<MemoryPoolStats>,
    /// Time since mount.
    pub uptime_secs: u64,
}

impl FsStats {
    /// Pages still available under the budget, if known.
    pub fn free_pages(&self) -> Option<usize> {
        self.pool_stats
            .map(|s| s.max_pages.saturating_sub(s.in_use_pages))
    }
}

/// Collects statistics from a mount.
///
/// Thread-safe and cloneable for use from background stats threads.
#[derive(Debug, Clone)]
pub struct FsStatsCollector {
    /// Inode table reference.
    table: Arc<InodeTable>,
    /// Filesystem magic number.
    magic: u64,
    /// Mount time.
    start_time: Instant,
}

impl FsStatsCollector {
    /// Create a new stats collector.
    ///
    /// # Arguments
    /// * `table` - Inode table of the mount
    /// * `magic` - Filesystem magic number
    /// * `start_time` - When the mount was created
    pub fn new(table: Arc<InodeTable>, magic: u64, start_time: Instant) -> Self {
        Self {
            table,
            magic,
            start_time,
        }
    }

    /// Collect current statistics.
    pub fn collect(&self) -> FsStats {
        let allocator = self.table.allocator();
        FsStats {
            inode_count: self.table.inode_count(),
            freed_inodes: self.table.freed_count(),
            page_size: allocator.page_size(),
            magic: self.magic,
            pool_stats: allocator.usage(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::clock::ManualClock;
    use crate::inode::{InodeKind, OwnerInfo};
    use crate::memory_pool::{MemoryPool, MemoryPoolConfig};

    #[test]
    fn test_superblock_params() {
        let params: SuperblockParams = SuperblockParams::new(4096, 0xabcd);
        assert_eq!(params.page_shift, 12);
        assert_eq!(params.magic, 0xabcd);
        assert_eq!(params.max_name_len, 255);
        assert_eq!(params.version, MEMFS_VERSION);
    }

    #[test]
    fn test_collect_reports_pool_usage() {
        let table: Arc<InodeTable> = Arc::new(InodeTable::new(
            Arc::new(MemoryPool::new(512, MemoryPoolConfig::with_max_size(8 * 512))),
            Arc::new(ManualClock::new(Duration::ZERO)),
        ));
        let id = table.allocate(InodeKind::RegularFile, OwnerInfo::default());
        table
            .get(id)
            .unwrap()
            .write_at(0, &[9u8; 600], table.clock())
            .unwrap();

        let stats: FsStats = FsStatsCollector::new(table, 0xabcd, Instant::now()).collect();
        assert_eq!(stats.inode_count, 1);
        assert_eq!(stats.page_size, 512);
        assert_eq!(stats.magic, 0xabcd);
        let pool: MemoryPoolStats = stats.pool_stats.unwrap();
        assert_eq!(pool.in_use_pages, 2);
        assert_eq!(stats.free_pages(), Some(6));
    }
}
