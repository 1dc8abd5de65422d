//! The mounted filesystem context.

use std::sync::Arc;
use std::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::error::{MemFsError, Result};
use crate::inode::{INode, InodeId, InodeKind, InodeTable, OwnerInfo, Stat, ROOT_INODE};
use crate::memory_pool::{MemoryPool, PageAllocator};
use crate::namespace::{DirectoryGraph, ReaddirBatch};
use crate::options::MemFsOptions;
use crate::stats::{FsStats, FsStatsCollector, SuperblockParams};

/// One mounted in-memory filesystem.
///
/// Every operation goes through this context; independent mounts share no
/// state. All methods take `&self` and may be called from many threads.
#[derive(Debug)]
pub struct MemFs {
    /// Inode table owning every record.
    table: Arc<InodeTable>,
    /// Namespace over the table.
    graph: DirectoryGraph,
    /// Root directory inode ID.
    root: InodeId,
    /// Mount options.
    options: MemFsOptions,
    /// Mount time.
    start_time: Instant,
}

impl MemFs {
    /// Mount with the system clock and a budgeted memory pool.
    ///
    /// # Arguments
    /// * `options` - Mount options
    pub fn mount(options: MemFsOptions) -> Result<Self> {
        options.validate()?;
        let pool: Arc<MemoryPool> = Arc::new(MemoryPool::new(options.page_size, options.memory.clone()));
        Self::mount_with(options, Arc::new(SystemClock::new()), pool)
    }

    /// Mount with host-supplied collaborators.
    ///
    /// # Arguments
    /// * `options` - Mount options
    /// * `clock` - Timestamp source
    /// * `allocator` - Page frame source; its page size must match `options`
    pub fn mount_with(
        options: MemFsOptions,
        clock: Arc<dyn Clock>,
        allocator: Arc<dyn PageAllocator>,
    ) -> Result<Self> {
        options.validate()?;
        if allocator.page_size() != options.page_size {
            return Err(MemFsError::InvalidConfig(format!(
                "allocator page size {} does not match page_size {}",
                allocator.page_size(),
                options.page_size
            )));
        }

        let table: Arc<InodeTable> = Arc::new(InodeTable::new(allocator, clock));
        // The mount keeps the handle it receives and counts one entry, so
        // the root is never freed.
        let root: Arc<dyn INode> = table.get_or_create(ROOT_INODE, InodeKind::Directory, options.root);
        root.refs().link();

        tracing::debug!(
            root = ROOT_INODE,
            page_size = options.page_size,
            max_size = options.memory.max_size,
            "memfs mounted"
        );

        Ok(Self {
            graph: DirectoryGraph::new(table.clone()),
            table,
            root: ROOT_INODE,
            options,
            start_time: Instant::now(),
        })
    }

    /// Root directory inode ID.
    pub fn root(&self) -> InodeId {
        self.root
    }

    /// Fixed parameters of the mount.
    pub fn superblock(&self) -> SuperblockParams {
        SuperblockParams::new(self.options.page_size, self.options.magic)
    }

    /// Mount options.
    pub fn options(&self) -> &MemFsOptions {
        &self.options
    }

    /// Inode table of the mount.
    pub fn table(&self) -> &Arc<InodeTable> {
        &self.table
    }

    /// Namespace of the mount.
    pub fn graph(&self) -> &DirectoryGraph {
        &self.graph
    }

    fn inode(&self, id: InodeId) -> Result<Arc<dyn INode>> {
        self.table.get(id).ok_or(MemFsError::InodeNotFound(id))
    }

    /// Look up a name in a directory.
    ///
    /// # Returns
    /// The child ID, or None if no entry matches.
    pub fn lookup(&self, parent: InodeId, name: &[u8]) -> Result<Option<InodeId>> {
        self.graph.lookup(parent, name)
    }

    /// Create a file or directory.
    ///
    /// # Arguments
    /// * `parent` - Directory inode ID
    /// * `name` - Entry name
    /// * `kind` - Kind of the new inode
    /// * `owner` - Owner and mode bits, stored verbatim
    pub fn create(&self, parent: InodeId, name: &[u8], kind: InodeKind, owner: OwnerInfo) -> Result<InodeId> {
        self.graph.create(parent, name, kind, owner)
    }

    /// Remove a directory entry.
    ///
    /// # Returns
    /// The ID the entry pointed to, or None if no entry matches.
    pub fn remove(&self, parent: InodeId, name: &[u8]) -> Result<Option<InodeId>> {
        self.graph.remove(parent, name)
    }

    /// Read from a regular file.
    ///
    /// # Arguments
    /// * `id` - File inode ID
    /// * `offset` - Start offset
    /// * `length` - Maximum bytes to return, capped at `max_read_size`
    ///
    /// # Returns
    /// The bytes in `[offset, min(offset + length, size))`. Requests past
    /// the read limit come back short; callers continue from the new offset.
    pub fn read(&self, id: InodeId, offset: u64, length: usize) -> Result<Vec<u8>> {
        let length: usize = length.min(self.options.max_read_size);
        self.inode(id)?.read_at(offset, length)
    }

    /// Write to a regular file.
    ///
    /// # Returns
    /// Number of bytes written (always all of `bytes`).
    pub fn write(&self, id: InodeId, offset: u64, bytes: &[u8]) -> Result<usize> {
        self.inode(id)?.write_at(offset, bytes, self.table.clock())
    }

    /// List a directory from `position` to the end.
    pub fn list_dir(&self, id: InodeId, position: u64) -> Result<ReaddirBatch> {
        self.graph.list_from(id, position, usize::MAX)
    }

    /// List at most `max_entries` entries of a directory from `position`.
    pub fn list_dir_limited(&self, id: InodeId, position: u64, max_entries: usize) -> Result<ReaddirBatch> {
        self.graph.list_from(id, position, max_entries)
    }

    /// Attribute snapshot.
    pub fn stat(&self, id: InodeId) -> Result<Stat> {
        Ok(self.inode(id)?.stat())
    }

    /// Replace owner and mode bits.
    pub fn set_owner(&self, id: InodeId, owner: OwnerInfo) -> Result<()> {
        self.inode(id)?.set_owner(owner, self.table.clock().now());
        Ok(())
    }

    /// Take a handle; the inode stays alive until the matching `release`.
    pub fn open(&self, id: InodeId) -> Result<()> {
        self.table.acquire(id).map(|_| ())
    }

    /// Drop a handle.
    ///
    /// # Returns
    /// true if the inode was freed.
    pub fn release(&self, id: InodeId) -> Result<bool> {
        self.table.release(id)
    }

    /// Clear dirty flags of an inode.
    ///
    /// # Returns
    /// Number of pages that were dirty.
    pub fn sync(&self, id: InodeId) -> Result<usize> {
        let cleaned: usize = self.inode(id)?.sync();
        tracing::trace!(ino = id, cleaned, "inode synced");
        Ok(cleaned)
    }

    /// Get a stats collector that can be used from another thread.
    pub fn stats_collector(&self) -> FsStatsCollector {
        FsStatsCollector::new(self.table.clone(), self.options.magic, self.start_time)
    }

    /// Current statistics.
    pub fn statfs(&self) -> FsStats {
        self.stats_collector().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    use crate::clock::ManualClock;
    use crate::inode::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
    use crate::memory_pool::MemoryPoolConfig;

    fn mount() -> (MemFs, Arc<ManualClock>) {
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(Duration::from_secs(1_000)));
        let options: MemFsOptions = MemFsOptions::default().with_page_size(512);
        let pool: Arc<MemoryPool> = Arc::new(MemoryPool::new(512, MemoryPoolConfig::with_max_size(32 * 512)));
        let fs: MemFs = MemFs::mount_with(options, clock.clone(), pool).unwrap();
        (fs, clock)
    }

    fn file_owner() -> OwnerInfo {
        OwnerInfo::new(1000, 1000, DEFAULT_FILE_MODE)
    }

    #[test]
    fn test_mount_root() {
        let (fs, _) = mount();
        assert_eq!(fs.root(), ROOT_INODE);

        let stat: Stat = fs.stat(fs.root()).unwrap();
        assert_eq!(stat.kind, InodeKind::Directory);
        assert_eq!(stat.owner.mode, DEFAULT_DIR_MODE);
        assert_eq!(stat.size, 0);

        let sb: SuperblockParams = fs.superblock();
        assert_eq!(sb.page_size, 512);
        assert_eq!(sb.page_shift, 9);
        assert_eq!(sb.magic, 0xabcd);
    }

    #[test]
    fn test_mount_rejects_mismatched_allocator() {
        let pool: Arc<MemoryPool> = Arc::new(MemoryPool::with_defaults());
        let err: MemFsError = MemFs::mount_with(
            MemFsOptions::default().with_page_size(512),
            Arc::new(SystemClock::new()),
            pool,
        )
        .unwrap_err();
        assert!(matches!(err, MemFsError::InvalidConfig(_)));
    }

    #[test]
    fn test_mount_default_options() {
        let fs: MemFs = MemFs::mount(MemFsOptions::default()).unwrap();
        assert_eq!(fs.superblock().page_size, 4096);
        assert_eq!(fs.statfs().inode_count, 1);
    }

    #[test]
    fn test_root_cannot_be_released_away() {
        let (fs, _) = mount();
        assert!(!fs.release(fs.root()).unwrap());
        assert!(fs.stat(fs.root()).is_ok());
    }

    #[test]
    fn test_write_stamps_clock() {
        let (fs, clock) = mount();
        let id: InodeId = fs
            .create(fs.root(), b"f", InodeKind::RegularFile, file_owner())
            .unwrap();
        clock.advance(Duration::from_secs(5));
        fs.write(id, 0, b"data").unwrap();

        let stat: Stat = fs.stat(id).unwrap();
        let expected: SystemTime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_005);
        assert_eq!(stat.times.mtime, expected);
        assert_eq!(stat.times.ctime, expected);
        assert_eq!(stat.times.atime, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));
        assert_eq!(stat.owner, file_owner());
    }

    #[test]
    fn test_read_does_not_touch_atime() {
        let (fs, clock) = mount();
        let id: InodeId = fs
            .create(fs.root(), b"f", InodeKind::RegularFile, file_owner())
            .unwrap();
        fs.write(id, 0, b"data").unwrap();
        let before: Stat = fs.stat(id).unwrap();
        clock.advance(Duration::from_secs(60));
        fs.read(id, 0, 4).unwrap();
        assert_eq!(fs.stat(id).unwrap().times, before.times);
    }

    #[test]
    fn test_set_owner_and_sync() {
        let (fs, clock) = mount();
        let id: InodeId = fs
            .create(fs.root(), b"f", InodeKind::RegularFile, file_owner())
            .unwrap();
        fs.write(id, 0, &[1u8; 1024]).unwrap();
        clock.advance(Duration::from_secs(1));

        let owner: OwnerInfo = OwnerInfo::new(0, 0, DEFAULT_FILE_MODE);
        fs.set_owner(id, owner).unwrap();
        let stat: Stat = fs.stat(id).unwrap();
        assert_eq!(stat.owner, owner);
        assert!(stat.times.ctime > stat.times.mtime);

        assert_eq!(fs.sync(id).unwrap(), 2);
        assert!(!fs.stat(id).unwrap().dirty);
        assert_eq!(fs.sync(id).unwrap(), 0);
    }

    #[test]
    fn test_unknown_inode() {
        let (fs, _) = mount();
        assert!(matches!(fs.stat(77), Err(MemFsError::InodeNotFound(77))));
        assert!(matches!(fs.read(77, 0, 1), Err(MemFsError::InodeNotFound(77))));
        assert!(matches!(fs.write(77, 0, b"x"), Err(MemFsError::InodeNotFound(77))));
        assert!(matches!(fs.open(77), Err(MemFsError::InodeNotFound(77))));
        assert!(matches!(fs.list_dir(77, 0), Err(MemFsError::InvalidParent(77))));
    }

    #[test]
    fn test_file_io_on_directory() {
        let (fs, _) = mount();
        assert!(matches!(fs.read(fs.root(), 0, 1), Err(MemFsError::NotAFile(ROOT_INODE))));
        assert!(matches!(
            fs.write(fs.root(), 0, b"x"),
            Err(MemFsError::NotAFile(ROOT_INODE))
        ));
    }

    #[test]
    fn test_statfs_tracks_pages() {
        let (fs, _) = mount();
        let id: InodeId = fs
            .create(fs.root(), b"f", InodeKind::RegularFile, file_owner())
            .unwrap();
        fs.write(id, 0, &[1u8; 1500]).unwrap();

        let stats: FsStats = fs.statfs();
        assert_eq!(stats.inode_count, 2);
        assert_eq!(stats.page_size, 512);
        assert_eq!(stats.magic, 0xabcd);
        assert_eq!(stats.pool_stats.map(|p| p.in_use_pages), Some(3));

        fs.remove(fs.root(), b"f").unwrap();
        let stats: FsStats = fs.statfs();
        assert_eq!(stats.inode_count, 1);
        assert_eq!(stats.freed_inodes, 1);
        assert_eq!(stats.pool_stats.map(|p| p.in_use_pages), Some(0));
    }
}
