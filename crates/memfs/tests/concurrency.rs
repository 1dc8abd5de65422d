//! Integration tests for concurrent callers.
//!
//! The engine has no threads of its own; these tests drive it from several
//! host threads at once with `std::thread::scope`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use memfs::{
    InodeId, InodeKind, InodeTable, ManualClock, MemFs, MemFsError, MemFsOptions, MemoryPool,
    MemoryPoolConfig, OwnerInfo, ReaddirBatch, DEFAULT_FILE_MODE, ROOT_INODE,
};

const PAGE: usize = 512;
const THREADS: usize = 8;

/// Helper to mount a filesystem with a budget of `pages` pages.
fn create_test_fs(pages: u64) -> MemFs {
    let options: MemFsOptions = MemFsOptions::default().with_page_size(PAGE);
    let pool: Arc<MemoryPool> =
        Arc::new(MemoryPool::new(PAGE, MemoryPoolConfig::with_max_size(pages * PAGE as u64)));
    MemFs::mount_with(options, Arc::new(ManualClock::new(Duration::ZERO)), pool).unwrap()
}

fn owner() -> OwnerInfo {
    OwnerInfo::new(1000, 1000, DEFAULT_FILE_MODE)
}

#[test]
fn test_concurrent_distinct_creates_all_visible() {
    let fs: MemFs = create_test_fs(16);
    let per_thread: usize = 25;

    let ids: Vec<InodeId> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let fs: &MemFs = &fs;
                s.spawn(move || {
                    (0..per_thread)
                        .map(|i| {
                            let name: String = format!("t{t}-{i}");
                            fs.create(fs.root(), name.as_bytes(), InodeKind::RegularFile, owner())
                                .unwrap()
                        })
                        .collect::<Vec<InodeId>>()
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    let unique: HashSet<InodeId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), THREADS * per_thread);

    let listing: ReaddirBatch = fs.list_dir(fs.root(), 0).unwrap();
    assert_eq!(listing.entries.len(), THREADS * per_thread + 2);
    let listed: HashSet<InodeId> = listing.entries[2..].iter().map(|e| e.ino).collect();
    assert_eq!(listed, unique);
}

#[test]
fn test_concurrent_same_name_single_winner() {
    let fs: MemFs = create_test_fs(16);

    let results: Vec<Result<InodeId, MemFsError>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let fs: &MemFs = &fs;
                s.spawn(move || fs.create(fs.root(), b"contested", InodeKind::RegularFile, owner()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<InodeId> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
    assert_eq!(winners.len(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(MemFsError::NameCollision { .. }))));

    assert_eq!(fs.lookup(fs.root(), b"contested").unwrap(), Some(winners[0]));
    // Losers' inodes were freed.
    assert_eq!(fs.statfs().inode_count, 2);
    assert_eq!(fs.statfs().freed_inodes, (THREADS - 1) as u64);
}

#[test]
fn test_concurrent_writers_disjoint_pages() {
    let fs: MemFs = create_test_fs(64);
    let id: InodeId = fs.create(fs.root(), b"shared", InodeKind::RegularFile, owner()).unwrap();

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let fs: &MemFs = &fs;
            s.spawn(move || {
                let offset: u64 = (t * PAGE) as u64;
                fs.write(id, offset, &vec![t as u8 + 1; PAGE]).unwrap();
            });
        }
    });

    assert_eq!(fs.stat(id).unwrap().size, (THREADS * PAGE) as u64);
    for t in 0..THREADS {
        let page: Vec<u8> = fs.read(id, (t * PAGE) as u64, PAGE).unwrap();
        assert!(page.iter().all(|&b| b == t as u8 + 1), "page {t}");
    }
}

#[test]
fn test_overlapping_writes_are_atomic() {
    let fs: MemFs = create_test_fs(64);
    let id: InodeId = fs.create(fs.root(), b"shared", InodeKind::RegularFile, owner()).unwrap();
    let len: usize = 3 * PAGE;

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let fs: &MemFs = &fs;
            s.spawn(move || {
                for _ in 0..20 {
                    fs.write(id, 100, &vec![t as u8 + 1; len]).unwrap();
                }
            });
        }
    });

    // Whole writes serialize per inode: the range holds one writer's bytes.
    let data: Vec<u8> = fs.read(id, 100, len).unwrap();
    assert_eq!(data.len(), len);
    assert!(data.iter().all(|&b| b == data[0]));
    assert_eq!(fs.stat(id).unwrap().size, (100 + len) as u64);
}

#[test]
fn test_budget_exhaustion_under_contention() {
    let fs: MemFs = create_test_fs(THREADS as u64);

    let outcomes: Vec<(InodeId, bool)> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let fs: &MemFs = &fs;
                s.spawn(move || {
                    let name: String = format!("f{t}");
                    let id: InodeId = fs
                        .create(fs.root(), name.as_bytes(), InodeKind::RegularFile, owner())
                        .unwrap();
                    // Two pages each: only half of the writers can fit.
                    let ok: bool = fs.write(id, 0, &vec![7u8; 2 * PAGE]).is_ok();
                    (id, ok)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Staging can transiently hold frames for writers that later fail, so
    // fewer than half may win, never more.
    let succeeded: usize = outcomes.iter().filter(|(_, ok)| *ok).count();
    assert!(succeeded <= THREADS / 2);
    for (id, ok) in outcomes {
        let expected: u64 = if ok { (2 * PAGE) as u64 } else { 0 };
        assert_eq!(fs.stat(id).unwrap().size, expected);
    }
    let pool = fs.statfs().pool_stats.unwrap();
    assert_eq!(pool.in_use_pages, 2 * succeeded);
    assert!(pool.peak_pages <= THREADS);
}

#[test]
fn test_concurrent_open_release_frees_once() {
    let fs: MemFs = create_test_fs(16);
    let id: InodeId = fs.create(fs.root(), b"f", InodeKind::RegularFile, owner()).unwrap();
    for _ in 0..THREADS {
        fs.open(id).unwrap();
    }
    fs.remove(fs.root(), b"f").unwrap();

    let freed: usize = std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let fs: &MemFs = &fs;
                s.spawn(move || fs.release(id).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).filter(|&f| f).count()
    });

    assert_eq!(freed, 1);
    assert!(fs.stat(id).is_err());
    assert_eq!(fs.statfs().freed_inodes, 1);
}

#[test]
fn test_get_or_create_races_initialize_once() {
    let table: Arc<InodeTable> = Arc::new(InodeTable::new(
        Arc::new(MemoryPool::new(PAGE, MemoryPoolConfig::with_max_size(16 * PAGE as u64))),
        Arc::new(ManualClock::new(Duration::ZERO)),
    ));

    let kinds: Vec<InodeKind> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let table: &InodeTable = &table;
                s.spawn(move || {
                    let kind: InodeKind = if t % 2 == 0 {
                        InodeKind::Directory
                    } else {
                        InodeKind::RegularFile
                    };
                    table.get_or_create(ROOT_INODE, kind, OwnerInfo::default()).kind()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(kinds.iter().all(|k| *k == kinds[0]));
    assert_eq!(table.inode_count(), 1);
    assert_eq!(table.get(ROOT_INODE).unwrap().refs().handles(), THREADS);
}

#[test]
fn test_concurrent_create_and_remove_in_subdirectories() {
    let fs: MemFs = create_test_fs(16);

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let fs: &MemFs = &fs;
            s.spawn(move || {
                let name: String = format!("dir{t}");
                let dir: InodeId = fs
                    .create(fs.root(), name.as_bytes(), InodeKind::Directory, OwnerInfo::default())
                    .unwrap();
                for i in 0..10 {
                    let child: String = format!("c{i}");
                    fs.create(dir, child.as_bytes(), InodeKind::RegularFile, owner()).unwrap();
                }
                for i in 0..10 {
                    let child: String = format!("c{i}");
                    assert!(fs.remove(dir, child.as_bytes()).unwrap().is_some());
                }
                assert_eq!(fs.remove(fs.root(), name.as_bytes()).unwrap(), Some(dir));
            });
        }
    });

    assert_eq!(fs.list_dir(fs.root(), 0).unwrap().entries.len(), 2);
    assert_eq!(fs.statfs().inode_count, 1);
}
