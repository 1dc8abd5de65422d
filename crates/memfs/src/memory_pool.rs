//! Page-granular memory provider with a byte budget.
//!
//! The engine never allocates file content directly. Every page frame is
//! requested from a [`PageAllocator`], which lets the host decide how much
//! memory a mount may consume and lets tests simulate exhaustion.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 MemoryPool                  │
//! │  config: MemoryPoolConfig (budget)          │
//! │  in_use: AtomicUsize   (frames handed out)  │
//! │  counters: allocations / frees / refusals   │
//! └─────────────────────────────────────────────┘
//!            ▲ allocate_page        │ free_page
//!            │                      ▼
//!      PageStore (one per regular file)
//! ```
//!
//! # Thread Safety
//!
//! Reservation is a compare-and-swap loop on `in_use`, so concurrent writers
//! can never push the pool past its budget.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Deserialize;
use thiserror::Error;

/// Default page size (4 KiB).
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest page size the engine accepts.
pub const MIN_PAGE_SIZE: usize = 512;

/// Default maximum pool size (8GB).
pub const DEFAULT_MAX_POOL_SIZE: u64 = 8 * 1024 * 1024 * 1024;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during memory pool operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryPoolError {
    /// Pool is at capacity.
    #[error("Pool exhausted: {in_use_pages} of {max_pages} pages in use")]
    PoolExhausted {
        /// Frames currently handed out.
        in_use_pages: usize,
        /// Budget expressed in frames.
        max_pages: usize,
    },
}

// ============================================================================
// Allocator Trait
// ============================================================================

/// Source of fixed-size, zero-filled page frames.
///
/// Implementations must hand out frames of exactly `page_size()` bytes and
/// accept them back through `free_page`.
pub trait PageAllocator: Send + Sync + fmt::Debug {
    /// Size of every frame in bytes. Always a power of two.
    fn page_size(&self) -> usize;

    /// Allocate one zero-filled frame.
    ///
    /// # Returns
    /// The frame, or `PoolExhausted` if the budget is spent.
    fn allocate_page(&self) -> Result<Box<[u8]>, MemoryPoolError>;

    /// Return a frame previously obtained from `allocate_page`.
    ///
    /// # Arguments
    /// * `page` - Frame to release
    fn free_page(&self, page: Box<[u8]>);

    /// Usage snapshot, if the allocator keeps one.
    fn usage(&self) -> Option<MemoryPoolStats> {
        None
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the memory pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemoryPoolConfig {
    /// Maximum total size of the pool in bytes.
    pub max_size: u64,
}

impl Default for MemoryPoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_POOL_SIZE,
        }
    }
}

impl MemoryPoolConfig {
    /// Create a new configuration with custom max size.
    ///
    /// # Arguments
    /// * `max_size` - Budget in bytes
    pub fn with_max_size(max_size: u64) -> Self {
        Self { max_size }
    }

    /// Calculate the maximum number of pages this pool can hold.
    ///
    /// # Arguments
    /// * `page_size` - Frame size in bytes
    pub fn max_pages(&self, page_size: usize) -> usize {
        let pages: u64 = self.max_size / page_size as u64;
        usize::try_from(pages).unwrap_or(usize::MAX)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Snapshot of pool usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryPoolStats {
    /// Frame size in bytes.
    pub page_size: usize,
    /// Frames currently handed out.
    pub in_use_pages: usize,
    /// Highest `in_use_pages` ever observed.
    pub peak_pages: usize,
    /// Budget expressed in frames.
    pub max_pages: usize,
    /// Successful allocations since creation.
    pub allocations: u64,
    /// Frames returned since creation.
    pub frees: u64,
    /// Allocations refused for lack of budget.
    pub refused: u64,
}

impl MemoryPoolStats {
    /// Bytes currently held in frames.
    pub fn in_use_bytes(&self) -> u64 {
        self.in_use_pages as u64 * self.page_size as u64
    }
}

// ============================================================================
// Memory Pool
// ============================================================================

/// Budgeted page allocator backed by the global heap.
pub struct MemoryPool {
    /// Frame size in bytes.
    page_size: usize,
    /// Budget in frames.
    max_pages: usize,
    /// Frames currently handed out.
    in_use: AtomicUsize,
    /// High-water mark of `in_use`.
    peak: AtomicUsize,
    /// Total allocations counter.
    allocation_count: AtomicU64,
    /// Total frees counter.
    free_count: AtomicU64,
    /// Refused allocations counter.
    refused_count: AtomicU64,
}

impl MemoryPool {
    /// Create a new memory pool.
    ///
    /// # Arguments
    /// * `page_size` - Frame size in bytes (power of two)
    /// * `config` - Pool configuration specifying the byte budget
    pub fn new(page_size: usize, config: MemoryPoolConfig) -> Self {
        Self {
            page_size,
            max_pages: config.max_pages(page_size),
            in_use: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            allocation_count: AtomicU64::new(0),
            free_count: AtomicU64::new(0),
            refused_count: AtomicU64::new(0),
        }
    }

    /// Create a memory pool with default configuration (4 KiB pages, 8GB max).
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, MemoryPoolConfig::default())
    }

    /// Reserve one frame against the budget.
    fn reserve(&self) -> Result<(), MemoryPoolError> {
        let mut current: usize = self.in_use.load(Ordering::Acquire);
        loop {
            if current >= self.max_pages {
                self.refused_count.fetch_add(1, Ordering::Relaxed);
                return Err(MemoryPoolError::PoolExhausted {
                    in_use_pages: current,
                    max_pages: self.max_pages,
                });
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(current + 1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Get current statistics.
    pub fn stats(&self) -> MemoryPoolStats {
        MemoryPoolStats {
            page_size: self.page_size,
            in_use_pages: self.in_use.load(Ordering::Acquire),
            peak_pages: self.peak.load(Ordering::Relaxed),
            max_pages: self.max_pages,
            allocations: self.allocation_count.load(Ordering::Relaxed),
            frees: self.free_count.load(Ordering::Relaxed),
            refused: self.refused_count.load(Ordering::Relaxed),
        }
    }

    /// Frames currently handed out.
    pub fn in_use_pages(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}

impl PageAllocator for MemoryPool {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocate_page(&self) -> Result<Box<[u8]>, MemoryPoolError> {
        if let Err(e) = self.reserve() {
            tracing::warn!(max_pages = self.max_pages, "memory pool refused a page");
            return Err(e);
        }
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        Ok(vec![0u8; self.page_size].into_boxed_slice())
    }

    fn free_page(&self, page: Box<[u8]>) {
        debug_assert_eq!(page.len(), self.page_size);
        drop(page);
        self.in_use.fetch_sub(1, Ordering::AcqRel);
        self.free_count.fetch_add(1, Ordering::Relaxed);
    }

    fn usage(&self) -> Option<MemoryPoolStats> {
        Some(self.stats())
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPool")
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field("in_use", &self.in_use.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn small_pool(pages: u64) -> MemoryPool {
        MemoryPool::new(512, MemoryPoolConfig::with_max_size(pages * 512))
    }

    #[test]
    fn test_max_pages() {
        let config: MemoryPoolConfig = MemoryPoolConfig::with_max_size(10 * 4096 + 100);
        assert_eq!(config.max_pages(4096), 10);
    }

    #[test]
    fn test_allocate_returns_zeroed_frame() {
        let pool: MemoryPool = small_pool(2);
        let page: Box<[u8]> = pool.allocate_page().unwrap();
        assert_eq!(page.len(), 512);
        assert!(page.iter().all(|&b| b == 0));
        assert_eq!(pool.in_use_pages(), 1);
    }

    #[test]
    fn test_exhaustion_and_recovery() {
        let pool: MemoryPool = small_pool(2);
        let a: Box<[u8]> = pool.allocate_page().unwrap();
        let _b: Box<[u8]> = pool.allocate_page().unwrap();

        let err: MemoryPoolError = pool.allocate_page().unwrap_err();
        assert_eq!(
            err,
            MemoryPoolError::PoolExhausted {
                in_use_pages: 2,
                max_pages: 2
            }
        );

        pool.free_page(a);
        assert!(pool.allocate_page().is_ok());

        let stats: MemoryPoolStats = pool.stats();
        assert_eq!(stats.allocations, 3);
        assert_eq!(stats.frees, 1);
        assert_eq!(stats.refused, 1);
        assert_eq!(stats.peak_pages, 2);
        assert_eq!(stats.in_use_bytes(), 1024);
    }

    #[test]
    fn test_concurrent_allocation_respects_budget() {
        let pool: Arc<MemoryPool> = Arc::new(small_pool(64));
        let granted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let pool: Arc<MemoryPool> = pool.clone();
                    s.spawn(move || {
                        let mut frames: Vec<Box<[u8]>> = Vec::new();
                        for _ in 0..16 {
                            if let Ok(frame) = pool.allocate_page() {
                                frames.push(frame);
                            }
                        }
                        frames.len()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(granted, 64);
        assert_eq!(pool.stats().refused, 64);
    }
}
