use crate::config::TantivyConfig;
use crate::error::{Result, SearchSyncError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Smallest indexing arena Tantivy accepts per writer thread.
pub const MIN_HEAP_PER_THREAD: usize = 15_000_000;
/// Largest indexing arena Tantivy accepts per writer thread.
pub const MAX_HEAP_PER_THREAD: usize = u32::MAX as usize - 1_000_000;

/// Bounds the writers open at once across every index of a backend.
pub struct WriterBudget {
    max_concurrent_writers: usize,
    active_writers: Arc<AtomicUsize>,
}

impl WriterBudget {
    pub fn new(max_concurrent_writers: usize) -> Self {
        WriterBudget {
            max_concurrent_writers,
            active_writers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &TantivyConfig) -> Self {
        Self::new(config.max_concurrent_writers)
    }

    pub fn acquire_writer(&self) -> Result<WriterGuard> {
        let current = self.active_writers.fetch_add(1, Ordering::SeqCst);

        if current >= self.max_concurrent_writers {
            self.active_writers.fetch_sub(1, Ordering::SeqCst);
            return Err(SearchSyncError::TooManyConcurrentWriters {
                current: current + 1,
                max: self.max_concurrent_writers,
            });
        }

        Ok(WriterGuard {
            active_writers: Arc::clone(&self.active_writers),
        })
    }

    /// Check `heap_bytes` split over `threads` against Tantivy's per-thread limits.
    pub fn validate_heap(&self, heap_bytes: usize, threads: usize) -> Result<usize> {
        let threads = threads.max(1);
        let min = MIN_HEAP_PER_THREAD * threads;
        let max = MAX_HEAP_PER_THREAD.saturating_mul(threads);
        if heap_bytes < min || heap_bytes > max {
            return Err(SearchSyncError::WriterHeapOutOfRange {
                requested: heap_bytes,
                min,
                max,
            });
        }
        Ok(heap_bytes)
    }

    pub fn active_writers(&self) -> usize {
        self.active_writers.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_writers(&self) -> usize {
        self.max_concurrent_writers
    }
}

/// Releases its writer slot on drop.
pub struct WriterGuard {
    active_writers: Arc<AtomicUsize>,
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        self.active_writers.fetch_sub(1, Ordering::SeqCst);
    }
}
