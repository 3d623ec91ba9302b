use super::budget::{WriterBudget, WriterGuard};
use crate::config::TantivyConfig;
use crate::error::{Result, SearchSyncError};
use std::ops::{Deref, DerefMut};

/// The single `IndexWriter` of an index, holding a slot of the backend's
/// [`WriterBudget`] until dropped.
pub struct ManagedIndexWriter {
    index_name: String,
    inner: tantivy::IndexWriter,
    _guard: WriterGuard,
}

impl ManagedIndexWriter {
    pub(crate) fn open(
        index: &tantivy::Index,
        index_name: &str,
        budget: &WriterBudget,
        config: &TantivyConfig,
    ) -> Result<Self> {
        let heap = budget.validate_heap(config.writer_heap_bytes, config.writer_threads)?;
        let guard = budget.acquire_writer()?;
        let inner = index
            .writer_with_num_threads(config.writer_threads, heap)
            .map_err(|e| SearchSyncError::WriterCreation {
                index: index_name.to_string(),
                message: e.to_string(),
            })?;

        // Merge segments once 30% of their documents are deleted; updates
        // are delete-then-add, so deletions accumulate quickly.
        let mut merge_policy = tantivy::merge_policy::LogMergePolicy::default();
        merge_policy.set_del_docs_ratio_before_merge(0.3);
        inner.set_merge_policy(Box::new(merge_policy));

        tracing::debug!(
            "[TV {}] writer opened ({} threads, {} bytes heap)",
            index_name,
            config.writer_threads,
            heap
        );
        Ok(ManagedIndexWriter {
            index_name: index_name.to_string(),
            inner,
            _guard: guard,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Commit, reporting a panic inside Tantivy as an error.
    pub fn commit_guarded(&mut self) -> Result<u64> {
        let inner = &mut self.inner;
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| inner.commit())) {
            Ok(Ok(opstamp)) => Ok(opstamp),
            Ok(Err(e)) => {
                tracing::error!("[TV {}] commit error: {}", self.index_name, e);
                Err(e.into())
            }
            Err(panic_info) => {
                let msg = if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else {
                    "unknown panic in tantivy commit".to_string()
                };
                tracing::error!("[TV {}] PANIC during commit: {}", self.index_name, msg);
                Err(SearchSyncError::Tantivy(msg))
            }
        }
    }

    /// Discard every operation since the last commit.
    pub fn rollback_to_last_commit(&mut self) -> Result<()> {
        let opstamp = self.inner.rollback()?;
        tracing::warn!(
            "[TV {}] rolled back to opstamp {}",
            self.index_name,
            opstamp
        );
        Ok(())
    }

    /// Merge every searchable segment into one and collect stale files.
    /// Returns the number of segments merged.
    pub fn compact(&mut self, index: &tantivy::Index) -> Result<usize> {
        let segment_ids = index.searchable_segment_ids()?;
        tracing::info!(
            "[TV {}] compacting {} segments",
            self.index_name,
            segment_ids.len()
        );
        if segment_ids.len() > 1 {
            self.inner
                .merge(&segment_ids)
                .wait()
                .map_err(|e| SearchSyncError::Tantivy(e.to_string()))?;
        }
        let gc = self
            .inner
            .garbage_collect_files()
            .wait()
            .map_err(|e| SearchSyncError::Tantivy(e.to_string()))?;
        tracing::info!(
            "[TV {}] compact done, gc removed {} files",
            self.index_name,
            gc.deleted_files.len()
        );
        Ok(segment_ids.len())
    }
}

impl Deref for ManagedIndexWriter {
    type Target = tantivy::IndexWriter;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ManagedIndexWriter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
