//! Futures and orchestration plumbing shared by both backends.

use crate::error::{Result, SearchSyncError};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

/// Future resolved when submitted works have been applied.
pub type WorkFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

pub fn ready<T: Send + 'static>(result: Result<T>) -> WorkFuture<T> {
    Box::pin(std::future::ready(result))
}

/// How the embedded engine makes a batch durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Commit once after the batch, before its future resolves.
    Immediate,
    /// Let the orchestrator coalesce the commit with later batches.
    Deferred,
}

/// Accepts batches of works for one index and applies them in order.
pub trait WorkOrchestrator: Send + Sync {
    type Work: Send + 'static;

    fn index_name(&self) -> &str;

    fn submit(&self, works: Vec<Self::Work>, mode: CommitMode) -> WorkFuture<()>;

    fn stats(&self) -> OrchestratorStats;
}

/// Sending half of a [`WorkFuture`].
pub struct Completion<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T> Completion<T> {
    pub fn complete(self, result: Result<T>) {
        // The caller may have dropped the future; nothing to report then.
        let _ = self.tx.send(result);
    }
}

pub fn completion<T: Send + 'static>(index_name: &str) -> (Completion<T>, WorkFuture<T>) {
    let (tx, rx) = oneshot::channel();
    let index_name = index_name.to_string();
    let future = async move {
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(SearchSyncError::OrchestratorClosed(index_name)),
        }
    };
    (Completion { tx }, Box::pin(future))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    pub batches: u64,
    pub works: u64,
    pub commits: u64,
    pub failed_batches: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    batches: AtomicU64,
    works: AtomicU64,
    commits: AtomicU64,
    failed_batches: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn batch(&self, works: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.works.fetch_add(works as u64, Ordering::Relaxed);
    }

    pub(crate) fn commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> OrchestratorStats {
        OrchestratorStats {
            batches: self.batches.load(Ordering::Relaxed),
            works: self.works.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
        }
    }
}
