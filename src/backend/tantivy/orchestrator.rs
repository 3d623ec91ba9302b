//! Per-index write loop for the embedded engine.
//!
//! A single task owns the `IndexWriter`. Works are staged on the writer as
//! their batch arrives; what changes with the commit mode is when the
//! commit happens. Immediate batches commit before their future resolves.
//! Deferred batches wait for the commit threshold, the commit interval, a
//! flush or shutdown.

use super::model::TantivyIndexModel;
use super::work::TantivyWork;
use super::writer::ManagedIndexWriter;
use crate::config::TantivyConfig;
use crate::error::{Result, SearchSyncError};
use crate::work::{
    completion, ready, CommitMode, Completion, OrchestratorStats, StatsRecorder, WorkFuture,
    WorkOrchestrator,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tantivy::IndexReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout_at;

struct Submission {
    works: Vec<TantivyWork>,
    mode: CommitMode,
    done: Completion<()>,
}

pub struct TantivyWorkOrchestrator {
    index_name: String,
    tx: Mutex<Option<mpsc::Sender<Submission>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<StatsRecorder>,
}

impl TantivyWorkOrchestrator {
    /// Spawn the write loop, handing it the writer. Must be called from
    /// within a tokio runtime.
    pub fn start(
        index: tantivy::Index,
        reader: IndexReader,
        writer: ManagedIndexWriter,
        model: Arc<TantivyIndexModel>,
        config: &TantivyConfig,
    ) -> Self {
        let index_name = writer.index_name().to_string();
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(StatsRecorder::default());

        tracing::info!(
            "[TV {}] orchestrator started (commit every {}ms or {} batches)",
            index_name,
            config.commit_interval_ms,
            config.commit_threshold
        );

        let write_loop = WriteLoop {
            index,
            reader,
            writer,
            model,
            stats: Arc::clone(&stats),
            pending: Vec::new(),
            dirty: false,
            commit_threshold: config.commit_threshold.max(1),
        };
        let handle = tokio::spawn(write_loop.run(
            rx,
            Duration::from_millis(config.commit_interval_ms.max(1)),
        ));

        TantivyWorkOrchestrator {
            index_name,
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            stats,
        }
    }

    /// Stop accepting batches, commit what is pending and release the writer.
    pub async fn close(&self) {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(tx);
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("[TV {}] write loop ended abnormally: {}", self.index_name, e);
            }
        }
    }
}

impl WorkOrchestrator for TantivyWorkOrchestrator {
    type Work = TantivyWork;

    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn submit(&self, works: Vec<TantivyWork>, mode: CommitMode) -> WorkFuture<()> {
        if works.is_empty() {
            return ready(Ok(()));
        }
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            return ready(Err(SearchSyncError::OrchestratorClosed(
                self.index_name.clone(),
            )));
        };
        let (done, future) = completion(&self.index_name);
        match tx.try_send(Submission { works, mode, done }) {
            Ok(()) => future,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("[TV {}] queue full, rejecting batch", self.index_name);
                ready(Err(SearchSyncError::QueueFull(self.index_name.clone())))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => ready(Err(
                SearchSyncError::OrchestratorClosed(self.index_name.clone()),
            )),
        }
    }

    fn stats(&self) -> OrchestratorStats {
        self.stats.snapshot()
    }
}

struct WriteLoop {
    index: tantivy::Index,
    reader: IndexReader,
    writer: ManagedIndexWriter,
    model: Arc<TantivyIndexModel>,
    stats: Arc<StatsRecorder>,
    /// Applied but uncommitted batches.
    pending: Vec<Completion<()>>,
    /// Whether the writer holds uncommitted operations.
    dirty: bool,
    commit_threshold: usize,
}

impl WriteLoop {
    fn name(&self) -> &str {
        self.writer.index_name()
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Submission>, interval: Duration) {
        let mut deadline = Instant::now() + interval;
        loop {
            match timeout_at(deadline.into(), rx.recv()).await {
                Ok(Some(submission)) => {
                    self.handle(submission);
                    if self.pending.is_empty() {
                        deadline = Instant::now() + interval;
                    }
                }
                Ok(None) => {
                    tracing::info!(
                        "[TV {}] channel closed, flushing {} pending",
                        self.name(),
                        self.pending.len()
                    );
                    self.commit_pending();
                    break;
                }
                Err(_timeout) => {
                    if !self.pending.is_empty() {
                        tracing::debug!(
                            "[TV {}] interval elapsed, committing {} batches",
                            self.name(),
                            self.pending.len()
                        );
                        self.commit_pending();
                    }
                    deadline = Instant::now() + interval;
                }
            }
        }
        tracing::info!("[TV {}] write loop stopped", self.name());
    }

    fn handle(&mut self, submission: Submission) {
        let Submission { works, mode, done } = submission;
        self.stats.batch(works.len());
        tracing::debug!(
            "[TV {}] applying batch of {} works ({:?})",
            self.name(),
            works.len(),
            mode
        );

        let flushed = match self.apply(&works) {
            Ok(flushed) => flushed,
            Err(e) => {
                self.fail(done, e);
                return;
            }
        };

        self.pending.push(done);
        let commit_now = match mode {
            CommitMode::Immediate => true,
            CommitMode::Deferred => flushed || self.pending.len() >= self.commit_threshold,
        };
        if commit_now {
            self.commit_pending();
        }
    }

    /// Stage `works` in order. Returns whether the batch carried a flush or
    /// an optimize, both of which commit what precedes them.
    fn apply(&mut self, works: &[TantivyWork]) -> Result<bool> {
        let mut flushed = false;
        for work in works {
            match work {
                TantivyWork::Flush => {
                    self.commit()?;
                    flushed = true;
                }
                TantivyWork::Optimize => {
                    self.commit()?;
                    self.writer.compact(&self.index)?;
                    self.reader.reload()?;
                    flushed = true;
                }
                _ => {
                    work.apply(&self.model, &self.writer)?;
                    self.dirty = true;
                }
            }
        }
        Ok(flushed)
    }

    fn commit(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let opstamp = self.writer.commit_guarded()?;
        self.dirty = false;
        self.stats.commit();
        self.reader.reload()?;
        tracing::debug!("[TV {}] committed at opstamp {}", self.name(), opstamp);
        Ok(())
    }

    /// Commit and resolve every pending batch.
    fn commit_pending(&mut self) {
        match self.commit() {
            Ok(()) => {
                for done in self.pending.drain(..) {
                    done.complete(Ok(()));
                }
            }
            Err(e) => {
                tracing::error!("[TV {}] commit failed: {}", self.name(), e);
                self.rollback();
                self.fail_pending(&e);
            }
        }
    }

    /// Roll back to the last commit, failing `done` and every pending batch
    /// whose works were discarded with it.
    fn fail(&mut self, done: Completion<()>, error: SearchSyncError) {
        tracing::warn!("[TV {}] batch failed: {}", self.name(), error);
        self.rollback();
        self.fail_pending(&error);
        self.stats.failure();
        done.complete(Err(error));
    }

    fn rollback(&mut self) {
        if let Err(e) = self.writer.rollback_to_last_commit() {
            tracing::error!("[TV {}] rollback failed: {}", self.name(), e);
        }
        self.dirty = false;
    }

    fn fail_pending(&mut self, error: &SearchSyncError) {
        for done in self.pending.drain(..) {
            self.stats.failure();
            done.complete(Err(error.clone()));
        }
    }
}
