//! Per-index work queue for Elasticsearch.
//!
//! Every submission goes through one bounded channel drained by a single
//! task, so batches hit the cluster in submission order. Consecutive
//! document works are grouped into `_bulk` requests of at most
//! `max_bulk_size` works; other works run alone at their position.

use super::client::{ElasticsearchClient, ElasticsearchRequest};
use super::work::ElasticsearchWork;
use crate::config::ElasticsearchConfig;
use crate::error::{BulkItemFailure, Result, SearchSyncError};
use crate::work::{
    completion, ready, CommitMode, Completion, OrchestratorStats, StatsRecorder, WorkFuture,
    WorkOrchestrator,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Submission {
    works: Vec<ElasticsearchWork>,
    done: Completion<()>,
}

pub struct ElasticsearchWorkOrchestrator {
    index_name: String,
    tx: Mutex<Option<mpsc::Sender<Submission>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<StatsRecorder>,
}

impl ElasticsearchWorkOrchestrator {
    /// Spawn the queue task. Must be called from within a tokio runtime.
    pub fn start(
        index_name: impl Into<String>,
        client: Arc<dyn ElasticsearchClient>,
        config: &ElasticsearchConfig,
    ) -> Self {
        let index_name = index_name.into();
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(StatsRecorder::default());
        let max_bulk_size = config.max_bulk_size.max(1);

        tracing::info!(
            "[ES {}] orchestrator started (max bulk size {}, queue capacity {})",
            index_name,
            max_bulk_size,
            config.queue_capacity
        );

        let handle = tokio::spawn(process_submissions(
            index_name.clone(),
            client,
            rx,
            max_bulk_size,
            Arc::clone(&stats),
        ));

        ElasticsearchWorkOrchestrator {
            index_name,
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            stats,
        }
    }

    /// Stop accepting batches and wait for queued ones to be applied.
    pub async fn close(&self) {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(tx);
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("[ES {}] queue task ended abnormally: {}", self.index_name, e);
            }
        }
    }
}

impl WorkOrchestrator for ElasticsearchWorkOrchestrator {
    type Work = ElasticsearchWork;

    fn index_name(&self) -> &str {
        &self.index_name
    }

    /// The commit mode is irrelevant here: the cluster makes each request
    /// durable on its own.
    fn submit(&self, works: Vec<ElasticsearchWork>, _mode: CommitMode) -> WorkFuture<()> {
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
        match tx.try_send(Submission { works, done }) {
            Ok(()) => future,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("[ES {}] queue full, rejecting batch", self.index_name);
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

async fn process_submissions(
    index_name: String,
    client: Arc<dyn ElasticsearchClient>,
    mut rx: mpsc::Receiver<Submission>,
    max_bulk_size: usize,
    stats: Arc<StatsRecorder>,
) {
    while let Some(submission) = rx.recv().await {
        let count = submission.works.len();
        tracing::debug!("[ES {}] applying batch of {} works", index_name, count);
        stats.batch(count);
        let result = apply_batch(client.as_ref(), &submission.works, max_bulk_size).await;
        if let Err(e) = &result {
            stats.failure();
            tracing::warn!("[ES {}] batch of {} works failed: {}", index_name, count, e);
        }
        submission.done.complete(result);
    }
    tracing::info!("[ES {}] channel closed, orchestrator stopped", index_name);
}

/// Apply `works` in order, stopping at the first failure.
pub(crate) async fn apply_batch(
    client: &dyn ElasticsearchClient,
    works: &[ElasticsearchWork],
    max_bulk_size: usize,
) -> Result<()> {
    let mut position = 0;
    while position < works.len() {
        if works[position].is_bulkable() {
            let len = works[position..]
                .iter()
                .take_while(|w| w.is_bulkable())
                .take(max_bulk_size)
                .count();
            execute_bulk(client, &works[position..position + len], position).await?;
            position += len;
        } else {
            works[position].execute(client).await?;
            position += 1;
        }
    }
    Ok(())
}

async fn execute_bulk(
    client: &dyn ElasticsearchClient,
    works: &[ElasticsearchWork],
    first_position: usize,
) -> Result<()> {
    let mut lines = Vec::with_capacity(works.len() * 2);
    for work in works {
        work.push_bulk_lines(&mut lines);
    }
    let request = ElasticsearchRequest::bulk(lines);
    let response = client
        .execute(request.clone())
        .await?
        .into_result(&request)?;

    let items = response.body["items"].as_array().cloned().unwrap_or_default();
    let mut failures = Vec::new();
    for (offset, work) in works.iter().enumerate() {
        let position = first_position + offset;
        let Some(item) = items.get(offset).and_then(item_body) else {
            failures.push(BulkItemFailure {
                position,
                index: work.index().to_string(),
                id: work.id().map(str::to_string),
                status: 0,
                reason: "no item in bulk response".to_string(),
            });
            continue;
        };
        let status = item["status"].as_u64().unwrap_or(0) as u16;
        if !work.accepts_item_status(status) {
            failures.push(BulkItemFailure {
                position,
                index: work.index().to_string(),
                id: work.id().map(str::to_string),
                status,
                reason: failure_reason(&item["error"]),
            });
        }
    }

    if failures.is_empty() {
        return Ok(());
    }
    Err(SearchSyncError::BulkItems {
        index: works[0].index().to_string(),
        failures,
    })
}

/// `{"index": {...}}` → `{...}`
fn item_body(item: &Value) -> Option<&Value> {
    item.as_object().and_then(|o| o.values().next())
}

fn failure_reason(error: &Value) -> String {
    match error {
        Value::Null => "unknown".to_string(),
        Value::String(s) => s.clone(),
        Value::Object(o) => match (o.get("type"), o.get("reason")) {
            (Some(Value::String(t)), Some(Value::String(r))) => format!("{}: {}", t, r),
            (_, Some(Value::String(r))) => r.clone(),
            _ => error.to_string(),
        },
        other => other.to_string(),
    }
}
