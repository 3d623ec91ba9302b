//! Entity-facing index workers.
//!
//! A [`ChangesetWorker`] accumulates works until `execute()` hands them to the
//! orchestrator as one batch; a [`StreamWorker`] submits every call directly.

use crate::config::CommitPolicy;
use crate::document::{DocumentBuilder, DocumentContributor};
use crate::error::{Result, SearchSyncError};
use crate::model::IndexSchema;
use crate::tenancy::MultiTenancyStrategy;
use crate::types::{DocumentReference, SessionContext};
use crate::work::{CommitMode, WorkFuture};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// What a worker needs from a backend to turn entity changes into works.
pub trait IndexingContext: Send + Sync + 'static {
    type Work: Send + 'static;

    fn backend_name(&self) -> &str;

    fn schema(&self) -> &Arc<IndexSchema>;

    fn multi_tenancy(&self) -> MultiTenancyStrategy;

    fn add(
        &self,
        tenant_id: Option<&str>,
        reference: &DocumentReference,
        document: DocumentBuilder,
    ) -> Result<Self::Work>;

    fn update(
        &self,
        tenant_id: Option<&str>,
        reference: &DocumentReference,
        document: DocumentBuilder,
    ) -> Result<Self::Work>;

    fn delete(&self, tenant_id: Option<&str>, reference: &DocumentReference) -> Result<Self::Work>;

    fn flush(&self) -> Self::Work;

    fn optimize(&self) -> Self::Work;

    fn submit(&self, works: Vec<Self::Work>, mode: CommitMode) -> WorkFuture<()>;
}

/// Operations shared by both worker flavours.
pub trait IndexWorker {
    /// `()` for changesets, the submission future for streams.
    type Output;

    fn add(
        &mut self,
        reference: DocumentReference,
        contributor: &dyn DocumentContributor,
    ) -> Result<Self::Output>;

    fn update(
        &mut self,
        reference: DocumentReference,
        contributor: &dyn DocumentContributor,
    ) -> Result<Self::Output>;

    fn delete(&mut self, reference: DocumentReference) -> Result<Self::Output>;
}

pub trait ChangesetIndexWorker: IndexWorker<Output = ()> {
    fn prepare(&mut self) -> Result<()>;

    /// Submit every pending work as one batch; the pending list is empty
    /// afterwards whatever the outcome.
    fn execute(&mut self) -> WorkFuture<()>;
}

pub trait StreamIndexWorker: IndexWorker<Output = WorkFuture<()>> {
    fn flush(&mut self) -> WorkFuture<()>;

    fn optimize(&mut self) -> WorkFuture<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Open = 0,
    Prepared = 1,
    Executing = 2,
    Completed = 3,
    Failed = 4,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Open,
            1 => WorkerState::Prepared,
            2 => WorkerState::Executing,
            3 => WorkerState::Completed,
            _ => WorkerState::Failed,
        }
    }

    fn is_finished(&self) -> bool {
        matches!(
            self,
            WorkerState::Executing | WorkerState::Completed | WorkerState::Failed
        )
    }
}

fn validate_reference(schema: &IndexSchema, reference: &DocumentReference) -> Result<()> {
    if reference.id.is_empty() {
        return Err(SearchSyncError::MissingIdentifier(
            schema.index_name().to_string(),
        ));
    }
    if schema.explicit_routing() && reference.routing_key.is_none() {
        return Err(SearchSyncError::Config(format!(
            "index '{}' requires a routing key for document '{}'",
            schema.index_name(),
            reference.id
        )));
    }
    Ok(())
}

fn build_document(schema: &Arc<IndexSchema>, contributor: &dyn DocumentContributor) -> DocumentBuilder {
    let mut builder = DocumentBuilder::new(Arc::clone(schema));
    builder.contribute(contributor);
    builder
}

pub struct ChangesetWorker<C: IndexingContext> {
    context: Arc<C>,
    tenant_id: Option<String>,
    works: Vec<C::Work>,
    state: Arc<AtomicU8>,
}

impl<C: IndexingContext> ChangesetWorker<C> {
    pub fn new(context: Arc<C>, session: &SessionContext) -> Result<Self> {
        context
            .multi_tenancy()
            .check_tenant_id(session.tenant_id(), context.backend_name())?;
        Ok(ChangesetWorker {
            context,
            tenant_id: session.tenant_id.clone(),
            works: Vec::new(),
            state: Arc::new(AtomicU8::new(WorkerState::Open as u8)),
        })
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn pending(&self) -> usize {
        self.works.len()
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Reopen a finished changeset, or reject calls on a prepared one.
    fn ensure_open(&mut self) -> Result<()> {
        let state = self.state();
        if state == WorkerState::Prepared {
            return Err(SearchSyncError::IllegalState(format!(
                "changeset on index '{}' is prepared; execute it before adding works",
                self.context.schema().index_name()
            )));
        }
        if state.is_finished() {
            self.set_state(WorkerState::Open);
        }
        Ok(())
    }

    fn push(&mut self, work: C::Work) {
        self.works.push(work);
    }
}

impl<C: IndexingContext> IndexWorker for ChangesetWorker<C> {
    type Output = ();

    fn add(
        &mut self,
        reference: DocumentReference,
        contributor: &dyn DocumentContributor,
    ) -> Result<()> {
        self.ensure_open()?;
        validate_reference(self.context.schema(), &reference)?;
        let document = build_document(self.context.schema(), contributor);
        let work = self
            .context
            .add(self.tenant_id.as_deref(), &reference, document)?;
        self.push(work);
        Ok(())
    }

    fn update(
        &mut self,
        reference: DocumentReference,
        contributor: &dyn DocumentContributor,
    ) -> Result<()> {
        self.ensure_open()?;
        validate_reference(self.context.schema(), &reference)?;
        let document = build_document(self.context.schema(), contributor);
        let work = self
            .context
            .update(self.tenant_id.as_deref(), &reference, document)?;
        self.push(work);
        Ok(())
    }

    fn delete(&mut self, reference: DocumentReference) -> Result<()> {
        self.ensure_open()?;
        validate_reference(self.context.schema(), &reference)?;
        let work = self.context.delete(self.tenant_id.as_deref(), &reference)?;
        self.push(work);
        Ok(())
    }
}

impl<C: IndexingContext> ChangesetIndexWorker for ChangesetWorker<C> {
    fn prepare(&mut self) -> Result<()> {
        self.set_state(WorkerState::Prepared);
        Ok(())
    }

    fn execute(&mut self) -> WorkFuture<()> {
        let works = std::mem::take(&mut self.works);
        tracing::debug!(
            "executing changeset of {} works on index '{}'",
            works.len(),
            self.context.schema().index_name()
        );
        self.set_state(WorkerState::Executing);
        let submitted = self.context.submit(works, CommitMode::Immediate);
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let result = submitted.await;
            let outcome = match result {
                Ok(_) => WorkerState::Completed,
                Err(_) => WorkerState::Failed,
            };
            // A newer changeset may already have reopened the worker.
            let _ = state.compare_exchange(
                WorkerState::Executing as u8,
                outcome as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            result
        })
    }
}

pub struct StreamWorker<C: IndexingContext> {
    context: Arc<C>,
    tenant_id: Option<String>,
    commit_mode: CommitMode,
}

impl<C: IndexingContext> StreamWorker<C> {
    pub fn new(context: Arc<C>, session: &SessionContext, policy: CommitPolicy) -> Result<Self> {
        context
            .multi_tenancy()
            .check_tenant_id(session.tenant_id(), context.backend_name())?;
        let commit_mode = match policy {
            CommitPolicy::Deferred => CommitMode::Deferred,
            CommitPolicy::PerOperation => CommitMode::Immediate,
        };
        Ok(StreamWorker {
            context,
            tenant_id: session.tenant_id.clone(),
            commit_mode,
        })
    }

    fn submit_one(&self, work: C::Work) -> WorkFuture<()> {
        self.context.submit(vec![work], self.commit_mode)
    }
}

impl<C: IndexingContext> IndexWorker for StreamWorker<C> {
    type Output = WorkFuture<()>;

    fn add(
        &mut self,
        reference: DocumentReference,
        contributor: &dyn DocumentContributor,
    ) -> Result<WorkFuture<()>> {
        validate_reference(self.context.schema(), &reference)?;
        let document = build_document(self.context.schema(), contributor);
        let work = self
            .context
            .add(self.tenant_id.as_deref(), &reference, document)?;
        Ok(self.submit_one(work))
    }

    fn update(
        &mut self,
        reference: DocumentReference,
        contributor: &dyn DocumentContributor,
    ) -> Result<WorkFuture<()>> {
        validate_reference(self.context.schema(), &reference)?;
        let document = build_document(self.context.schema(), contributor);
        let work = self
            .context
            .update(self.tenant_id.as_deref(), &reference, document)?;
        Ok(self.submit_one(work))
    }

    fn delete(&mut self, reference: DocumentReference) -> Result<WorkFuture<()>> {
        validate_reference(self.context.schema(), &reference)?;
        let work = self.context.delete(self.tenant_id.as_deref(), &reference)?;
        Ok(self.submit_one(work))
    }
}

impl<C: IndexingContext> StreamIndexWorker for StreamWorker<C> {
    fn flush(&mut self) -> WorkFuture<()> {
        self.context
            .submit(vec![self.context.flush()], CommitMode::Immediate)
    }

    fn optimize(&mut self) -> WorkFuture<()> {
        self.context
            .submit(vec![self.context.optimize()], CommitMode::Immediate)
    }
}
