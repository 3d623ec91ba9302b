//! Embedded backend writing Tantivy indexes.
//!
//! Each index gets a directory (in memory or under the configured root), a
//! reader reloaded after every commit, and a write loop owning the only
//! `IndexWriter`.

pub mod analysis;
pub mod budget;
pub mod document;
pub mod model;
pub mod orchestrator;
pub mod work;
pub mod writer;

pub use analysis::AnalysisRegistry;
pub use budget::WriterBudget;
pub use model::TantivyIndexModel;
pub use orchestrator::TantivyWorkOrchestrator;
pub use work::{TantivyWork, TantivyWorkFactory};
pub use writer::ManagedIndexWriter;

use crate::backend::registry::ManagerRegistry;
use crate::config::{BackendConfig, CommitPolicy, DirectoryKind, LifecycleStrategy, TantivyConfig};
use crate::document::DocumentBuilder;
use crate::error::{Result, SearchSyncError};
use crate::model::{IndexSchema, IndexSchemaBuilder};
use crate::tenancy::MultiTenancyStrategy;
use crate::types::{DocumentReference, SearchHit, SearchResult, SessionContext};
use crate::work::{CommitMode, OrchestratorStats, WorkFuture, WorkOrchestrator};
use crate::worker::{ChangesetWorker, IndexingContext, StreamWorker};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{Query, QueryParser};
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument};

const BACKEND_NAME: &str = "tantivy";
const DEFAULT_LIMIT: u64 = 10;

/// Shared state of the embedded backend: configuration, analyzers and the
/// writer budget every index manager draws from.
pub struct TantivyBackend {
    config: TantivyConfig,
    strategy: MultiTenancyStrategy,
    lifecycle: LifecycleStrategy,
    budget: WriterBudget,
    analysis: AnalysisRegistry,
    managers: ManagerRegistry<TantivyIndexManager>,
}

impl TantivyBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Self::with_analysis(config, AnalysisRegistry::default())
    }

    /// Like [`TantivyBackend::new`] with a custom set of analyzers.
    pub fn with_analysis(config: &BackendConfig, analysis: AnalysisRegistry) -> Result<Self> {
        config.validate()?;
        let budget = WriterBudget::from_config(&config.tantivy);
        budget.validate_heap(config.tantivy.writer_heap_bytes, config.tantivy.writer_threads)?;
        tracing::info!(
            "Tantivy backend ready ({:?} directory, max {} writers)",
            config.tantivy.directory,
            budget.max_concurrent_writers()
        );
        Ok(TantivyBackend {
            config: config.tantivy.clone(),
            strategy: config.multi_tenancy.into(),
            lifecycle: config.lifecycle,
            budget,
            analysis,
            managers: ManagerRegistry::new(),
        })
    }

    pub fn multi_tenancy(&self) -> MultiTenancyStrategy {
        self.strategy
    }

    pub fn budget(&self) -> &WriterBudget {
        &self.budget
    }

    /// Build the schema, open the index according to the lifecycle strategy
    /// and start its write loop.
    pub async fn create_index_manager(
        &self,
        builder: IndexSchemaBuilder,
    ) -> Result<Arc<TantivyIndexManager>> {
        let schema = builder.build()?;
        let index_name = schema.index_name().to_string();
        let reservation = self.managers.reserve(&index_name)?;
        self.analysis.check_schema(&schema)?;

        let model = Arc::new(TantivyIndexModel::from_schema(&schema));
        let index = self.open_index(&index_name, &model)?;
        self.analysis.register_on(&index);
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = ManagedIndexWriter::open(&index, &index_name, &self.budget, &self.config)?;
        let orchestrator = TantivyWorkOrchestrator::start(
            index.clone(),
            reader.clone(),
            writer,
            Arc::clone(&model),
            &self.config,
        );

        let manager = Arc::new(TantivyIndexManager {
            factory: TantivyWorkFactory::new(Arc::clone(&model), self.strategy),
            schema,
            model,
            strategy: self.strategy,
            commit_policy: self.config.commit_policy,
            index,
            reader,
            orchestrator,
        });
        reservation.commit(Arc::clone(&manager));
        Ok(manager)
    }

    fn open_index(&self, index_name: &str, model: &TantivyIndexModel) -> Result<Index> {
        let schema = model.schema().clone();
        let path = match (&self.config.directory, &self.config.root) {
            (DirectoryKind::Heap, _) => {
                tracing::debug!("[TV {}] using an in-memory directory", index_name);
                return Ok(Index::create_in_ram(schema));
            }
            (DirectoryKind::Filesystem, Some(root)) => root.join(index_name),
            (DirectoryKind::Filesystem, None) => {
                return Err(SearchSyncError::Config(
                    "tantivy.root is required for the filesystem directory".into(),
                ));
            }
        };

        match self.lifecycle {
            LifecycleStrategy::None => open_existing(index_name, &path, &schema),
            LifecycleStrategy::Create => {
                std::fs::create_dir_all(&path)?;
                let index = Index::open_or_create(MmapDirectory::open(&path)?, schema)?;
                tracing::info!("[TV {}] opened {}", index_name, path.display());
                Ok(index)
            }
            LifecycleStrategy::DropAndCreate => {
                if path.exists() {
                    tracing::info!("[TV {}] dropping {}", index_name, path.display());
                    std::fs::remove_dir_all(&path)?;
                }
                std::fs::create_dir_all(&path)?;
                let index = Index::create_in_dir(&path, schema)?;
                tracing::info!("[TV {}] created {}", index_name, path.display());
                Ok(index)
            }
        }
    }

    pub fn index_manager(&self, index_name: &str) -> Option<Arc<TantivyIndexManager>> {
        self.managers.get(index_name)
    }

    /// Commit and stop every write loop, releasing their writers.
    pub async fn close(&self) {
        for manager in self.managers.drain() {
            manager.close().await;
        }
    }
}

fn open_existing(index_name: &str, path: &Path, schema: &tantivy::schema::Schema) -> Result<Index> {
    if !path.is_dir() {
        return Err(missing_index(index_name, path));
    }
    let directory = MmapDirectory::open(path)?;
    let exists =
        Index::exists(&directory).map_err(|e| SearchSyncError::Io(e.to_string()))?;
    if !exists {
        return Err(missing_index(index_name, path));
    }
    let index = Index::open(directory)?;
    if index.schema() != *schema {
        return Err(SearchSyncError::Config(format!(
            "index '{}' at {} was created with a different schema",
            index_name,
            path.display()
        )));
    }
    Ok(index)
}

fn missing_index(index_name: &str, path: &Path) -> SearchSyncError {
    SearchSyncError::Config(format!(
        "index '{}' does not exist at {} and the lifecycle strategy does not create it",
        index_name,
        path.display()
    ))
}

/// Entry point for writing to and searching one embedded index.
pub struct TantivyIndexManager {
    schema: Arc<IndexSchema>,
    model: Arc<TantivyIndexModel>,
    strategy: MultiTenancyStrategy,
    commit_policy: CommitPolicy,
    factory: TantivyWorkFactory,
    index: Index,
    reader: IndexReader,
    orchestrator: TantivyWorkOrchestrator,
}

impl TantivyIndexManager {
    pub fn index_name(&self) -> &str {
        self.schema.index_name()
    }

    pub fn model(&self) -> &TantivyIndexModel {
        &self.model
    }

    pub fn create_changeset_worker(
        self: &Arc<Self>,
        session: &SessionContext,
    ) -> Result<ChangesetWorker<Self>> {
        ChangesetWorker::new(Arc::clone(self), session)
    }

    /// Stream workers commit according to the configured commit policy.
    pub fn create_stream_worker(
        self: &Arc<Self>,
        session: &SessionContext,
    ) -> Result<StreamWorker<Self>> {
        StreamWorker::new(Arc::clone(self), session, self.commit_policy)
    }

    /// Parser over the given dotted field paths, using the registered
    /// analyzers.
    pub fn query_parser(&self, default_fields: &[&str]) -> Result<QueryParser> {
        let fields = default_fields
            .iter()
            .map(|path| {
                self.model.field(path).ok_or_else(|| {
                    SearchSyncError::Config(format!(
                        "unknown field '{}' in index '{}'",
                        path,
                        self.index_name()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(QueryParser::for_index(&self.index, fields))
    }

    /// Run `query` against the last committed state, restricted to the
    /// session's tenant.
    pub fn search(
        &self,
        session: &SessionContext,
        query: Box<dyn Query>,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Result<SearchResult> {
        let tenant_id = session.tenant_id();
        self.strategy.check_tenant_id(tenant_id, BACKEND_NAME)?;
        let query = self
            .model
            .decorate_query(query, self.strategy.effective_tenant(tenant_id));

        let searcher = self.reader.searcher();
        let total = searcher.search(&*query, &Count)? as u64;
        let limit = limit.unwrap_or(DEFAULT_LIMIT) as usize;
        if limit == 0 {
            return Ok(SearchResult {
                total,
                hits: Vec::new(),
            });
        }
        let collector = TopDocs::with_limit(limit).and_offset(offset.unwrap_or(0) as usize);
        let top_docs = searcher.search(&*query, &collector)?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            hits.push(SearchHit {
                index: self.index_name().to_string(),
                id: document::stored_id(&self.model, &doc).unwrap_or_default(),
                score: Some(score),
                source: Value::Object(document::stored_source(&self.model, &doc)),
            });
        }
        Ok(SearchResult { total, hits })
    }

    /// Pick up commits made outside the write loop.
    pub fn refresh(&self) -> Result<()> {
        self.reader.reload()?;
        Ok(())
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.orchestrator.stats()
    }

    pub async fn close(&self) {
        self.orchestrator.close().await;
    }
}

impl IndexingContext for TantivyIndexManager {
    type Work = TantivyWork;

    fn backend_name(&self) -> &str {
        BACKEND_NAME
    }

    fn schema(&self) -> &Arc<IndexSchema> {
        &self.schema
    }

    fn multi_tenancy(&self) -> MultiTenancyStrategy {
        self.strategy
    }

    fn add(
        &self,
        tenant_id: Option<&str>,
        reference: &DocumentReference,
        document: DocumentBuilder,
    ) -> Result<TantivyWork> {
        Ok(self.factory.add(tenant_id, &reference.id, document))
    }

    fn update(
        &self,
        tenant_id: Option<&str>,
        reference: &DocumentReference,
        document: DocumentBuilder,
    ) -> Result<TantivyWork> {
        Ok(self.factory.update(tenant_id, &reference.id, document))
    }

    fn delete(&self, tenant_id: Option<&str>, reference: &DocumentReference) -> Result<TantivyWork> {
        Ok(self.factory.delete(tenant_id, &reference.id))
    }

    fn flush(&self) -> TantivyWork {
        self.factory.flush()
    }

    fn optimize(&self) -> TantivyWork {
        self.factory.optimize()
    }

    fn submit(&self, works: Vec<TantivyWork>, mode: CommitMode) -> WorkFuture<()> {
        self.orchestrator.submit(works, mode)
    }
}
