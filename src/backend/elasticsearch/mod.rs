//! Remote backend speaking the Elasticsearch REST protocol.

pub mod client;
pub mod dialect;
pub mod document;
pub mod mapping;
pub mod orchestrator;
pub mod stub;
pub mod work;

pub use client::{
    ElasticsearchClient, ElasticsearchRequest, ElasticsearchResponse, HttpElasticsearchClient,
    Method,
};
pub use dialect::ServerVersion;
pub use orchestrator::ElasticsearchWorkOrchestrator;
pub use stub::RecordingElasticsearchClient;
pub use work::{
    Elasticsearch5WorkFactory, Elasticsearch6WorkFactory, Elasticsearch7WorkFactory,
    ElasticsearchWork, ElasticsearchWorkFactory,
};

use crate::backend::registry::ManagerRegistry;
use crate::config::{BackendConfig, CommitPolicy, ElasticsearchConfig, LifecycleStrategy};
use crate::document::DocumentBuilder;
use crate::error::Result;
use crate::model::{IndexSchema, IndexSchemaBuilder};
use crate::tenancy::MultiTenancyStrategy;
use crate::types::{DocumentReference, SearchHit, SearchResult, SessionContext};
use crate::work::{CommitMode, OrchestratorStats, WorkFuture, WorkOrchestrator};
use crate::worker::{ChangesetWorker, IndexingContext, StreamWorker};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const BACKEND_NAME: &str = "elasticsearch";

/// Connection to one cluster, shared by the index managers it creates.
pub struct ElasticsearchBackend {
    client: Arc<dyn ElasticsearchClient>,
    factory: Arc<dyn ElasticsearchWorkFactory>,
    version: ServerVersion,
    config: ElasticsearchConfig,
    strategy: MultiTenancyStrategy,
    lifecycle: LifecycleStrategy,
    managers: ManagerRegistry<ElasticsearchIndexManager>,
}

impl ElasticsearchBackend {
    /// Connect over HTTP to the configured cluster.
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let client = HttpElasticsearchClient::new(
            config.elasticsearch.url.clone(),
            Duration::from_millis(config.elasticsearch.request_timeout_ms),
            config.log.pretty_json,
        )?;
        Self::with_client(Arc::new(client), config).await
    }

    /// Use `client` for every request. The version is taken from the
    /// configuration when set, otherwise asked from the cluster.
    pub async fn with_client(
        client: Arc<dyn ElasticsearchClient>,
        config: &BackendConfig,
    ) -> Result<Self> {
        config.validate()?;
        let version = match &config.elasticsearch.version {
            Some(configured) => ServerVersion::parse(configured)?,
            None => dialect::detect_version(client.as_ref()).await?,
        };
        let factory = dialect::work_factory_for(version)?;
        tracing::info!(
            "Elasticsearch backend ready (version {}, dialect {})",
            version,
            factory.dialect_name()
        );
        Ok(ElasticsearchBackend {
            client,
            factory,
            version,
            config: config.elasticsearch.clone(),
            strategy: config.multi_tenancy.into(),
            lifecycle: config.lifecycle,
            managers: ManagerRegistry::new(),
        })
    }

    pub fn version(&self) -> ServerVersion {
        self.version
    }

    pub fn dialect_name(&self) -> &'static str {
        self.factory.dialect_name()
    }

    pub fn multi_tenancy(&self) -> MultiTenancyStrategy {
        self.strategy
    }

    /// Build the schema, start the index's orchestrator and apply the
    /// lifecycle strategy.
    pub async fn create_index_manager(
        &self,
        builder: IndexSchemaBuilder,
    ) -> Result<Arc<ElasticsearchIndexManager>> {
        let schema = builder.build()?;
        let index_name = schema.index_name().to_string();
        let reservation = self.managers.reserve(&index_name)?;

        let orchestrator =
            ElasticsearchWorkOrchestrator::start(&index_name, Arc::clone(&self.client), &self.config);
        let manager = Arc::new(ElasticsearchIndexManager {
            schema,
            strategy: self.strategy,
            client: Arc::clone(&self.client),
            factory: Arc::clone(&self.factory),
            orchestrator,
        });

        if let Err(e) = manager.apply_lifecycle(self.lifecycle).await {
            manager.close().await;
            return Err(e);
        }
        reservation.commit(Arc::clone(&manager));
        Ok(manager)
    }

    pub fn index_manager(&self, index_name: &str) -> Option<Arc<ElasticsearchIndexManager>> {
        self.managers.get(index_name)
    }

    /// Drain every orchestrator.
    pub async fn close(&self) {
        for manager in self.managers.drain() {
            manager.close().await;
        }
    }
}

/// Entry point for writing to and searching one Elasticsearch index.
pub struct ElasticsearchIndexManager {
    schema: Arc<IndexSchema>,
    strategy: MultiTenancyStrategy,
    client: Arc<dyn ElasticsearchClient>,
    factory: Arc<dyn ElasticsearchWorkFactory>,
    orchestrator: ElasticsearchWorkOrchestrator,
}

impl std::fmt::Debug for ElasticsearchIndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchIndexManager")
            .field("index_name", &self.schema.index_name())
            .finish_non_exhaustive()
    }
}

impl ElasticsearchIndexManager {
    pub fn index_name(&self) -> &str {
        self.schema.index_name()
    }

    /// Typeless mapping sent on index creation.
    pub fn mapping(&self) -> Value {
        mapping::root_mapping(&self.schema, self.strategy)
    }

    async fn apply_lifecycle(&self, lifecycle: LifecycleStrategy) -> Result<()> {
        let index = self.index_name();
        match lifecycle {
            LifecycleStrategy::None => Ok(()),
            LifecycleStrategy::Create => {
                let request = self.factory.index_exists(index);
                let response = self.client.execute(request.clone()).await?;
                if response.status == 404 {
                    tracing::info!("[ES {}] creating index", index);
                    let create = self.factory.create_index(index, self.mapping());
                    self.orchestrator
                        .submit(vec![create], CommitMode::Immediate)
                        .await
                } else {
                    response.into_result(&request)?;
                    tracing::info!("[ES {}] index already exists", index);
                    Ok(())
                }
            }
            LifecycleStrategy::DropAndCreate => {
                tracing::info!("[ES {}] dropping and re-creating index", index);
                let works = vec![
                    self.factory.drop_index_if_exists(index),
                    self.factory.create_index(index, self.mapping()),
                ];
                self.orchestrator.submit(works, CommitMode::Immediate).await
            }
        }
    }

    pub fn create_changeset_worker(
        self: &Arc<Self>,
        session: &SessionContext,
    ) -> Result<ChangesetWorker<Self>> {
        ChangesetWorker::new(Arc::clone(self), session)
    }

    /// Every call is sent as its own batch; the cluster has no commit to defer.
    pub fn create_stream_worker(
        self: &Arc<Self>,
        session: &SessionContext,
    ) -> Result<StreamWorker<Self>> {
        StreamWorker::new(Arc::clone(self), session, CommitPolicy::PerOperation)
    }

    /// Make recent writes visible to search.
    pub fn refresh(&self) -> WorkFuture<()> {
        let work = self.factory.refresh(self.index_name());
        self.orchestrator.submit(vec![work], CommitMode::Immediate)
    }

    /// Run `query` (the JSON `query` clause) restricted to the session's tenant.
    pub async fn search(
        &self,
        session: &SessionContext,
        query: Value,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Result<SearchResult> {
        let tenant_id = session.tenant_id();
        self.strategy.check_tenant_id(tenant_id, BACKEND_NAME)?;
        let query = self.strategy.decorate_json_query(query, tenant_id);
        let work = self
            .factory
            .search(&[self.index_name()], query, offset, limit);
        let response = work.execute(self.client.as_ref()).await?;

        let hits = response
            .hits
            .iter()
            .map(|hit| SearchHit {
                index: hit["_index"]
                    .as_str()
                    .unwrap_or(self.index_name())
                    .to_string(),
                id: self
                    .strategy
                    .from_elasticsearch_id(tenant_id, hit["_id"].as_str().unwrap_or_default()),
                score: hit["_score"].as_f64().map(|s| s as f32),
                source: hit["_source"].clone(),
            })
            .collect();
        Ok(SearchResult {
            total: response.total,
            hits,
        })
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.orchestrator.stats()
    }

    pub async fn close(&self) {
        self.orchestrator.close().await;
    }

    fn document_work(
        &self,
        tenant_id: Option<&str>,
        reference: &DocumentReference,
        document: DocumentBuilder,
        update: bool,
    ) -> ElasticsearchWork {
        let id = self.strategy.to_elasticsearch_id(tenant_id, &reference.id);
        let source = document::build_json(document, self.strategy, tenant_id, &reference.id);
        let routing = reference.routing_key.as_deref();
        if update {
            self.factory
                .update(self.index_name(), &id, routing, Value::Object(source))
        } else {
            self.factory
                .add(self.index_name(), &id, routing, Value::Object(source))
        }
    }
}

impl IndexingContext for ElasticsearchIndexManager {
    type Work = ElasticsearchWork;

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
    ) -> Result<ElasticsearchWork> {
        Ok(self.document_work(tenant_id, reference, document, false))
    }

    fn update(
        &self,
        tenant_id: Option<&str>,
        reference: &DocumentReference,
        document: DocumentBuilder,
    ) -> Result<ElasticsearchWork> {
        Ok(self.document_work(tenant_id, reference, document, true))
    }

    fn delete(
        &self,
        tenant_id: Option<&str>,
        reference: &DocumentReference,
    ) -> Result<ElasticsearchWork> {
        let id = self.strategy.to_elasticsearch_id(tenant_id, &reference.id);
        Ok(self
            .factory
            .delete(self.index_name(), &id, reference.routing_key.as_deref()))
    }

    fn flush(&self) -> ElasticsearchWork {
        self.factory.flush(self.index_name())
    }

    fn optimize(&self) -> ElasticsearchWork {
        self.factory.optimize(self.index_name())
    }

    fn submit(&self, works: Vec<ElasticsearchWork>, mode: CommitMode) -> WorkFuture<()> {
        self.orchestrator.submit(works, mode)
    }
}
