//! Backend dispatch.

pub mod elasticsearch;
mod registry;
pub mod tantivy;

use crate::config::{BackendConfig, BackendKind};
use crate::error::Result;
use crate::tenancy::MultiTenancyStrategy;
use std::sync::Arc;

pub use self::elasticsearch::{ElasticsearchBackend, ElasticsearchIndexManager};
pub use self::tantivy::{TantivyBackend, TantivyIndexManager};

/// The backend selected by [`BackendConfig::backend`].
pub enum Backend {
    Elasticsearch(ElasticsearchBackend),
    Tantivy(TantivyBackend),
}

impl Backend {
    /// Start the configured backend. For Elasticsearch this detects the
    /// server version unless the configuration pins one.
    pub async fn start(config: &BackendConfig) -> Result<Self> {
        match config.backend {
            BackendKind::Elasticsearch => Ok(Backend::Elasticsearch(
                ElasticsearchBackend::connect(config).await?,
            )),
            BackendKind::Tantivy => Ok(Backend::Tantivy(TantivyBackend::new(config)?)),
        }
    }

    /// Elasticsearch backend over an injected client.
    pub async fn elasticsearch_with_client(
        client: Arc<dyn self::elasticsearch::ElasticsearchClient>,
        config: &BackendConfig,
    ) -> Result<Self> {
        Ok(Backend::Elasticsearch(
            ElasticsearchBackend::with_client(client, config).await?,
        ))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Elasticsearch(_) => "elasticsearch",
            Backend::Tantivy(_) => "tantivy",
        }
    }

    pub fn multi_tenancy(&self) -> MultiTenancyStrategy {
        match self {
            Backend::Elasticsearch(backend) => backend.multi_tenancy(),
            Backend::Tantivy(backend) => backend.multi_tenancy(),
        }
    }

    pub fn as_elasticsearch(&self) -> Option<&ElasticsearchBackend> {
        match self {
            Backend::Elasticsearch(backend) => Some(backend),
            Backend::Tantivy(_) => None,
        }
    }

    pub fn as_tantivy(&self) -> Option<&TantivyBackend> {
        match self {
            Backend::Tantivy(backend) => Some(backend),
            Backend::Elasticsearch(_) => None,
        }
    }

    pub async fn close(&self) {
        match self {
            Backend::Elasticsearch(backend) => backend.close().await,
            Backend::Tantivy(backend) => backend.close().await,
        }
    }
}
