//! # searchsync
//!
//! Keeps full-text indexes in sync with entity changes. Entities are turned
//! into documents through a typed index schema, documents into backend
//! works, and works are applied in order by one orchestrator per index.
//!
//! Two backends are available: an embedded [Tantivy](https://github.com/quickwit-oss/tantivy)
//! index, and a remote Elasticsearch cluster reached over HTTP.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use searchsync::backend::TantivyBackend;
//! use searchsync::model::IndexSchemaBuilder;
//! use searchsync::worker::{ChangesetIndexWorker, IndexWorker, IndexingContext};
//! use searchsync::{BackendConfig, DocumentElement, DocumentReference, SessionContext};
//!
//! # async fn run() -> searchsync::Result<()> {
//! let backend = TantivyBackend::new(&BackendConfig::default())?;
//!
//! let mut builder = IndexSchemaBuilder::new("books");
//! let root = builder.root();
//! let title = builder.field::<String>(&root, "title").analyzer("english").handle();
//! let manager = backend.create_index_manager(builder).await?;
//!
//! let title = manager.schema().accessor(&title)?;
//! let mut worker = manager.create_changeset_worker(&SessionContext::new())?;
//! worker.add(DocumentReference::new("1"), &move |root: &mut dyn DocumentElement| {
//!     title.write(root, Some("Dune".to_string()))
//! })?;
//! worker.execute().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Multi-tenancy
//!
//! With [`MultiTenancyConfig::Discriminator`] every document is tagged with
//! its tenant, deletes and searches are scoped to it, and workers refuse to
//! start without a tenant in their [`SessionContext`].

pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod logging;
pub mod model;
pub mod tenancy;
pub mod types;
pub mod work;
pub mod worker;

pub use backend::Backend;
pub use config::{BackendConfig, CommitPolicy, LifecycleStrategy, MultiTenancyConfig};
pub use document::{DocumentBuilder, DocumentContributor, DocumentElement};
pub use error::{Result, SearchSyncError};
pub use tenancy::MultiTenancyStrategy;
pub use types::*;
pub use work::{CommitMode, OrchestratorStats, WorkFuture, WorkOrchestrator};
