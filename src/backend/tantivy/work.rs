use super::document::build_document;
use super::model::TantivyIndexModel;
use crate::document::DocumentBuilder;
use crate::error::Result;
use crate::tenancy::MultiTenancyStrategy;
use crate::types::WorkKind;
use std::sync::Arc;
use tantivy::{IndexWriter, TantivyDocument, Term};

/// A unit of work against the embedded index.
#[derive(Debug, Clone)]
pub enum TantivyWork {
    Add {
        id: String,
        tenant_id: Option<String>,
        document: TantivyDocument,
    },
    /// Delete every document with the same identifier, then add.
    Update {
        id: String,
        tenant_id: Option<String>,
        document: TantivyDocument,
    },
    Delete {
        id: String,
        tenant_id: Option<String>,
    },
    /// Commit pending changes.
    Flush,
    /// Commit, then merge every segment into one.
    Optimize,
}

impl TantivyWork {
    pub fn kind(&self) -> WorkKind {
        match self {
            TantivyWork::Add { .. } => WorkKind::Add,
            TantivyWork::Update { .. } => WorkKind::Update,
            TantivyWork::Delete { .. } => WorkKind::Delete,
            TantivyWork::Flush => WorkKind::Flush,
            TantivyWork::Optimize => WorkKind::Optimize,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            TantivyWork::Add { id, .. }
            | TantivyWork::Update { id, .. }
            | TantivyWork::Delete { id, .. } => Some(id),
            TantivyWork::Flush | TantivyWork::Optimize => None,
        }
    }

    /// Stage a document work on `writer`. Flush and optimize are handled by
    /// the orchestrator and are no-ops here.
    pub fn apply(&self, model: &TantivyIndexModel, writer: &IndexWriter) -> Result<()> {
        match self {
            TantivyWork::Add { document, .. } => {
                writer.add_document(document.clone())?;
            }
            TantivyWork::Update {
                id,
                tenant_id,
                document,
            } => {
                delete(model, writer, tenant_id.as_deref(), id)?;
                writer.add_document(document.clone())?;
            }
            TantivyWork::Delete { id, tenant_id } => {
                delete(model, writer, tenant_id.as_deref(), id)?;
            }
            TantivyWork::Flush | TantivyWork::Optimize => {}
        }
        Ok(())
    }
}

fn delete(
    model: &TantivyIndexModel,
    writer: &IndexWriter,
    tenant_id: Option<&str>,
    id: &str,
) -> Result<()> {
    match tenant_id {
        Some(_) => {
            writer.delete_query(model.document_query(tenant_id, id))?;
        }
        None => {
            writer.delete_term(Term::from_field_text(model.id_field(), id));
        }
    }
    Ok(())
}

/// Builds works for one index.
#[derive(Debug, Clone)]
pub struct TantivyWorkFactory {
    model: Arc<TantivyIndexModel>,
    strategy: MultiTenancyStrategy,
}

impl TantivyWorkFactory {
    pub fn new(model: Arc<TantivyIndexModel>, strategy: MultiTenancyStrategy) -> Self {
        TantivyWorkFactory { model, strategy }
    }

    pub fn add(&self, tenant_id: Option<&str>, id: &str, document: DocumentBuilder) -> TantivyWork {
        let tenant_id = self.strategy.effective_tenant(tenant_id);
        TantivyWork::Add {
            id: id.to_string(),
            tenant_id: tenant_id.map(str::to_string),
            document: build_document(&self.model, document, tenant_id, id),
        }
    }

    pub fn update(&self, tenant_id: Option<&str>, id: &str, document: DocumentBuilder) -> TantivyWork {
        let tenant_id = self.strategy.effective_tenant(tenant_id);
        TantivyWork::Update {
            id: id.to_string(),
            tenant_id: tenant_id.map(str::to_string),
            document: build_document(&self.model, document, tenant_id, id),
        }
    }

    pub fn delete(&self, tenant_id: Option<&str>, id: &str) -> TantivyWork {
        TantivyWork::Delete {
            id: id.to_string(),
            tenant_id: self.strategy.effective_tenant(tenant_id).map(str::to_string),
        }
    }

    pub fn flush(&self) -> TantivyWork {
        TantivyWork::Flush
    }

    pub fn optimize(&self) -> TantivyWork {
        TantivyWork::Optimize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IndexSchemaBuilder;
    use tantivy::Index;

    fn factory(strategy: MultiTenancyStrategy) -> (Arc<crate::model::IndexSchema>, TantivyWorkFactory) {
        let mut builder = IndexSchemaBuilder::new("books");
        let root = builder.root();
        builder.field::<String>(&root, "title");
        let schema = builder.build().unwrap();
        let model = Arc::new(TantivyIndexModel::from_schema(&schema));
        (schema, TantivyWorkFactory::new(model, strategy))
    }

    fn count(index: &Index) -> u64 {
        let reader = index.reader().unwrap();
        reader.reload().unwrap();
        reader.searcher().num_docs()
    }

    #[test]
    fn test_tenant_dropped_without_multi_tenancy() {
        let (schema, factory) = factory(MultiTenancyStrategy::None);
        let work = factory.add(Some("t1"), "1", DocumentBuilder::new(schema));
        assert!(matches!(work, TantivyWork::Add { tenant_id: None, .. }));
        assert_eq!(work.kind(), WorkKind::Add);
        assert_eq!(work.id(), Some("1"));
        assert_eq!(factory.flush().id(), None);
    }

    #[test]
    fn test_delete_is_scoped_to_tenant() {
        let (schema, factory) = factory(MultiTenancyStrategy::Discriminator);
        let index = Index::create_in_ram(factory.model.schema().clone());
        let mut writer: IndexWriter = index.writer_with_num_threads(1, 15_000_000).unwrap();

        for tenant in ["t1", "t2"] {
            factory
                .add(Some(tenant), "1", DocumentBuilder::new(Arc::clone(&schema)))
                .apply(&factory.model, &writer)
                .unwrap();
        }
        writer.commit().unwrap();
        assert_eq!(count(&index), 2);

        factory.delete(Some("t1"), "1").apply(&factory.model, &writer).unwrap();
        writer.commit().unwrap();
        assert_eq!(count(&index), 1);

        factory
            .update(Some("t2"), "1", DocumentBuilder::new(schema))
            .apply(&factory.model, &writer)
            .unwrap();
        writer.commit().unwrap();
        assert_eq!(count(&index), 1);
    }
}
