//! Translation of an [`IndexSchema`] into a Tantivy schema.
//!
//! Object fields have no Tantivy counterpart: their scalar leaves become
//! top-level fields named by their dotted path, multi-valued when the object
//! repeats. Geo points are split into `<path>.lat` and `<path>.lon`.

use super::analysis::AnalysisRegistry;
use crate::model::{FieldKind, IndexSchema, NodeId, ScalarFieldNode, Sortable, Store};
use std::collections::HashMap;
use tantivy::query::{BooleanQuery, ConstScoreQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    DateOptions, Field, IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions,
    STORED, STRING,
};
use tantivy::Term;

/// Stored identifier as given by the mapper, never tenant-prefixed.
pub const ID_FIELD: &str = "__id";
pub const TENANT_ID_FIELD: &str = "__tenant_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTarget {
    Single(Field),
    GeoPoint { lat: Field, lon: Field },
}

/// A built Tantivy schema plus the lookup from schema nodes to its fields.
#[derive(Debug, Clone)]
pub struct TantivyIndexModel {
    schema: Schema,
    id_field: Field,
    tenant_field: Field,
    targets: HashMap<NodeId, FieldTarget>,
    paths: HashMap<String, FieldTarget>,
}

impl TantivyIndexModel {
    pub fn from_schema(index_schema: &IndexSchema) -> Self {
        let mut builder = Schema::builder();
        let id_field = builder.add_text_field(ID_FIELD, STRING | STORED);
        let tenant_field = builder.add_text_field(TENANT_ID_FIELD, STRING | STORED);

        let mut targets = HashMap::new();
        let mut paths = HashMap::new();
        for (node, field) in index_schema.scalar_fields() {
            let target = add_field(&mut builder, field);
            targets.insert(node, target);
            paths.insert(field.path.clone(), target);
        }

        TantivyIndexModel {
            schema: builder.build(),
            id_field,
            tenant_field,
            targets,
            paths,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn id_field(&self) -> Field {
        self.id_field
    }

    pub fn tenant_field(&self) -> Field {
        self.tenant_field
    }

    pub fn target(&self, node: NodeId) -> Option<FieldTarget> {
        self.targets.get(&node).copied()
    }

    /// Tantivy field for a dotted path; geo points resolve by `<path>.lat`
    /// and `<path>.lon`.
    pub fn field(&self, path: &str) -> Option<Field> {
        match self.paths.get(path) {
            Some(FieldTarget::Single(field)) => Some(*field),
            _ => self.schema.get_field(path).ok(),
        }
    }

    /// Query matching exactly one document of `tenant_id`.
    pub fn document_query(&self, tenant_id: Option<&str>, id: &str) -> Box<dyn Query> {
        let id_query: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(self.id_field, id),
            IndexRecordOption::Basic,
        ));
        match tenant_id {
            Some(tenant) => Box::new(BooleanQuery::new(vec![
                (Occur::Must, id_query),
                (Occur::Must, self.tenant_term_query(tenant)),
            ])),
            None => id_query,
        }
    }

    /// Restrict `query` to `tenant_id`'s documents without affecting scores.
    pub fn decorate_query(&self, query: Box<dyn Query>, tenant_id: Option<&str>) -> Box<dyn Query> {
        match tenant_id {
            Some(tenant) => Box::new(BooleanQuery::new(vec![
                (Occur::Must, query),
                (
                    Occur::Must,
                    Box::new(ConstScoreQuery::new(self.tenant_term_query(tenant), 0.0)),
                ),
            ])),
            None => query,
        }
    }

    fn tenant_term_query(&self, tenant: &str) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            Term::from_field_text(self.tenant_field, tenant),
            IndexRecordOption::Basic,
        ))
    }
}

fn add_field(builder: &mut tantivy::schema::SchemaBuilder, field: &ScalarFieldNode) -> FieldTarget {
    let stored = !matches!(field.store, Store::No);
    let fast = matches!(field.sortable, Sortable::Yes);
    let path = field.path.as_str();

    match &field.kind {
        FieldKind::Text { .. } | FieldKind::Keyword { .. } => {
            let tokenizer = AnalysisRegistry::tokenizer_name(&field.kind)
                .unwrap_or_else(|| super::analysis::RAW_TOKENIZER.to_string());
            let record = match field.kind {
                FieldKind::Text { .. } => IndexRecordOption::WithFreqsAndPositions,
                _ => IndexRecordOption::Basic,
            };
            let mut options = TextOptions::default().set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(&tokenizer)
                    .set_index_option(record),
            );
            if stored {
                options = options.set_stored();
            }
            if fast {
                options = options.set_fast(Some(&tokenizer));
            }
            FieldTarget::Single(builder.add_text_field(path, options))
        }
        FieldKind::Integer | FieldKind::Long => {
            FieldTarget::Single(builder.add_i64_field(path, numeric_options(stored, fast)))
        }
        FieldKind::Double => {
            FieldTarget::Single(builder.add_f64_field(path, numeric_options(stored, fast)))
        }
        FieldKind::Boolean => {
            FieldTarget::Single(builder.add_bool_field(path, numeric_options(stored, fast)))
        }
        FieldKind::Date => {
            let mut options = DateOptions::default().set_indexed();
            if stored {
                options = options.set_stored();
            }
            if fast {
                options = options.set_fast();
            }
            FieldTarget::Single(builder.add_date_field(path, options))
        }
        FieldKind::GeoPoint => {
            let lat = builder.add_f64_field(&format!("{}.lat", path), numeric_options(stored, fast));
            let lon = builder.add_f64_field(&format!("{}.lon", path), numeric_options(stored, fast));
            FieldTarget::GeoPoint { lat, lon }
        }
    }
}

fn numeric_options(stored: bool, fast: bool) -> NumericOptions {
    let mut options = NumericOptions::default().set_indexed();
    if stored {
        options = options.set_stored();
    }
    if fast {
        options = options.set_fast();
    }
    options
}
