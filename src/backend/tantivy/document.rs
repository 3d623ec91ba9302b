use super::model::{FieldTarget, TantivyIndexModel, ID_FIELD, TENANT_ID_FIELD};
use crate::document::{DocumentBuilder, ElementTree, Slot};
use crate::model::{FieldValue, IndexSchema};
use serde_json::{Map, Value};
use tantivy::schema::Value as _;
use tantivy::{DateTime, Document as _, TantivyDocument};

/// Consume `builder` into a Tantivy document carrying the tenant, when
/// given, and then the identifier.
pub fn build_document(
    model: &TantivyIndexModel,
    builder: DocumentBuilder,
    tenant_id: Option<&str>,
    id: &str,
) -> TantivyDocument {
    let schema = builder.schema().clone();
    let tree = builder.into_tree();
    let mut document = TantivyDocument::default();
    if let Some(tenant) = tenant_id {
        document.add_text(model.tenant_field(), tenant);
    }
    document.add_text(model.id_field(), id);
    add_tree(model, &schema, &tree, &mut document);
    document
}

fn add_tree(
    model: &TantivyIndexModel,
    schema: &IndexSchema,
    tree: &ElementTree,
    document: &mut TantivyDocument,
) {
    for (_, slot) in tree.slots() {
        match slot {
            Slot::Value { field, value } => {
                let Some(target) = model.target(*field) else {
                    continue;
                };
                if let Some(node) = schema.scalar(*field) {
                    if !node.kind.accepts(value) {
                        continue;
                    }
                }
                add_value(document, target, value);
            }
            // Missing markers leave no trace in an inverted index.
            Slot::Objects { entries, .. } => {
                for child in entries.iter().flatten() {
                    add_tree(model, schema, child, document);
                }
            }
        }
    }
}

fn add_value(document: &mut TantivyDocument, target: FieldTarget, value: &FieldValue) {
    match (target, value) {
        (FieldTarget::GeoPoint { lat, lon }, FieldValue::GeoPoint(point)) => {
            document.add_f64(lat, point.lat);
            document.add_f64(lon, point.lon);
        }
        (FieldTarget::GeoPoint { .. }, _) => {}
        (FieldTarget::Single(field), value) => match value {
            FieldValue::String(s) => document.add_text(field, s),
            FieldValue::Integer(i) => document.add_i64(field, i64::from(*i)),
            FieldValue::Long(l) => document.add_i64(field, *l),
            FieldValue::Double(d) => document.add_f64(field, *d),
            FieldValue::Boolean(b) => document.add_bool(field, *b),
            FieldValue::Date(d) => {
                let seconds = d.and_time(chrono::NaiveTime::default()).and_utc().timestamp();
                document.add_date(field, DateTime::from_timestamp_secs(seconds));
            }
            FieldValue::GeoPoint(_) => {}
        },
    }
}

/// Stored fields of `document` as a JSON object, internal fields removed.
///
/// Single values are unwrapped; repeated ones stay arrays.
pub fn stored_source(model: &TantivyIndexModel, document: &TantivyDocument) -> Map<String, Value> {
    let rendered = document.to_json(model.schema());
    let mut source = match serde_json::from_str::<Value>(&rendered) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    source.remove(ID_FIELD);
    source.remove(TENANT_ID_FIELD);
    for value in source.values_mut() {
        if let Value::Array(items) = value {
            if items.len() == 1 {
                *value = items.remove(0);
            }
        }
    }
    source
}

/// The stored identifier of `document`.
pub fn stored_id(model: &TantivyIndexModel, document: &TantivyDocument) -> Option<String> {
    document
        .get_first(model.id_field())
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentElement;
    use crate::model::{IndexFieldAccessor, IndexObjectFieldAccessor, IndexSchemaBuilder, ObjectStorage};
    use crate::types::GeoPoint;
    use chrono::NaiveDate;
    use std::sync::Arc;

    struct Books {
        schema: Arc<IndexSchema>,
        model: TantivyIndexModel,
        title: IndexFieldAccessor<String>,
        pages: IndexFieldAccessor<i32>,
        published: IndexFieldAccessor<NaiveDate>,
        location: IndexFieldAccessor<GeoPoint>,
        author: IndexObjectFieldAccessor,
        author_name: IndexFieldAccessor<String>,
    }

    fn books() -> Books {
        let mut builder = IndexSchemaBuilder::new("books");
        let root = builder.root();
        let title = builder.field::<String>(&root, "title").analyzer("standard").handle();
        let pages = builder.field::<i32>(&root, "pages").handle();
        let published = builder.field::<NaiveDate>(&root, "published").handle();
        let location = builder.field::<GeoPoint>(&root, "location").handle();
        let author = builder.object_field(&root, "author", ObjectStorage::Flattened);
        let author_name = builder.field::<String>(&author, "name").handle();
        let schema = builder.build().unwrap();
        Books {
            model: TantivyIndexModel::from_schema(&schema),
            title: schema.accessor(&title).unwrap(),
            pages: schema.accessor(&pages).unwrap(),
            published: schema.accessor(&published).unwrap(),
            location: schema.accessor(&location).unwrap(),
            author: schema.object_accessor(&author).unwrap(),
            author_name: schema.accessor(&author_name).unwrap(),
            schema,
        }
    }

    #[test]
    fn test_document_fields_and_source() {
        let b = books();
        let mut builder = DocumentBuilder::new(Arc::clone(&b.schema));
        let root: &mut dyn DocumentElement = builder.root();
        b.title.write(root, Some("Dune".to_string()));
        b.pages.write(root, Some(412));
        b.published.write(root, NaiveDate::from_ymd_opt(1965, 8, 1));
        b.location.write(root, Some(GeoPoint::new(45.5, -73.6)));
        for name in ["Frank", "Brian"] {
            let author = b.author.add(root);
            b.author_name.write(author, Some(name.to_string()));
        }
        b.author.add_missing(root);

        let doc = build_document(&b.model, builder, Some("t1"), "42");
        assert_eq!(stored_id(&b.model, &doc).as_deref(), Some("42"));

        let source = stored_source(&b.model, &doc);
        assert_eq!(source["title"], "Dune");
        assert_eq!(source["pages"], 412);
        assert_eq!(source["location.lat"], 45.5);
        assert_eq!(source["author.name"], serde_json::json!(["Frank", "Brian"]));
        assert!(source["published"].as_str().unwrap().starts_with("1965-08-01"));
        assert!(source.get(ID_FIELD).is_none());
        assert!(source.get(TENANT_ID_FIELD).is_none());
    }

    #[test]
    fn test_tenant_precedes_identifier() {
        let b = books();
        let mut builder = DocumentBuilder::new(Arc::clone(&b.schema));
        b.title.write(builder.root(), Some("Dune".to_string()));
        let doc = build_document(&b.model, builder, Some("t1"), "42");
        let fields: Vec<_> = doc.field_values().map(|(field, _)| field).take(2).collect();
        assert_eq!(fields, vec![b.model.tenant_field(), b.model.id_field()]);
    }

    #[test]
    fn test_without_tenant() {
        let b = books();
        let builder = DocumentBuilder::new(Arc::clone(&b.schema));
        let doc = build_document(&b.model, builder, None, "1");
        assert!(doc.get_first(b.model.tenant_field()).is_none());
        assert!(stored_source(&b.model, &doc).is_empty());
    }
}
