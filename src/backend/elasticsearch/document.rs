//! JSON rendering of built documents.

use crate::document::{DocumentBuilder, ElementTree, Slot};
use crate::model::IndexSchema;
use crate::tenancy::MultiTenancyStrategy;
use serde_json::{Map, Value};

/// Consume `builder` into the JSON source of an Elasticsearch document.
///
/// User fields come first, in insertion order, followed by the tenant
/// discriminator and the identifier when multi-tenancy is enabled.
pub fn build_json(
    builder: DocumentBuilder,
    strategy: MultiTenancyStrategy,
    tenant_id: Option<&str>,
    id: &str,
) -> Map<String, Value> {
    let schema = builder.schema().clone();
    let tree = builder.into_tree();
    let mut document = render_object(&schema, &tree);
    strategy.contribute_to_document(&mut document, tenant_id, id);
    document
}

fn render_object(schema: &IndexSchema, tree: &ElementTree) -> Map<String, Value> {
    let mut object = Map::new();
    for (name, slot) in tree.slots() {
        match slot {
            Slot::Value { field, value } => {
                let Some(node) = schema.scalar(*field) else {
                    continue;
                };
                if let Some(encoded) = node.kind.encode_json(value) {
                    object.insert(name.to_string(), encoded);
                }
            }
            Slot::Objects { entries, .. } => {
                let mut rendered: Vec<Value> = entries
                    .iter()
                    .map(|entry| match entry {
                        Some(child) => Value::Object(render_object(schema, child)),
                        None => Value::Null,
                    })
                    .collect();
                let value = if rendered.len() == 1 {
                    rendered.remove(0)
                } else {
                    Value::Array(rendered)
                };
                object.insert(name.to_string(), value);
            }
        }
    }
    object
}
