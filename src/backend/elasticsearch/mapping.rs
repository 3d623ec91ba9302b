//! Translation of an [`IndexSchema`] into an Elasticsearch root mapping.

use crate::model::{
    FieldKind, IndexSchema, NodeId, ObjectStorage, SchemaNode, ScalarFieldNode, Sortable, Store,
};
use crate::tenancy::MultiTenancyStrategy;
use serde_json::{json, Map, Value};

/// Typeless root mapping; dialects wrap it as needed.
pub fn root_mapping(schema: &IndexSchema, strategy: MultiTenancyStrategy) -> Value {
    let mut mapping = Map::new();
    mapping.insert("dynamic".into(), json!("strict"));
    if schema.explicit_routing() {
        mapping.insert("_routing".into(), json!({"required": true}));
    }

    let mut properties = Map::new();
    strategy.contribute_to_mapping(&mut properties);
    contribute_children(schema, &schema.root().children, &mut properties);
    mapping.insert("properties".into(), Value::Object(properties));
    Value::Object(mapping)
}

fn contribute_children(schema: &IndexSchema, children: &[NodeId], properties: &mut Map<String, Value>) {
    for child in children {
        match schema.node(*child) {
            SchemaNode::Object(object) => {
                let mut nested = Map::new();
                contribute_children(schema, &object.children, &mut nested);
                let object_type = match object.storage {
                    ObjectStorage::Flattened => "object",
                    ObjectStorage::Nested => "nested",
                };
                properties.insert(
                    object.name.clone(),
                    json!({
                        "type": object_type,
                        "dynamic": "strict",
                        "properties": nested
                    }),
                );
            }
            SchemaNode::Scalar(field) => {
                properties.insert(field.name.clone(), scalar_mapping(field));
            }
        }
    }
}

fn scalar_mapping(field: &ScalarFieldNode) -> Value {
    let mut mapping = Map::new();
    match &field.kind {
        FieldKind::Text { analyzer } => {
            mapping.insert("type".into(), json!("text"));
            mapping.insert("analyzer".into(), json!(analyzer));
        }
        FieldKind::Keyword { normalizer } => {
            mapping.insert("type".into(), json!("keyword"));
            if let Some(normalizer) = normalizer {
                mapping.insert("normalizer".into(), json!(normalizer));
            }
        }
        FieldKind::Date => {
            mapping.insert("type".into(), json!("date"));
            mapping.insert("format".into(), json!("strict_date||yyyyyyyyy-MM-dd"));
        }
        other => {
            mapping.insert("type".into(), json!(other.name()));
        }
    }

    match field.store {
        Store::Default => {}
        Store::No => {
            mapping.insert("store".into(), json!(false));
        }
        Store::Yes | Store::Compress => {
            mapping.insert("store".into(), json!(true));
        }
    }

    match field.sortable {
        Sortable::Default => {}
        Sortable::No => {
            mapping.insert("doc_values".into(), json!(false));
        }
        Sortable::Yes => {
            mapping.insert("doc_values".into(), json!(true));
        }
    }

    if let Some(null_value) = &field.null_value {
        if let Some(encoded) = field.kind.encode_json(null_value) {
            mapping.insert("null_value".into(), encoded);
        }
    }

    Value::Object(mapping)
}
