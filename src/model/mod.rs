pub mod accessor;
pub mod field;
pub mod schema;

pub use accessor::{IndexFieldAccessor, IndexObjectFieldAccessor};
pub use field::{
    FieldKind, FieldTypeRegistry, FieldValue, IndexableValue, Sortable, Store, ValueType,
};
pub use schema::{
    FieldHandle, IndexSchema, IndexSchemaBuilder, NodeId, ObjectFieldHandle, ObjectNode,
    ObjectStorage, ScalarFieldNode, ScalarFieldOptions, SchemaNode,
};
