//! Index schema: a builder that accumulates field declarations and an
//! immutable arena produced by [`IndexSchemaBuilder::build`].

use crate::error::{Result, SearchSyncError};
use crate::model::accessor::{IndexFieldAccessor, IndexObjectFieldAccessor};
use crate::model::field::{
    FieldKind, FieldTypeRegistry, FieldValue, IndexableValue, Sortable, Store, ValueType,
};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SCHEMA_ID: AtomicU64 = AtomicU64::new(1);

/// Position of a node in an [`IndexSchema`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectStorage {
    /// Sub-fields are merged into the parent document.
    #[default]
    Flattened,
    /// Each object is indexed as a separate hidden document.
    Nested,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    pub name: String,
    pub path: String,
    pub parent: Option<NodeId>,
    pub storage: ObjectStorage,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarFieldNode {
    pub name: String,
    pub path: String,
    pub parent: NodeId,
    pub kind: FieldKind,
    pub store: Store,
    pub sortable: Sortable,
    /// Written in place of an absent value.
    pub null_value: Option<FieldValue>,
}

impl ScalarFieldNode {
    pub fn is_sortable(&self) -> bool {
        self.sortable == Sortable::Yes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Object(ObjectNode),
    Scalar(ScalarFieldNode),
}

impl SchemaNode {
    pub fn name(&self) -> &str {
        match self {
            SchemaNode::Object(o) => &o.name,
            SchemaNode::Scalar(s) => &s.name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            SchemaNode::Object(o) => &o.path,
            SchemaNode::Scalar(s) => &s.path,
        }
    }
}

/// Immutable description of one index. Shared read-only through `Arc`.
#[derive(Debug)]
pub struct IndexSchema {
    schema_id: u64,
    index_name: String,
    nodes: Vec<SchemaNode>,
    explicit_routing: bool,
}

impl IndexSchema {
    pub fn builder(index_name: impl Into<String>) -> IndexSchemaBuilder {
        IndexSchemaBuilder::new(index_name)
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn explicit_routing(&self) -> bool {
        self.explicit_routing
    }

    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    pub fn root(&self) -> &ObjectNode {
        match &self.nodes[0] {
            SchemaNode::Object(o) => o,
            SchemaNode::Scalar(_) => unreachable!("root node is always an object"),
        }
    }

    pub fn object(&self, id: NodeId) -> Option<&ObjectNode> {
        match self.nodes.get(id.0) {
            Some(SchemaNode::Object(o)) => Some(o),
            _ => None,
        }
    }

    pub fn scalar(&self, id: NodeId) -> Option<&ScalarFieldNode> {
        match self.nodes.get(id.0) {
            Some(SchemaNode::Scalar(s)) => Some(s),
            _ => None,
        }
    }

    /// Every scalar leaf, in declaration order.
    pub fn scalar_fields(&self) -> impl Iterator<Item = (NodeId, &ScalarFieldNode)> {
        self.nodes.iter().enumerate().filter_map(|(i, n)| match n {
            SchemaNode::Scalar(s) => Some((NodeId(i), s)),
            SchemaNode::Object(_) => None,
        })
    }

    pub fn field_by_path(&self, path: &str) -> Option<(NodeId, &SchemaNode)> {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, n)| n.path() == path)
            .map(|(i, n)| (NodeId(i), n))
    }

    /// Bind a field handle declared on this schema's builder.
    pub fn accessor<T: IndexableValue>(
        self: &Arc<Self>,
        handle: &FieldHandle<T>,
    ) -> Result<IndexFieldAccessor<T>> {
        self.check_handle(handle.schema_id)?;
        Ok(IndexFieldAccessor::new(Arc::clone(self), handle.node))
    }

    pub fn object_accessor(
        self: &Arc<Self>,
        handle: &ObjectFieldHandle,
    ) -> Result<IndexObjectFieldAccessor> {
        self.check_handle(handle.schema_id)?;
        if handle.node == NodeId::ROOT {
            return Err(SearchSyncError::Config(
                "the schema root has no object accessor".into(),
            ));
        }
        Ok(IndexObjectFieldAccessor::new(Arc::clone(self), handle.node))
    }

    fn check_handle(&self, schema_id: u64) -> Result<()> {
        if schema_id != self.schema_id {
            return Err(SearchSyncError::ForeignFieldHandle(self.index_name.clone()));
        }
        Ok(())
    }
}

/// Unresolved reference to a scalar field, returned at declaration time.
pub struct FieldHandle<T> {
    schema_id: u64,
    node: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for FieldHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FieldHandle<T> {}

impl<T> std::fmt::Debug for FieldHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldHandle")
            .field("schema_id", &self.schema_id)
            .field("node", &self.node)
            .finish()
    }
}

/// Unresolved reference to an object field (or the schema root).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectFieldHandle {
    schema_id: u64,
    node: NodeId,
}

struct PendingScalar {
    name: String,
    parent: NodeId,
    value_type: std::result::Result<ValueType, String>,
    analyzer: Option<String>,
    normalizer: Option<String>,
    store: Store,
    sortable: Sortable,
    null_value: Option<FieldValue>,
}

struct PendingObject {
    name: String,
    parent: Option<NodeId>,
    storage: ObjectStorage,
}

enum PendingNode {
    Object(PendingObject),
    Scalar(PendingScalar),
}

impl PendingNode {
    fn name(&self) -> &str {
        match self {
            PendingNode::Object(o) => &o.name,
            PendingNode::Scalar(s) => &s.name,
        }
    }

    fn parent(&self) -> Option<NodeId> {
        match self {
            PendingNode::Object(o) => o.parent,
            PendingNode::Scalar(s) => Some(s.parent),
        }
    }
}

/// Mutable accumulator for an index schema.
///
/// Declarations never fail; every configuration check runs in [`build`].
///
/// [`build`]: IndexSchemaBuilder::build
pub struct IndexSchemaBuilder {
    schema_id: u64,
    index_name: String,
    registry: FieldTypeRegistry,
    nodes: Vec<PendingNode>,
    explicit_routing: bool,
    deferred_errors: Vec<SearchSyncError>,
}

impl IndexSchemaBuilder {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self::with_registry(index_name, FieldTypeRegistry::default())
    }

    pub fn with_registry(index_name: impl Into<String>, registry: FieldTypeRegistry) -> Self {
        IndexSchemaBuilder {
            schema_id: NEXT_SCHEMA_ID.fetch_add(1, Ordering::Relaxed),
            index_name: index_name.into(),
            registry,
            nodes: vec![PendingNode::Object(PendingObject {
                name: String::new(),
                parent: None,
                storage: ObjectStorage::Flattened,
            })],
            explicit_routing: false,
            deferred_errors: Vec::new(),
        }
    }

    pub fn root(&self) -> ObjectFieldHandle {
        ObjectFieldHandle {
            schema_id: self.schema_id,
            node: NodeId::ROOT,
        }
    }

    /// Require a routing key on every document of this index.
    pub fn explicit_routing(&mut self) -> &mut Self {
        self.explicit_routing = true;
        self
    }

    pub fn field<T: IndexableValue>(
        &mut self,
        parent: &ObjectFieldHandle,
        name: impl Into<String>,
    ) -> ScalarFieldOptions<'_, T> {
        self.check_parent(parent);
        let value_type = self
            .registry
            .lookup::<T>()
            .map_err(|_| std::any::type_name::<T>().to_string());
        let node = NodeId(self.nodes.len());
        self.nodes.push(PendingNode::Scalar(PendingScalar {
            name: name.into(),
            parent: parent.node,
            value_type,
            analyzer: None,
            normalizer: None,
            store: Store::Default,
            sortable: Sortable::Default,
            null_value: None,
        }));
        let handle = FieldHandle {
            schema_id: self.schema_id,
            node,
            _marker: PhantomData,
        };
        let pending = match self.nodes.last_mut() {
            Some(PendingNode::Scalar(s)) => s,
            _ => unreachable!("scalar node was just pushed"),
        };
        ScalarFieldOptions { pending, handle }
    }

    pub fn object_field(
        &mut self,
        parent: &ObjectFieldHandle,
        name: impl Into<String>,
        storage: ObjectStorage,
    ) -> ObjectFieldHandle {
        self.check_parent(parent);
        let node = NodeId(self.nodes.len());
        self.nodes.push(PendingNode::Object(PendingObject {
            name: name.into(),
            parent: Some(parent.node),
            storage,
        }));
        ObjectFieldHandle {
            schema_id: self.schema_id,
            node,
        }
    }

    pub fn build(mut self) -> Result<Arc<IndexSchema>> {
        validate_index_name(&self.index_name)?;
        if !self.deferred_errors.is_empty() {
            return Err(self.deferred_errors.remove(0));
        }

        let mut seen: HashSet<(NodeId, &str)> = HashSet::new();
        for (i, pending) in self.nodes.iter().enumerate().skip(1) {
            let name = pending.name();
            if name.is_empty() || name.contains('.') || name.starts_with("__") {
                return Err(SearchSyncError::InvalidFieldName(name.to_string()));
            }
            let parent = pending.parent().unwrap_or(NodeId::ROOT);
            if !matches!(self.nodes.get(parent.0), Some(PendingNode::Object(_))) || parent.0 >= i {
                return Err(SearchSyncError::Config(format!(
                    "field '{}' has an invalid parent",
                    name
                )));
            }
            if !seen.insert((parent, name)) {
                return Err(SearchSyncError::FieldRedefinition {
                    path: self.path_of(NodeId(i)),
                });
            }
        }

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (i, pending) in self.nodes.iter().enumerate() {
            let path = self.path_of(NodeId(i));
            let node = match pending {
                PendingNode::Object(o) => SchemaNode::Object(ObjectNode {
                    name: o.name.clone(),
                    path,
                    parent: o.parent,
                    storage: o.storage,
                    children: self
                        .nodes
                        .iter()
                        .enumerate()
                        .filter(|(_, n)| n.parent() == Some(NodeId(i)))
                        .map(|(c, _)| NodeId(c))
                        .collect(),
                }),
                PendingNode::Scalar(s) => SchemaNode::Scalar(resolve_scalar(s, path)?),
            };
            nodes.push(node);
        }

        tracing::debug!(
            "built schema for index '{}' with {} nodes",
            self.index_name,
            nodes.len()
        );

        Ok(Arc::new(IndexSchema {
            schema_id: self.schema_id,
            index_name: self.index_name,
            nodes,
            explicit_routing: self.explicit_routing,
        }))
    }

    fn check_parent(&mut self, parent: &ObjectFieldHandle) {
        if parent.schema_id != self.schema_id {
            self.deferred_errors
                .push(SearchSyncError::ForeignFieldHandle(self.index_name.clone()));
        }
    }

    fn path_of(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == NodeId::ROOT {
                break;
            }
            let node = &self.nodes[node_id.0];
            segments.push(node.name());
            current = node.parent();
        }
        segments.reverse();
        segments.join(".")
    }
}

/// Options of a scalar field being declared; finish with [`handle`].
///
/// [`handle`]: ScalarFieldOptions::handle
pub struct ScalarFieldOptions<'a, T> {
    pending: &'a mut PendingScalar,
    handle: FieldHandle<T>,
}

impl<'a, T: IndexableValue> ScalarFieldOptions<'a, T> {
    pub fn analyzer(mut self, name: impl Into<String>) -> Self {
        self.pending.analyzer = Some(name.into());
        self
    }

    pub fn normalizer(mut self, name: impl Into<String>) -> Self {
        self.pending.normalizer = Some(name.into());
        self
    }

    pub fn store(mut self, store: Store) -> Self {
        self.pending.store = store;
        self
    }

    pub fn sortable(mut self, sortable: Sortable) -> Self {
        self.pending.sortable = sortable;
        self
    }

    pub fn index_null_as(mut self, value: T) -> Self {
        self.pending.null_value = Some(value.into_field_value());
        self
    }

    pub fn handle(self) -> FieldHandle<T> {
        self.handle
    }
}

fn resolve_scalar(pending: &PendingScalar, path: String) -> Result<ScalarFieldNode> {
    let value_type = pending
        .value_type
        .clone()
        .map_err(SearchSyncError::UnknownValueType)?;

    let kind = match (value_type, &pending.analyzer, &pending.normalizer) {
        (ValueType::String, Some(_), Some(_)) => {
            return Err(SearchSyncError::AnalyzerAndNormalizer(path));
        }
        (ValueType::String, Some(analyzer), None) => FieldKind::Text {
            analyzer: analyzer.clone(),
        },
        (ValueType::String, None, normalizer) => FieldKind::Keyword {
            normalizer: normalizer.clone(),
        },
        (other, Some(_), _) => {
            return Err(SearchSyncError::AnalyzerOnNonTextField {
                path,
                kind: other.name().to_string(),
            });
        }
        (other, None, Some(_)) => {
            return Err(SearchSyncError::NormalizerOnNonStringField {
                path,
                kind: other.name().to_string(),
            });
        }
        (ValueType::Integer, None, None) => FieldKind::Integer,
        (ValueType::Long, None, None) => FieldKind::Long,
        (ValueType::Double, None, None) => FieldKind::Double,
        (ValueType::Boolean, None, None) => FieldKind::Boolean,
        (ValueType::Date, None, None) => FieldKind::Date,
        (ValueType::GeoPoint, None, None) => FieldKind::GeoPoint,
    };

    if matches!(kind, FieldKind::Text { .. }) && pending.sortable == Sortable::Yes {
        return Err(SearchSyncError::SortableTextField(path));
    }

    if let Some(null_value) = &pending.null_value {
        if !kind.accepts(null_value) {
            return Err(SearchSyncError::InvalidNullSentinel {
                path,
                kind: kind.name().to_string(),
            });
        }
    }

    Ok(ScalarFieldNode {
        name: pending.name.clone(),
        path,
        parent: pending.parent,
        kind,
        store: pending.store,
        sortable: pending.sortable,
        null_value: pending.null_value.clone(),
    })
}

/// Index names follow Elasticsearch's rules so both backends accept them.
fn validate_index_name(name: &str) -> Result<()> {
    const FORBIDDEN: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#', ':'];
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.len() > 255
        || name.starts_with(['-', '_', '+'])
        || name.chars().any(|c| c.is_uppercase() || FORBIDDEN.contains(&c));
    if invalid {
        return Err(SearchSyncError::InvalidIndexName(name.to_string()));
    }
    Ok(())
}
