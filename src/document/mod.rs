//! Backend-neutral document accumulation.
//!
//! A [`DocumentBuilder`] collects the values written through field accessors
//! into an [`ElementTree`]; each backend turns the finished tree into its
//! native document.

use crate::model::{FieldValue, IndexSchema, NodeId};
use indexmap::IndexMap;
use std::sync::Arc;

/// The currently-open object of a document being built.
///
/// Normally driven through [`IndexFieldAccessor`] and
/// [`IndexObjectFieldAccessor`] rather than called directly.
///
/// [`IndexFieldAccessor`]: crate::model::IndexFieldAccessor
/// [`IndexObjectFieldAccessor`]: crate::model::IndexObjectFieldAccessor
pub trait DocumentElement {
    fn add_value(&mut self, field: NodeId, name: &str, value: FieldValue);

    fn add_object(&mut self, field: NodeId, name: &str) -> &mut dyn DocumentElement;

    fn add_missing_object(&mut self, field: NodeId, name: &str);
}

/// Fills a document from an entity.
pub trait DocumentContributor: Send + Sync {
    fn contribute(&self, root: &mut dyn DocumentElement);
}

impl<F> DocumentContributor for F
where
    F: Fn(&mut dyn DocumentElement) + Send + Sync,
{
    fn contribute(&self, root: &mut dyn DocumentElement) {
        self(root)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Value {
        field: NodeId,
        value: FieldValue,
    },
    /// One entry per `add`/`add_missing` call; `None` is an explicit missing
    /// marker.
    Objects {
        field: NodeId,
        entries: Vec<Option<ElementTree>>,
    },
}

/// Insertion-ordered content of one object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementTree {
    slots: IndexMap<String, Slot>,
}

impl ElementTree {
    pub fn slots(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn objects_mut(&mut self, field: NodeId, name: &str) -> &mut Vec<Option<ElementTree>> {
        let slot = self
            .slots
            .entry(name.to_string())
            .or_insert_with(|| Slot::Objects {
                field,
                entries: Vec::new(),
            });
        if let Slot::Value { .. } = slot {
            *slot = Slot::Objects {
                field,
                entries: Vec::new(),
            };
        }
        match slot {
            Slot::Objects { entries, .. } => entries,
            Slot::Value { .. } => unreachable!("slot was just replaced by an object slot"),
        }
    }
}

impl DocumentElement for ElementTree {
    fn add_value(&mut self, field: NodeId, name: &str, value: FieldValue) {
        self.slots
            .insert(name.to_string(), Slot::Value { field, value });
    }

    fn add_object(&mut self, field: NodeId, name: &str) -> &mut dyn DocumentElement {
        let entries = self.objects_mut(field, name);
        entries.push(Some(ElementTree::default()));
        match entries.last_mut() {
            Some(Some(tree)) => tree,
            _ => unreachable!("object entry was just pushed"),
        }
    }

    fn add_missing_object(&mut self, field: NodeId, name: &str) {
        self.objects_mut(field, name).push(None);
    }
}

/// Per-entity accumulator; one per add/update call.
pub struct DocumentBuilder {
    schema: Arc<IndexSchema>,
    root: ElementTree,
}

impl DocumentBuilder {
    pub fn new(schema: Arc<IndexSchema>) -> Self {
        DocumentBuilder {
            schema,
            root: ElementTree::default(),
        }
    }

    pub fn schema(&self) -> &Arc<IndexSchema> {
        &self.schema
    }

    pub fn root(&mut self) -> &mut dyn DocumentElement {
        &mut self.root
    }

    pub fn contribute(&mut self, contributor: &dyn DocumentContributor) {
        contributor.contribute(&mut self.root);
    }

    pub fn into_tree(self) -> ElementTree {
        self.root
    }
}
