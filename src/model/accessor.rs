use crate::document::DocumentElement;
use crate::model::field::IndexableValue;
use crate::model::schema::{IndexSchema, NodeId, ObjectNode, ScalarFieldNode};
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed writer for one scalar leaf, bound from a [`FieldHandle`].
///
/// [`FieldHandle`]: crate::model::FieldHandle
pub struct IndexFieldAccessor<T> {
    schema: Arc<IndexSchema>,
    node: NodeId,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for IndexFieldAccessor<T> {
    fn clone(&self) -> Self {
        IndexFieldAccessor {
            schema: Arc::clone(&self.schema),
            node: self.node,
            _marker: PhantomData,
        }
    }
}

impl<T: IndexableValue> IndexFieldAccessor<T> {
    pub(crate) fn new(schema: Arc<IndexSchema>, node: NodeId) -> Self {
        IndexFieldAccessor {
            schema,
            node,
            _marker: PhantomData,
        }
    }

    pub fn field(&self) -> &ScalarFieldNode {
        match self.schema.scalar(self.node) {
            Some(field) => field,
            None => unreachable!("accessor bound to a non-scalar node"),
        }
    }

    /// Write `value` into `element`, which must be the element of this
    /// field's parent object.
    ///
    /// `None` omits the field, or writes the field's null sentinel if it has
    /// one. Values the field cannot represent are dropped with a warning.
    pub fn write(&self, element: &mut dyn DocumentElement, value: Option<T>) {
        let field = self.field();
        let value = match value {
            Some(v) => v.into_field_value(),
            None => match &field.null_value {
                Some(sentinel) => sentinel.clone(),
                None => return,
            },
        };
        if !field.kind.accepts(&value) {
            tracing::warn!(
                "dropping {:?} for field '{}' of type {}",
                value,
                field.path,
                field.kind.name()
            );
            return;
        }
        element.add_value(self.node, &field.name, value);
    }
}

/// Accessor for an object field; descendant leaves write into the element it
/// returns.
#[derive(Clone)]
pub struct IndexObjectFieldAccessor {
    schema: Arc<IndexSchema>,
    node: NodeId,
}

impl IndexObjectFieldAccessor {
    pub(crate) fn new(schema: Arc<IndexSchema>, node: NodeId) -> Self {
        IndexObjectFieldAccessor { schema, node }
    }

    pub fn field(&self) -> &ObjectNode {
        match self.schema.object(self.node) {
            Some(object) => object,
            None => unreachable!("accessor bound to a non-object node"),
        }
    }

    pub fn add<'e>(&self, element: &'e mut dyn DocumentElement) -> &'e mut dyn DocumentElement {
        let name = self.field().name.clone();
        element.add_object(self.node, &name)
    }

    /// Mark the object as explicitly absent.
    pub fn add_missing(&self, element: &mut dyn DocumentElement) {
        element.add_missing_object(self.node, &self.field().name);
    }
}
