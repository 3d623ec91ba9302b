//! Field value types, the type registry, and the resolved kind of each leaf.

use crate::error::{Result, SearchSyncError};
use crate::types::GeoPoint;
use chrono::NaiveDate;
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;

/// Semantic type of the values a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Integer,
    Long,
    Double,
    Boolean,
    Date,
    GeoPoint,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Long => "long",
            ValueType::Double => "double",
            ValueType::Boolean => "boolean",
            ValueType::Date => "date",
            ValueType::GeoPoint => "geo_point",
        }
    }
}

/// A single encoded value handed to a document builder.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(NaiveDate),
    GeoPoint(GeoPoint),
}

impl FieldValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            FieldValue::String(_) => ValueType::String,
            FieldValue::Integer(_) => ValueType::Integer,
            FieldValue::Long(_) => ValueType::Long,
            FieldValue::Double(_) => ValueType::Double,
            FieldValue::Boolean(_) => ValueType::Boolean,
            FieldValue::Date(_) => ValueType::Date,
            FieldValue::GeoPoint(_) => ValueType::GeoPoint,
        }
    }
}

/// Rust types that can be written through a field accessor.
pub trait IndexableValue: Send + Sync + 'static {
    fn into_field_value(self) -> FieldValue;
}

impl IndexableValue for String {
    fn into_field_value(self) -> FieldValue {
        FieldValue::String(self)
    }
}

impl IndexableValue for i32 {
    fn into_field_value(self) -> FieldValue {
        FieldValue::Integer(self)
    }
}

impl IndexableValue for i64 {
    fn into_field_value(self) -> FieldValue {
        FieldValue::Long(self)
    }
}

impl IndexableValue for f64 {
    fn into_field_value(self) -> FieldValue {
        FieldValue::Double(self)
    }
}

impl IndexableValue for bool {
    fn into_field_value(self) -> FieldValue {
        FieldValue::Boolean(self)
    }
}

impl IndexableValue for NaiveDate {
    fn into_field_value(self) -> FieldValue {
        FieldValue::Date(self)
    }
}

impl IndexableValue for GeoPoint {
    fn into_field_value(self) -> FieldValue {
        FieldValue::GeoPoint(self)
    }
}

/// Lookup table from Rust value types to [`ValueType`].
///
/// Pre-populated with the built-in types; callers add their own with
/// [`FieldTypeRegistry::register`].
#[derive(Debug, Clone)]
pub struct FieldTypeRegistry {
    types: HashMap<TypeId, ValueType>,
}

impl Default for FieldTypeRegistry {
    fn default() -> Self {
        let mut registry = FieldTypeRegistry {
            types: HashMap::new(),
        };
        registry.register::<String>(ValueType::String);
        registry.register::<i32>(ValueType::Integer);
        registry.register::<i64>(ValueType::Long);
        registry.register::<f64>(ValueType::Double);
        registry.register::<bool>(ValueType::Boolean);
        registry.register::<NaiveDate>(ValueType::Date);
        registry.register::<GeoPoint>(ValueType::GeoPoint);
        registry
    }
}

impl FieldTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: IndexableValue>(&mut self, value_type: ValueType) -> &mut Self {
        self.types.insert(TypeId::of::<T>(), value_type);
        self
    }

    pub fn lookup<T: IndexableValue>(&self) -> Result<ValueType> {
        self.types
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or_else(|| SearchSyncError::UnknownValueType(std::any::type_name::<T>().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Store {
    #[default]
    Default,
    No,
    Yes,
    Compress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sortable {
    #[default]
    Default,
    No,
    Yes,
}

/// The resolved kind of a scalar field, fixed at schema build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text { analyzer: String },
    Keyword { normalizer: Option<String> },
    Integer,
    Long,
    Double,
    Boolean,
    Date,
    GeoPoint,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text { .. } => "text",
            FieldKind::Keyword { .. } => "keyword",
            FieldKind::Integer => "integer",
            FieldKind::Long => "long",
            FieldKind::Double => "double",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::GeoPoint => "geo_point",
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            FieldKind::Text { .. } | FieldKind::Keyword { .. } => ValueType::String,
            FieldKind::Integer => ValueType::Integer,
            FieldKind::Long => ValueType::Long,
            FieldKind::Double => ValueType::Double,
            FieldKind::Boolean => ValueType::Boolean,
            FieldKind::Date => ValueType::Date,
            FieldKind::GeoPoint => ValueType::GeoPoint,
        }
    }

    pub fn accepts(&self, value: &FieldValue) -> bool {
        match value {
            FieldValue::Double(d) if !d.is_finite() => false,
            FieldValue::GeoPoint(p) if !p.is_valid() => false,
            _ => value.value_type() == self.value_type(),
        }
    }

    /// Encode a value as the JSON element Elasticsearch expects.
    ///
    /// Returns `None` for values this kind cannot represent.
    pub fn encode_json(&self, value: &FieldValue) -> Option<Value> {
        if !self.accepts(value) {
            return None;
        }
        match value {
            FieldValue::String(s) => Some(Value::String(s.clone())),
            FieldValue::Integer(i) => Some(Value::from(*i)),
            FieldValue::Long(l) => Some(Value::from(*l)),
            FieldValue::Double(d) => serde_json::Number::from_f64(*d).map(Value::Number),
            FieldValue::Boolean(b) => Some(Value::Bool(*b)),
            FieldValue::Date(d) => Some(Value::String(format_date(d))),
            FieldValue::GeoPoint(p) => Some(serde_json::json!({"lat": p.lat, "lon": p.lon})),
        }
    }
}

/// `yyyy-MM-dd`; years beyond four digits carry a leading sign.
pub fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
