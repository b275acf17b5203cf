//! Structural schema metadata supplied by an external schema provider.
//!
//! A [`SchemaElement`] describes one document location class: expected kind,
//! primitive subtype, cardinality bounds and an optional enumeration set.
//! Schemas are loaded once per validation run and held read-only.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Expected node kind for a document location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Scalar,
    Array,
    Object,
}

/// Primitive subtype for scalar locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveType {
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "decimal")]
    Decimal,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "dateTime")]
    DateTime,
    #[serde(rename = "string")]
    String,
}

impl PrimitiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Integer => "integer",
            PrimitiveType::Decimal => "decimal",
            PrimitiveType::Date => "date",
            PrimitiveType::DateTime => "dateTime",
            PrimitiveType::String => "string",
        }
    }
}

/// Structural metadata for one document location class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaElement {
    /// Expected node kind at this location.
    pub kind: ElementKind,

    /// Primitive subtype, for scalar locations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primitive: Option<PrimitiveType>,

    /// Minimum cardinality.
    #[serde(default)]
    pub min: u32,

    /// Maximum cardinality; `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,

    /// Closed enumeration set for scalar values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<Vec<String>>,

    /// Child element metadata, keyed by element name. Insertion order is
    /// preserved so findings come out in a stable order per run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<IndexMap<String, SchemaElement>>,
}

impl SchemaElement {
    /// A scalar element with the given subtype and cardinality `(min, max)`.
    pub fn scalar(primitive: PrimitiveType, min: u32, max: Option<u32>) -> Self {
        Self {
            kind: ElementKind::Scalar,
            primitive: Some(primitive),
            min,
            max,
            enumeration: None,
            elements: None,
        }
    }

    /// An object element with the given cardinality.
    pub fn object(min: u32, max: Option<u32>) -> Self {
        Self {
            kind: ElementKind::Object,
            primitive: None,
            min,
            max,
            enumeration: None,
            elements: None,
        }
    }

    /// An array element with the given cardinality bounds for its entries.
    pub fn array(min: u32, max: Option<u32>) -> Self {
        Self {
            kind: ElementKind::Array,
            primitive: None,
            min,
            max,
            enumeration: None,
            elements: None,
        }
    }

    pub fn with_enumeration(mut self, allowed: Vec<impl Into<String>>) -> Self {
        self.enumeration = Some(allowed.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_element(mut self, name: impl Into<String>, element: SchemaElement) -> Self {
        self.elements
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), element);
        self
    }

    /// Whether this location admits more than one occurrence.
    pub fn expects_sequence(&self) -> bool {
        match self.max {
            Some(max) => max > 1,
            None => true,
        }
    }

    /// Look up a child element by dotted resource-relative path.
    pub fn descend(&self, field_path: &str) -> Option<&SchemaElement> {
        let mut current = self;
        for segment in field_path.split('.') {
            current = current.elements.as_ref()?.get(segment)?;
        }
        Some(current)
    }
}

/// Resolves structural metadata for a resource type. Must be deterministic
/// for the duration of one validation run.
pub trait SchemaProvider {
    fn resolve(&self, resource_type: &str) -> Option<&SchemaElement>;
}

/// Map-backed schema provider, used in tests and by embedding callers that
/// load schema metadata up front.
#[derive(Debug, Clone, Default)]
pub struct InMemorySchemaProvider {
    schemas: HashMap<String, SchemaElement>,
}

impl InMemorySchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource_type: impl Into<String>, root: SchemaElement) {
        self.schemas.insert(resource_type.into(), root);
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl SchemaProvider for InMemorySchemaProvider {
    fn resolve(&self, resource_type: &str) -> Option<&SchemaElement> {
        self.schemas.get(resource_type)
    }
}
