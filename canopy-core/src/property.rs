//! Typed property model
//!
//! Properties are typed values attached to a resource, each described by a
//! `PropertyTypeDefinition` from the resource type tree. This is the model the
//! search document codec projects into index fields and back.

use crate::acl::Principal;
use crate::path::ResourcePath;
use crate::resource::ResourceId;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Property namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    /// Short prefix, used in field names; `None` for the default namespace
    pub prefix: Option<String>,
    pub uri: String,
}

impl Namespace {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()), uri: uri.into() }
    }

    /// The default (unprefixed) namespace
    pub fn default_namespace() -> Self {
        Self { prefix: None, uri: String::new() }
    }

    pub fn is_default(&self) -> bool {
        self.prefix.is_none()
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::default_namespace()
    }
}

/// Value types known to the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    String,
    Html,
    Json,
    ImageRef,
    Boolean,
    Principal,
    Date,
    Timestamp,
    Int,
    Long,
    Binary,
    JsonBinary,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::String => "STRING",
            ValueType::Html => "HTML",
            ValueType::Json => "JSON",
            ValueType::ImageRef => "IMAGE_REF",
            ValueType::Boolean => "BOOLEAN",
            ValueType::Principal => "PRINCIPAL",
            ValueType::Date => "DATE",
            ValueType::Timestamp => "TIMESTAMP",
            ValueType::Int => "INT",
            ValueType::Long => "LONG",
            ValueType::Binary => "BINARY",
            ValueType::JsonBinary => "JSON_BINARY",
        }
    }

    /// Binary types are never projected into the search index
    pub fn is_binary(&self) -> bool {
        matches!(self, ValueType::Binary | ValueType::JsonBinary)
    }

    /// Types indexed with an additional lowercase field
    pub fn is_textual(&self) -> bool {
        matches!(self, ValueType::String | ValueType::Html)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binary payload with its content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryValue {
    pub content_type: String,
    pub data: Bytes,
}

/// A single typed value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Html(String),
    /// Raw JSON text, parsed only when needed
    Json(String),
    ImageRef(String),
    Boolean(bool),
    Principal(Principal),
    Date(DateTime<Utc>),
    Timestamp(DateTime<Utc>),
    Int(i32),
    Long(i64),
    Binary(BinaryValue),
    JsonBinary(Bytes),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Html(_) => ValueType::Html,
            Value::Json(_) => ValueType::Json,
            Value::ImageRef(_) => ValueType::ImageRef,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Principal(_) => ValueType::Principal,
            Value::Date(_) => ValueType::Date,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Int(_) => ValueType::Int,
            Value::Long(_) => ValueType::Long,
            Value::Binary(_) => ValueType::Binary,
            Value::JsonBinary(_) => ValueType::JsonBinary,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Html(s) | Value::Json(s) | Value::ImageRef(s) => Some(s),
            _ => None,
        }
    }
}

/// Errors raised while building properties
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    #[error("Property {property} expects {expected} values, got {actual}")]
    TypeMismatch {
        property: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("Property {0} is single-valued but got {1} values")]
    NotMultiple(String, usize),

    #[error("Property {0} has no values")]
    Empty(String),
}

/// Definition of a property in the resource type tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyTypeDefinition {
    pub namespace: Namespace,
    pub name: String,
    pub value_type: ValueType,
    pub multiple: bool,
    pub inheritable: bool,
    /// Declared value types of top-level JSON attributes
    pub json_hints: BTreeMap<String, ValueType>,
}

impl PropertyTypeDefinition {
    pub fn new(namespace: Namespace, name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            namespace,
            name: name.into(),
            value_type,
            multiple: false,
            inheritable: false,
            json_hints: BTreeMap::new(),
        }
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn inheritable(mut self) -> Self {
        self.inheritable = true;
        self
    }

    pub fn with_json_hint(mut self, attribute: impl Into<String>, value_type: ValueType) -> Self {
        self.json_hints.insert(attribute.into(), value_type);
        self
    }

    /// Declared type of a JSON attribute, STRING when undeclared
    pub fn json_hint(&self, attribute: &str) -> ValueType {
        self.json_hints.get(attribute).copied().unwrap_or(ValueType::String)
    }

    /// Same (namespace, name) identity, regardless of the rest of the definition
    pub fn same_property(&self, other: &PropertyTypeDefinition) -> bool {
        self.namespace.uri == other.namespace.uri && self.name == other.name
    }

    /// `prefix:name`, or just `name` in the default namespace
    pub fn qualified_name(&self) -> String {
        match &self.namespace.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.name),
            None => self.name.clone(),
        }
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// A property: a definition together with its value(s)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    definition: Arc<PropertyTypeDefinition>,
    values: Vec<Value>,
}

impl Property {
    /// Single-valued property
    pub fn new(definition: Arc<PropertyTypeDefinition>, value: Value) -> Result<Self, PropertyError> {
        Self::with_values(definition, vec![value])
    }

    /// Multi-valued property, values kept in the given order
    pub fn multi(definition: Arc<PropertyTypeDefinition>, values: Vec<Value>) -> Result<Self, PropertyError> {
        Self::with_values(definition, values)
    }

    fn with_values(definition: Arc<PropertyTypeDefinition>, values: Vec<Value>) -> Result<Self, PropertyError> {
        if values.is_empty() {
            return Err(PropertyError::Empty(definition.qualified_name()));
        }
        if !definition.multiple && values.len() > 1 {
            return Err(PropertyError::NotMultiple(definition.qualified_name(), values.len()));
        }
        if let Some(bad) = values.iter().find(|v| v.value_type() != definition.value_type) {
            return Err(PropertyError::TypeMismatch {
                property: definition.qualified_name(),
                expected: definition.value_type,
                actual: bad.value_type(),
            });
        }
        Ok(Self { definition, values })
    }

    pub fn definition(&self) -> &Arc<PropertyTypeDefinition> {
        &self.definition
    }

    /// First (for single-valued properties, the only) value
    pub fn value(&self) -> &Value {
        &self.values[0]
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Typed property set of one resource, as fed to the search codec
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePropertySet {
    pub path: ResourcePath,
    pub resource_type: String,
    pub id: ResourceId,
    /// `None` when the resource carries its own ACL
    pub acl_inherited_from: Option<ResourceId>,
    properties: Vec<Property>,
}

impl ResourcePropertySet {
    pub fn new(path: ResourcePath, resource_type: impl Into<String>, id: ResourceId) -> Self {
        Self {
            path,
            resource_type: resource_type.into(),
            id,
            acl_inherited_from: None,
            properties: Vec::new(),
        }
    }

    pub fn with_acl_inherited_from(mut self, from: Option<ResourceId>) -> Self {
        self.acl_inherited_from = from;
        self
    }

    /// Add a property, replacing one with the same definition identity
    pub fn add(&mut self, property: Property) {
        self.properties.retain(|p| !p.definition.same_property(&property.definition));
        self.properties.push(property);
    }

    pub fn property(&self, namespace_uri: &str, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.definition.namespace.uri == namespace_uri && p.definition.name == name)
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }
}
