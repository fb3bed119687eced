//! Search documents
//!
//! A document is an ordered list of field occurrences. Each occurrence is
//! either an indexed token (searchable) or a stored payload (returned on
//! read). Several occurrences may share a name; their order is preserved.

use crate::selector::{DocumentFieldSelector, FieldSelection};
use bytes::Bytes;
use std::collections::BTreeSet;

/// Payload of one field occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Indexed(String),
    Stored(Bytes),
}

/// One field occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn is_stored(&self) -> bool {
        matches!(self.value, FieldValue::Stored(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchDocument {
    fields: Vec<Field>,
}

impl SearchDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_indexed(&mut self, name: impl Into<String>, token: impl Into<String>) {
        self.fields.push(Field { name: name.into(), value: FieldValue::Indexed(token.into()) });
    }

    pub fn add_stored(&mut self, name: impl Into<String>, data: Bytes) {
        self.fields.push(Field { name: name.into(), value: FieldValue::Stored(data) });
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Indexed tokens of a field, in insertion order
    pub fn indexed<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields.iter().filter(move |f| f.name == name).filter_map(|f| match &f.value {
            FieldValue::Indexed(token) => Some(token.as_str()),
            FieldValue::Stored(_) => None,
        })
    }

    /// Stored payloads of a field, in insertion order
    pub fn stored<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Bytes> + 'a {
        self.fields.iter().filter(move |f| f.name == name).filter_map(|f| match &f.value {
            FieldValue::Stored(data) => Some(data),
            FieldValue::Indexed(_) => None,
        })
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn field_names(&self) -> BTreeSet<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// The document as an index returns it: stored occurrences the selector accepts
    pub fn load(&self, selector: &DocumentFieldSelector) -> SearchDocument {
        let fields = self
            .fields
            .iter()
            .filter(|f| f.is_stored() && selector.accept(&f.name) == FieldSelection::Load)
            .cloned()
            .collect();
        SearchDocument { fields }
    }
}
