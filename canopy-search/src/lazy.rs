//! Lazily decoded property sets
//!
//! Construction makes one pass over the document's stored fields. Path and
//! resource type are decoded right away. The id, ACL source and read
//! principal fields are remembered by position; every other field only gets
//! a slot holding the indices of its occurrences. A slot is decoded on first
//! access and cached.

use crate::codec::{decode_long_stored, decode_stored, decode_string_stored};
use crate::document::{FieldValue, SearchDocument};
use crate::error::{MappingError, Result};
use crate::fields::{property_field_name, reserved, FieldNames, NO_ACL_INHERITANCE};
use bytes::Bytes;
use canopy_core::{
    Namespace, Property, PropertyTypeDefinition, ResourceId, ResourcePath, ResourcePropertySet, Value, ValueType,
};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug)]
struct Slot {
    field: String,
    indices: Vec<usize>,
    /// Occurrences were interleaved with another field
    fragmented: bool,
    decoded: OnceCell<Property>,
}

/// Read view over a document loaded from the index
#[derive(Debug)]
pub struct LazyPropertySet {
    document: SearchDocument,
    names: Arc<FieldNames>,
    path: ResourcePath,
    resource_type: String,
    id: Option<usize>,
    acl_inherited_from: Option<usize>,
    acl_read_principals: Vec<usize>,
    slots: Vec<Slot>,
    by_field: HashMap<String, usize>,
}

impl LazyPropertySet {
    pub fn new(document: SearchDocument, names: Arc<FieldNames>) -> Result<Self> {
        let mut path = None;
        let mut resource_type = None;
        let mut id = None;
        let mut acl_inherited_from = None;
        let mut acl_read_principals = Vec::new();
        let mut slots: Vec<Slot> = Vec::new();
        let mut by_field: HashMap<String, usize> = HashMap::new();
        let mut previous: Option<usize> = None;

        for (index, field) in document.fields().iter().enumerate() {
            let FieldValue::Stored(data) = &field.value else {
                continue;
            };
            match field.name.as_str() {
                reserved::URI => path = Some(ResourcePath::parse(&decode_text(&field.name, data)?)?),
                reserved::RESOURCE_TYPE => resource_type = Some(decode_text(&field.name, data)?),
                reserved::ID => {
                    id.get_or_insert(index);
                }
                reserved::ACL_INHERITED_FROM => {
                    acl_inherited_from.get_or_insert(index);
                }
                reserved::ACL_READ_PRINCIPALS => acl_read_principals.push(index),
                name if reserved::is_reserved(name) => {}
                name => {
                    let slot = match by_field.get(name) {
                        Some(&slot) => {
                            if previous != Some(slot) {
                                slots[slot].fragmented = true;
                            }
                            slot
                        }
                        None => {
                            slots.push(Slot {
                                field: name.to_string(),
                                indices: Vec::new(),
                                fragmented: false,
                                decoded: OnceCell::new(),
                            });
                            by_field.insert(name.to_string(), slots.len() - 1);
                            slots.len() - 1
                        }
                    };
                    slots[slot].indices.push(index);
                    previous = Some(slot);
                    continue;
                }
            }
            previous = None;
        }

        Ok(Self {
            path: path.ok_or_else(|| MappingError::MissingField(reserved::URI.to_string()))?,
            resource_type: resource_type.ok_or_else(|| MappingError::MissingField(reserved::RESOURCE_TYPE.to_string()))?,
            document,
            names,
            id,
            acl_inherited_from,
            acl_read_principals,
            slots,
            by_field,
        })
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn id(&self) -> Result<ResourceId> {
        self.long_at(self.id, reserved::ID).map(ResourceId)
    }

    pub fn acl_inherited_from(&self) -> Result<Option<ResourceId>> {
        let value = self.long_at(self.acl_inherited_from, reserved::ACL_INHERITED_FROM)?;
        Ok(inheritance_source(value))
    }

    /// Empty when the document grants read to nobody
    pub fn acl_read_principal_names(&self) -> Result<Vec<String>> {
        self.acl_read_principals
            .iter()
            .filter_map(|&i| self.stored_at(i))
            .map(|data| decode_text(reserved::ACL_READ_PRINCIPALS, data))
            .collect()
    }

    /// Property fields present in the document, in document order
    pub fn field_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.slots.iter().map(|s| s.field.as_str())
    }

    pub fn property(&self, def: &PropertyTypeDefinition) -> Result<Option<&Property>> {
        self.property_by_field(&property_field_name(def))
    }

    pub fn property_by_field(&self, field: &str) -> Result<Option<&Property>> {
        match self.by_field.get(field) {
            Some(&slot) => self.decode(&self.slots[slot]).map(Some),
            None => Ok(None),
        }
    }

    /// Decode every property, in document order
    pub fn properties(&self) -> Result<Vec<&Property>> {
        self.slots.iter().map(|slot| self.decode(slot)).collect()
    }

    pub fn to_property_set(&self) -> Result<ResourcePropertySet> {
        let mut set = ResourcePropertySet::new(self.path.clone(), self.resource_type.clone(), self.id()?)
            .with_acl_inherited_from(self.acl_inherited_from()?);
        for property in self.properties()? {
            set.add(property.clone());
        }
        Ok(set)
    }

    pub fn into_document(self) -> SearchDocument {
        self.document
    }

    fn decode<'a>(&'a self, slot: &'a Slot) -> Result<&'a Property> {
        slot.decoded.get_or_try_init(|| {
            if slot.fragmented {
                return Err(MappingError::FragmentedField(slot.field.clone()));
            }
            let stored: Vec<&Bytes> = slot.indices.iter().filter_map(|&i| self.stored_at(i)).collect();
            match self.names.canonical(&slot.field) {
                Some(def) => {
                    if !def.multiple && stored.len() > 1 {
                        return Err(MappingError::Cardinality { field: slot.field.clone(), count: stored.len() });
                    }
                    let values = stored
                        .iter()
                        .map(|data| {
                            decode_stored(def.value_type, data)
                                .map_err(|source| MappingError::Decode { field: slot.field.clone(), source })
                        })
                        .collect::<Result<Vec<Value>>>()?;
                    Ok(Property::multi(def.clone(), values)?)
                }
                None => {
                    warn!("No definition for field {}, decoding it as a string property", slot.field);
                    let def = fallback_definition(&slot.field, stored.len() > 1);
                    let values = stored
                        .iter()
                        .map(|data| Value::String(String::from_utf8_lossy(data).into_owned()))
                        .collect();
                    Ok(Property::multi(def.into_arc(), values)?)
                }
            }
        })
    }

    fn long_at(&self, index: Option<usize>, field: &str) -> Result<i64> {
        let data = index
            .and_then(|i| self.stored_at(i))
            .ok_or_else(|| MappingError::MissingField(field.to_string()))?;
        decode_long(field, data)
    }

    fn stored_at(&self, index: usize) -> Option<&Bytes> {
        match &self.document.fields().get(index)?.value {
            FieldValue::Stored(data) => Some(data),
            FieldValue::Indexed(_) => None,
        }
    }
}

fn fallback_definition(field: &str, multiple: bool) -> PropertyTypeDefinition {
    let (namespace, name) = match field.split_once(':') {
        Some((prefix, name)) => (Namespace::new(prefix, ""), name),
        None => (Namespace::default_namespace(), field),
    };
    let def = PropertyTypeDefinition::new(namespace, name, ValueType::String);
    if multiple { def.multiple() } else { def }
}

fn decode_text(field: &str, data: &[u8]) -> Result<String> {
    decode_string_stored(data).map_err(|source| MappingError::Decode { field: field.to_string(), source })
}

fn decode_long(field: &str, data: &[u8]) -> Result<i64> {
    decode_long_stored(data).map_err(|source| MappingError::Decode { field: field.to_string(), source })
}

fn stored_long(document: &SearchDocument, field: &str) -> Result<i64> {
    let data = document
        .stored(field)
        .next()
        .ok_or_else(|| MappingError::MissingField(field.to_string()))?;
    decode_long(field, data)
}

fn inheritance_source(value: i64) -> Option<ResourceId> {
    (value != NO_ACL_INHERITANCE).then_some(ResourceId(value))
}

pub(crate) fn resource_id(document: &SearchDocument) -> Result<ResourceId> {
    stored_long(document, reserved::ID).map(ResourceId)
}

pub(crate) fn acl_inherited_from(document: &SearchDocument) -> Result<Option<ResourceId>> {
    stored_long(document, reserved::ACL_INHERITED_FROM).map(inheritance_source)
}

pub(crate) fn acl_read_principal_names(document: &SearchDocument) -> Result<Vec<String>> {
    document
        .stored(reserved::ACL_READ_PRINCIPALS)
        .map(|data| decode_text(reserved::ACL_READ_PRINCIPALS, data))
        .collect()
}
