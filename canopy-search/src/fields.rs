//! Field naming
//!
//! Reserved fields start with `_`. A property's field is named after its
//! qualified name (`prefix:name`, or `name` in the default namespace); derived
//! fields append `^lc` (lowercase variant) or `@attr` (JSON attribute).
//!
//! `FieldNames` maps every property field name to one canonical definition,
//! chosen by a single walk over the type tree at construction.

use canopy_core::{PropertyTypeDefinition, ResourceTypeTree};
use std::collections::HashMap;
use std::sync::Arc;

/// Reserved field names
pub mod reserved {
    pub const URI: &str = "_uri";
    pub const URI_ANCESTORS: &str = "_uri_ancestors";
    pub const NAME: &str = "_name";
    pub const NAME_LC: &str = "_name_lc";
    pub const RESOURCE_TYPE: &str = "_resource_type";
    pub const ID: &str = "_id";
    pub const ACL_INHERITED_FROM: &str = "_acl_inherited_from";
    pub const ACL_READ_PRINCIPALS: &str = "_acl_read_principals";

    pub const ALL: [&str; 8] = [
        URI,
        URI_ANCESTORS,
        NAME,
        NAME_LC,
        RESOURCE_TYPE,
        ID,
        ACL_INHERITED_FROM,
        ACL_READ_PRINCIPALS,
    ];

    /// Fields every loaded document must carry
    pub const MANDATORY: [&str; 2] = [URI, RESOURCE_TYPE];

    pub fn is_reserved(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// Value stored in the ACL-inherited-from field of a resource with its own ACL
pub const NO_ACL_INHERITANCE: i64 = -1;

const LOWERCASE_SUFFIX: &str = "^lc";
const JSON_ATTRIBUTE_SEPARATOR: char = '@';

pub fn property_field_name(def: &PropertyTypeDefinition) -> String {
    def.qualified_name()
}

pub fn lowercase_field_name(field: &str) -> String {
    format!("{}{}", field, LOWERCASE_SUFFIX)
}

pub fn json_attribute_field_name(field: &str, attribute: &str) -> String {
    format!("{}{}{}", field, JSON_ATTRIBUTE_SEPARATOR, attribute)
}

/// Canonical field name table
#[derive(Debug, Clone, Default)]
pub struct FieldNames {
    canonical: HashMap<String, Arc<PropertyTypeDefinition>>,
}

impl FieldNames {
    pub fn new(tree: &ResourceTypeTree) -> Self {
        let mut canonical = HashMap::new();
        for def in tree.all_property_definitions() {
            canonical.entry(property_field_name(&def)).or_insert(def);
        }
        Self { canonical }
    }

    /// Canonical definition behind a property field name
    pub fn canonical(&self, field: &str) -> Option<&Arc<PropertyTypeDefinition>> {
        self.canonical.get(field)
    }

    /// Canonical definition for any definition of the same field
    pub fn canonical_for(&self, def: &PropertyTypeDefinition) -> Option<&Arc<PropertyTypeDefinition>> {
        self.canonical(&property_field_name(def))
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}
