//! Property set to search document mapping

use crate::codec::{encode_indexed, encode_long, encode_long_stored, encode_stored, ValueError};
use crate::document::SearchDocument;
use crate::error::{MappingError, Result};
use crate::fields::{lowercase_field_name, property_field_name, reserved, FieldNames, NO_ACL_INHERITANCE};
use crate::json;
use crate::lazy::{self, LazyPropertySet};
use crate::selector::{DocumentFieldSelector, PropertySelect};
use bytes::Bytes;
use canopy_core::{
    Principal, Property, PropertyTypeDefinition, ResourceId, ResourcePropertySet, ResourceTypeTree, ValueType,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps property sets to search documents and back
///
/// The canonical field table is built once in `new` and never changes, so a
/// mapper can be shared freely between threads.
#[derive(Debug, Clone)]
pub struct DocumentMapper {
    tree: Arc<ResourceTypeTree>,
    names: Arc<FieldNames>,
}

impl DocumentMapper {
    pub fn new(tree: Arc<ResourceTypeTree>) -> Self {
        let names = Arc::new(FieldNames::new(&tree));
        debug!("Built canonical field table with {} fields", names.len());
        Self { tree, names }
    }

    pub fn tree(&self) -> &ResourceTypeTree {
        &self.tree
    }

    pub fn field_names(&self) -> &FieldNames {
        &self.names
    }

    /// Project a property set into a new search document
    ///
    /// `acl_read` holds the principals allowed to read the resource. When it
    /// contains everyone, only the `pseudo:all` sentinel is written.
    pub fn to_document(&self, set: &ResourcePropertySet, acl_read: &BTreeSet<Principal>) -> Result<SearchDocument> {
        let mut doc = SearchDocument::new();

        let uri = set.path.as_str();
        doc.add_indexed(reserved::URI, uri);
        doc.add_stored(reserved::URI, Bytes::copy_from_slice(uri.as_bytes()));
        for ancestor in set.path.ancestors() {
            doc.add_indexed(reserved::URI_ANCESTORS, ancestor.as_str());
        }
        let name = set.path.name();
        doc.add_indexed(reserved::NAME, name);
        doc.add_indexed(reserved::NAME_LC, name.to_lowercase());
        doc.add_indexed(reserved::RESOURCE_TYPE, set.resource_type.as_str());
        doc.add_stored(reserved::RESOURCE_TYPE, Bytes::copy_from_slice(set.resource_type.as_bytes()));

        doc.add_indexed(reserved::ID, encode_long(set.id.value()));
        doc.add_stored(reserved::ID, encode_long_stored(set.id.value()));
        let inherited_from = set.acl_inherited_from.map_or(NO_ACL_INHERITANCE, |id| id.value());
        doc.add_indexed(reserved::ACL_INHERITED_FROM, encode_long(inherited_from));
        doc.add_stored(reserved::ACL_INHERITED_FROM, encode_long_stored(inherited_from));

        for principal in read_principal_names(acl_read) {
            doc.add_indexed(reserved::ACL_READ_PRINCIPALS, principal.as_str());
            doc.add_stored(reserved::ACL_READ_PRINCIPALS, Bytes::from(principal));
        }

        let declared = self.tree.property_definitions(&set.resource_type);
        for property in set.properties() {
            self.add_property(&mut doc, set, &declared, property)?;
        }
        Ok(doc)
    }

    fn add_property(
        &self,
        doc: &mut SearchDocument,
        set: &ResourcePropertySet,
        declared: &[Arc<PropertyTypeDefinition>],
        property: &Property,
    ) -> Result<()> {
        let def = property.definition();
        if def.value_type.is_binary() {
            return Ok(());
        }
        let Some(canonical) = self.names.canonical_for(def) else {
            warn!("No canonical definition for {} on {}, not indexed", def.qualified_name(), set.path);
            return Ok(());
        };
        if !def.inheritable && !canonical.inheritable && !declared.iter().any(|d| d.same_property(def)) {
            debug!("{} is not part of type {}, skipped", def.qualified_name(), set.resource_type);
            return Ok(());
        }
        if canonical.value_type != def.value_type || (!canonical.multiple && property.values().len() > 1) {
            warn!(
                "{} on {} does not match its canonical definition ({} {}), not indexed",
                def.qualified_name(),
                set.path,
                canonical.value_type,
                if canonical.multiple { "multi" } else { "single" }
            );
            return Ok(());
        }

        let field = property_field_name(canonical);
        let encode_err = |source: ValueError| MappingError::Encode { field: field.clone(), source };
        match canonical.value_type {
            ValueType::String | ValueType::Html => {
                let lowercase = lowercase_field_name(&field);
                for value in property.values() {
                    let token = encode_indexed(value).map_err(encode_err)?;
                    doc.add_indexed(lowercase.as_str(), token.to_lowercase());
                    doc.add_indexed(field.as_str(), token);
                }
            }
            ValueType::Json => match json::project(canonical, &field, property.values()) {
                Ok(tokens) => {
                    for (name, token) in tokens {
                        doc.add_indexed(name, token);
                    }
                }
                Err(e) => warn!("Cannot project JSON property {} on {}: {}", field, set.path, e),
            },
            _ => {
                for value in property.values() {
                    doc.add_indexed(field.as_str(), encode_indexed(value).map_err(encode_err)?);
                }
            }
        }
        for value in property.values() {
            doc.add_stored(field.as_str(), encode_stored(value).map_err(encode_err)?);
        }
        Ok(())
    }

    /// Read view over a loaded document
    pub fn property_set(&self, document: SearchDocument) -> Result<LazyPropertySet> {
        LazyPropertySet::new(document, self.names.clone())
    }

    pub fn field_selector(&self, select: &PropertySelect) -> DocumentFieldSelector {
        DocumentFieldSelector::from(select)
    }

    pub fn acl_read_principal_names(&self, document: &SearchDocument) -> Result<Vec<String>> {
        lazy::acl_read_principal_names(document)
    }

    pub fn resource_id(&self, document: &SearchDocument) -> Result<ResourceId> {
        lazy::resource_id(document)
    }

    pub fn acl_inherited_from(&self, document: &SearchDocument) -> Result<Option<ResourceId>> {
        lazy::acl_inherited_from(document)
    }
}

fn read_principal_names(acl_read: &BTreeSet<Principal>) -> Vec<String> {
    let all = Principal::all();
    if acl_read.contains(&all) {
        vec![all.qualified_name()]
    } else {
        acl_read.iter().map(Principal::qualified_name).collect()
    }
}
