//! Field selection when loading documents from the index

use crate::fields::{property_field_name, reserved};
use canopy_core::PropertyTypeDefinition;
use std::collections::HashSet;
use std::sync::Arc;

/// Which properties a reader wants back
#[derive(Debug, Clone)]
pub enum PropertySelect {
    All,
    None,
    Only(Vec<Arc<PropertyTypeDefinition>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelection {
    Load,
    Skip,
}

/// Loading policy handed to the index reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFieldSelector {
    /// Every stored field
    All,
    /// Path and resource type only
    Mandatory,
    /// Mandatory fields plus the named property fields
    Fields(HashSet<String>),
}

impl DocumentFieldSelector {
    pub fn accept(&self, field: &str) -> FieldSelection {
        let load = match self {
            DocumentFieldSelector::All => true,
            DocumentFieldSelector::Mandatory => reserved::MANDATORY.contains(&field),
            DocumentFieldSelector::Fields(names) => reserved::MANDATORY.contains(&field) || names.contains(field),
        };
        if load {
            FieldSelection::Load
        } else {
            FieldSelection::Skip
        }
    }
}

impl From<&PropertySelect> for DocumentFieldSelector {
    fn from(select: &PropertySelect) -> Self {
        match select {
            PropertySelect::All => DocumentFieldSelector::All,
            PropertySelect::None => DocumentFieldSelector::Mandatory,
            PropertySelect::Only(defs) => {
                DocumentFieldSelector::Fields(defs.iter().map(|d| property_field_name(d)).collect())
            }
        }
    }
}
