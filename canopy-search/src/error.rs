//! Mapping errors

use crate::codec::ValueError;
use canopy_core::{PathError, PropertyError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Document has no {0} field")]
    MissingField(String),

    /// A single-valued property found with several stored occurrences
    #[error("Single-valued field {field} has {count} stored occurrences")]
    Cardinality { field: String, count: usize },

    #[error("Stored occurrences of field {0} are not consecutive")]
    FragmentedField(String),

    #[error("Cannot decode field {field}: {source}")]
    Decode {
        field: String,
        #[source]
        source: ValueError,
    },

    #[error("Cannot encode field {field}: {source}")]
    Encode {
        field: String,
        #[source]
        source: ValueError,
    },

    #[error("Invalid path: {0}")]
    Path(#[from] PathError),

    #[error("Invalid property: {0}")]
    Property(#[from] PropertyError),
}

pub type Result<T> = std::result::Result<T, MappingError>;
