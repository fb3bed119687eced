//! Store errors

use crate::content::ContentError;
use canopy_core::{PathError, ResourcePath};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Timed out waiting for a pooled connection")]
    PoolTimeout,

    /// A name missing from a lookup table; the schema and the code disagree
    #[error("Unknown {kind} name {name:?} in lookup table")]
    SchemaMismatch { kind: &'static str, name: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Resource not found: {0}")]
    NotFound(ResourcePath),

    #[error("Resource already exists: {0}")]
    AlreadyExists(ResourcePath),

    #[error("Cannot copy {from} to {to}: {reason}")]
    InvalidCopy {
        from: ResourcePath,
        to: ResourcePath,
        reason: &'static str,
    },

    #[error("Resource {0} has its own ACL but no entries")]
    EmptyAcl(ResourcePath),

    #[error("Content store error: {0}")]
    Content(#[from] ContentError),

    #[error("Invalid path in database: {0}")]
    Path(#[from] PathError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
