//! Canopy Search Library
//!
//! Projects resource property sets into search documents and back:
//! - Value codecs (order-preserving indexed tokens, exact stored bytes)
//! - Canonical field naming over the resource type tree
//! - Shallow JSON attribute projection
//! - Lazily decoded property sets and field selectors for index reads

pub mod codec;
pub mod document;
pub mod error;
pub mod fields;
pub mod json;
pub mod lazy;
pub mod mapper;
pub mod selector;

pub use codec::ValueError;
pub use document::{Field, FieldValue, SearchDocument};
pub use error::{MappingError, Result};
pub use fields::{reserved, FieldNames};
pub use lazy::LazyPropertySet;
pub use mapper::DocumentMapper;
pub use selector::{DocumentFieldSelector, FieldSelection, PropertySelect};
