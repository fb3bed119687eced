//! Canopy Core Library
//!
//! Shared data model for the Canopy content repository:
//! - Resource paths and subtree addressing
//! - Resource records, locks, flat extra properties and change log entries
//! - Principals and access control lists
//! - Typed property values and definitions
//! - The resource type tree

pub mod acl;
pub mod path;
pub mod property;
pub mod resource;
pub mod types;

pub use acl::{Acl, Principal, PrincipalKind, Privilege};
pub use path::{PathError, ResourcePath};
pub use property::{
    BinaryValue, Namespace, Property, PropertyError, PropertyTypeDefinition, ResourcePropertySet, Value, ValueType,
};
pub use resource::{operations, ChangeLogEntry, ExtraProperty, Lock, LockDepth, LockType, Resource, ResourceId};
pub use types::{MixinResourceType, PrimaryResourceType, ResourceTypeTree, ResourceTypeTreeBuilder, TypeTreeError};
