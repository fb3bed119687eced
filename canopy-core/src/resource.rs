//! Resource records
//!
//! A `Resource` is the authoritative snapshot of one node in the tree, as
//! persisted by the resource tree store: metadata, ACL, lock, direct child
//! paths and flat extra properties.

use crate::acl::{Acl, Principal};
use crate::path::ResourcePath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric resource identifier, assigned on creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub i64);

impl ResourceId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lock type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockType {
    ExclusiveWrite,
    SharedAclWrite,
}

impl LockType {
    pub const ALL: [LockType; 2] = [LockType::ExclusiveWrite, LockType::SharedAclWrite];

    /// Lock type name as persisted in the lock type lookup table
    pub fn name(&self) -> &'static str {
        match self {
            LockType::ExclusiveWrite => "EXCLUSIVE_WRITE",
            LockType::SharedAclWrite => "SHARED_ACL_WRITE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

/// WebDAV lock depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockDepth {
    Zero,
    One,
    Infinity,
}

impl LockDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockDepth::Zero => "0",
            LockDepth::One => "1",
            LockDepth::Infinity => "infinity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "0" => Some(LockDepth::Zero),
            "1" => Some(LockDepth::One),
            "infinity" => Some(LockDepth::Infinity),
            _ => None,
        }
    }
}

/// Advisory, timed lock on a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub token: String,
    pub lock_type: LockType,
    pub principal: Principal,
    pub owner_info: String,
    pub depth: LockDepth,
    pub timeout: DateTime<Utc>,
}

impl Lock {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.timeout <= now
    }
}

/// Flat string-valued custom property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraProperty {
    /// Namespace URI, empty for the default namespace
    pub namespace: String,
    pub name: String,
    pub value: String,
}

impl ExtraProperty {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into(), value: value.into() }
    }
}

/// Snapshot of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Assigned by the store; `None` until first stored
    pub id: Option<ResourceId>,
    pub path: ResourcePath,
    pub collection: bool,
    pub owner: Principal,
    pub created_by: Principal,
    pub creation_time: DateTime<Utc>,
    pub content_modified_by: Principal,
    pub content_last_modified: DateTime<Utc>,
    pub properties_modified_by: Principal,
    pub properties_last_modified: DateTime<Utc>,
    pub display_name: Option<String>,
    pub content_type: Option<String>,
    pub character_encoding: Option<String>,
    pub content_language: Option<String>,
    pub acl: Acl,
    /// Resource whose ACL this one inherits, when the ACL is inherited
    pub acl_inherited_from: Option<ResourceId>,
    pub lock: Option<Lock>,
    /// Direct child paths, ascending
    pub child_paths: Vec<ResourcePath>,
    pub properties: Vec<ExtraProperty>,
}

impl Resource {
    /// A new, not yet stored resource owned by `owner`
    pub fn new(path: ResourcePath, collection: bool, owner: Principal) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            path,
            collection,
            created_by: owner.clone(),
            content_modified_by: owner.clone(),
            properties_modified_by: owner.clone(),
            owner,
            creation_time: now,
            content_last_modified: now,
            properties_last_modified: now,
            display_name: None,
            content_type: None,
            character_encoding: None,
            content_language: None,
            acl: Acl::inheriting(),
            acl_inherited_from: None,
            lock: None,
            child_paths: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_acl(mut self, acl: Acl) -> Self {
        self.acl = acl;
        self
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn property(&self, namespace: &str, name: &str) -> Option<&ExtraProperty> {
        self.properties.iter().find(|p| p.namespace == namespace && p.name == name)
    }

    /// Replace or add a flat property
    pub fn set_property(&mut self, namespace: &str, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.properties.iter_mut().find(|p| p.namespace == namespace && p.name == name) {
            Some(existing) => existing.value = value,
            None => self.properties.push(ExtraProperty::new(namespace, name, value)),
        }
    }

    pub fn remove_property(&mut self, namespace: &str, name: &str) -> Option<ExtraProperty> {
        let pos = self.properties.iter().position(|p| p.namespace == namespace && p.name == name)?;
        Some(self.properties.remove(pos))
    }
}

/// One append-only change log row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Monotonic entry id, gives insertion order
    pub id: i64,
    pub logger_id: i64,
    pub logger_type: i64,
    pub path: ResourcePath,
    pub operation: String,
    pub resource_id: Option<ResourceId>,
    pub collection: bool,
    pub timestamp: DateTime<Utc>,
}

/// Operation names used by repository write paths
pub mod operations {
    pub const CREATED: &str = "created";
    pub const DELETED: &str = "deleted";
    pub const MODIFIED_CONTENT: &str = "modified_content";
    pub const MODIFIED_PROPS: &str = "modified_props";
    pub const MODIFIED_ACL: &str = "modified_acl";
}
