//! Resource paths
//!
//! A resource path is an absolute, slash-delimited path such as `/docs/readme.txt`.
//! The root is `/` at depth 0; every segment below it adds one to the depth.
//! Parent/child relations between resources are derived from paths alone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors raised while parsing a resource path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("Path must be absolute: {0:?}")]
    NotAbsolute(String),

    #[error("Path has an empty segment: {0:?}")]
    EmptySegment(String),

    #[error("Path has a relative segment: {0:?}")]
    RelativeSegment(String),

    #[error("Invalid resource name: {0:?}")]
    InvalidName(String),
}

/// Absolute path of a resource in the tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePath(String);

impl ResourcePath {
    /// The root path `/`
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse and validate a path
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if !path.starts_with('/') {
            return Err(PathError::NotAbsolute(path.to_string()));
        }
        if path == "/" {
            return Ok(Self::root());
        }
        for segment in path[1..].split('/') {
            match segment {
                "" => return Err(PathError::EmptySegment(path.to_string())),
                "." | ".." => return Err(PathError::RelativeSegment(path.to_string())),
                _ => {}
            }
        }
        Ok(Self(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Number of segments below the root
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.matches('/').count()
        }
    }

    /// Last segment, empty for the root
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(pos) => &self.0[pos + 1..],
            None => "",
        }
    }

    pub fn parent(&self) -> Option<ResourcePath> {
        if self.is_root() {
            return None;
        }
        let pos = self.0.rfind('/')?;
        if pos == 0 {
            Some(Self::root())
        } else {
            Some(Self(self.0[..pos].to_string()))
        }
    }

    /// All proper ancestors, root first
    pub fn ancestors(&self) -> Vec<ResourcePath> {
        let mut ancestors = Vec::with_capacity(self.depth());
        let mut current = self.parent();
        while let Some(path) = current {
            current = path.parent();
            ancestors.push(path);
        }
        ancestors.reverse();
        ancestors
    }

    /// Append a single segment
    pub fn child(&self, name: &str) -> Result<ResourcePath, PathError> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(PathError::InvalidName(name.to_string()));
        }
        if self.is_root() {
            Ok(Self(format!("/{}", name)))
        } else {
            Ok(Self(format!("{}/{}", self.0, name)))
        }
    }

    /// Prefix shared by every proper descendant: `X + "/"`, or `/` for the root
    pub fn descendant_prefix(&self) -> String {
        if self.is_root() {
            "/".to_string()
        } else {
            format!("{}/", self.0)
        }
    }

    /// True when `other` lies strictly below this path
    pub fn is_ancestor_of(&self, other: &ResourcePath) -> bool {
        other.0 != self.0 && other.0.starts_with(&self.descendant_prefix())
    }

    /// True when this path equals `root` or lies below it
    pub fn is_in_subtree_of(&self, root: &ResourcePath) -> bool {
        self == root || root.is_ancestor_of(self)
    }

    /// Move this path from under `from` to under `to`
    ///
    /// Returns `None` when this path is not in the subtree of `from`.
    pub fn rebase(&self, from: &ResourcePath, to: &ResourcePath) -> Option<ResourcePath> {
        if self == from {
            return Some(to.clone());
        }
        if !from.is_ancestor_of(self) {
            return None;
        }
        let suffix = &self.0[from.descendant_prefix().len()..];
        if to.is_root() {
            Some(Self(format!("/{}", suffix)))
        } else {
            Some(Self(format!("{}/{}", to.0, suffix)))
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourcePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourcePath> for String {
    fn from(path: ResourcePath) -> Self {
        path.0
    }
}

impl AsRef<str> for ResourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
