//! Resource type tree
//!
//! In-memory registry of primary resource types (a single-rooted hierarchy)
//! and mixin types. Each type declares property definitions; a type also
//! exposes the definitions of its ancestors and of its mixins, transitively.
//! The tree is built once and read concurrently afterwards.

use crate::property::PropertyTypeDefinition;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Errors raised while assembling a type tree
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeTreeError {
    #[error("Duplicate resource type: {0}")]
    DuplicateType(String),

    #[error("Type tree needs exactly one root type, found {0}")]
    RootCount(usize),

    #[error("Type {type_name} has unknown parent {parent}")]
    UnknownParent { type_name: String, parent: String },

    #[error("Type {type_name} refers to unknown mixin {mixin}")]
    UnknownMixin { type_name: String, mixin: String },

    #[error("Type {0} is not reachable from the root")]
    Unreachable(String),

    #[error("Mixin cycle through {0}")]
    MixinCycle(String),
}

/// A primary resource type
#[derive(Debug, Clone)]
pub struct PrimaryResourceType {
    pub name: String,
    pub parent: Option<String>,
    pub mixins: Vec<String>,
    pub properties: Vec<Arc<PropertyTypeDefinition>>,
}

impl PrimaryResourceType {
    pub fn new(name: impl Into<String>, parent: Option<&str>) -> Self {
        Self {
            name: name.into(),
            parent: parent.map(str::to_string),
            mixins: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn with_mixin(mut self, mixin: impl Into<String>) -> Self {
        self.mixins.push(mixin.into());
        self
    }

    pub fn with_property(mut self, def: PropertyTypeDefinition) -> Self {
        self.properties.push(Arc::new(def));
        self
    }
}

/// A mixin type: a reusable bundle of property definitions
#[derive(Debug, Clone)]
pub struct MixinResourceType {
    pub name: String,
    pub mixins: Vec<String>,
    pub properties: Vec<Arc<PropertyTypeDefinition>>,
}

impl MixinResourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), mixins: Vec::new(), properties: Vec::new() }
    }

    pub fn with_mixin(mut self, mixin: impl Into<String>) -> Self {
        self.mixins.push(mixin.into());
        self
    }

    pub fn with_property(mut self, def: PropertyTypeDefinition) -> Self {
        self.properties.push(Arc::new(def));
        self
    }
}

/// Collects types before validation
#[derive(Debug, Default)]
pub struct ResourceTypeTreeBuilder {
    primary: Vec<PrimaryResourceType>,
    mixins: Vec<MixinResourceType>,
}

impl ResourceTypeTreeBuilder {
    pub fn primary(mut self, t: PrimaryResourceType) -> Self {
        self.primary.push(t);
        self
    }

    pub fn mixin(mut self, m: MixinResourceType) -> Self {
        self.mixins.push(m);
        self
    }

    pub fn build(self) -> Result<ResourceTypeTree, TypeTreeError> {
        let mut primary = HashMap::new();
        let mut mixins = HashMap::new();
        for t in self.primary {
            if primary.contains_key(&t.name) {
                return Err(TypeTreeError::DuplicateType(t.name));
            }
            primary.insert(t.name.clone(), t);
        }
        for m in self.mixins {
            if primary.contains_key(&m.name) || mixins.contains_key(&m.name) {
                return Err(TypeTreeError::DuplicateType(m.name));
            }
            mixins.insert(m.name.clone(), m);
        }

        let roots: Vec<&String> = primary.values().filter(|t| t.parent.is_none()).map(|t| &t.name).collect();
        if roots.len() != 1 {
            return Err(TypeTreeError::RootCount(roots.len()));
        }
        let root = roots[0].clone();

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for t in primary.values() {
            if let Some(parent) = &t.parent {
                if !primary.contains_key(parent) {
                    return Err(TypeTreeError::UnknownParent {
                        type_name: t.name.clone(),
                        parent: parent.clone(),
                    });
                }
                children.entry(parent.clone()).or_default().push(t.name.clone());
            }
            for mixin in &t.mixins {
                if !mixins.contains_key(mixin) {
                    return Err(TypeTreeError::UnknownMixin {
                        type_name: t.name.clone(),
                        mixin: mixin.clone(),
                    });
                }
            }
        }
        for m in mixins.values() {
            for mixin in &m.mixins {
                if !mixins.contains_key(mixin) {
                    return Err(TypeTreeError::UnknownMixin {
                        type_name: m.name.clone(),
                        mixin: mixin.clone(),
                    });
                }
            }
        }
        for names in children.values_mut() {
            names.sort();
        }

        let tree = ResourceTypeTree { root, primary, mixins, children };

        let reachable: HashSet<&str> = tree.walk().iter().map(|t| t.name.as_str()).collect();
        if let Some(t) = tree.primary.keys().find(|name| !reachable.contains(name.as_str())) {
            return Err(TypeTreeError::Unreachable(t.clone()));
        }
        for name in tree.mixins.keys() {
            tree.check_mixin_cycle(name, &mut Vec::new())?;
        }
        Ok(tree)
    }
}

/// Validated, immutable resource type tree
#[derive(Debug, Clone)]
pub struct ResourceTypeTree {
    root: String,
    primary: HashMap<String, PrimaryResourceType>,
    mixins: HashMap<String, MixinResourceType>,
    children: HashMap<String, Vec<String>>,
}

impl ResourceTypeTree {
    pub fn builder() -> ResourceTypeTreeBuilder {
        ResourceTypeTreeBuilder::default()
    }

    pub fn root(&self) -> &PrimaryResourceType {
        &self.primary[&self.root]
    }

    pub fn resource_type(&self, name: &str) -> Option<&PrimaryResourceType> {
        self.primary.get(name)
    }

    pub fn mixin(&self, name: &str) -> Option<&MixinResourceType> {
        self.mixins.get(name)
    }

    /// Direct subtypes, sorted by name
    pub fn children(&self, name: &str) -> &[String] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when `name` is `ancestor` or one of its subtypes
    pub fn is_of_type(&self, name: &str, ancestor: &str) -> bool {
        let mut current = self.primary.get(name);
        while let Some(t) = current {
            if t.name == ancestor {
                return true;
            }
            current = t.parent.as_deref().and_then(|p| self.primary.get(p));
        }
        false
    }

    /// All primary types, depth first from the root, siblings by name
    pub fn walk(&self) -> Vec<&PrimaryResourceType> {
        let mut out = Vec::with_capacity(self.primary.len());
        let mut stack = vec![self.root.as_str()];
        while let Some(name) = stack.pop() {
            let Some(t) = self.primary.get(name) else { continue };
            out.push(t);
            for child in self.children(name).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Definitions visible on a resource of type `name`
    ///
    /// Own definitions and mixins first, then those of each ancestor up to the
    /// root. A (namespace, name) pair appears once, first occurrence wins.
    pub fn property_definitions(&self, name: &str) -> Vec<Arc<PropertyTypeDefinition>> {
        let mut out: Vec<Arc<PropertyTypeDefinition>> = Vec::new();
        let mut current = self.primary.get(name);
        while let Some(t) = current {
            let mut defs = t.properties.clone();
            let mut seen = HashSet::new();
            for mixin in &t.mixins {
                self.collect_mixin(mixin, &mut defs, &mut seen);
            }
            for def in defs {
                if !out.iter().any(|d| d.same_property(&def)) {
                    out.push(def);
                }
            }
            current = t.parent.as_deref().and_then(|p| self.primary.get(p));
        }
        out
    }

    /// Every definition in the tree in canonical order, duplicates included
    ///
    /// Walk order is `walk()`; for each type its own definitions come before
    /// those of its mixins.
    pub fn all_property_definitions(&self) -> Vec<Arc<PropertyTypeDefinition>> {
        let mut out = Vec::new();
        for t in self.walk() {
            out.extend(t.properties.iter().cloned());
            let mut seen = HashSet::new();
            for mixin in &t.mixins {
                self.collect_mixin(mixin, &mut out, &mut seen);
            }
        }
        out
    }

    fn collect_mixin(&self, name: &str, out: &mut Vec<Arc<PropertyTypeDefinition>>, seen: &mut HashSet<String>) {
        if !seen.insert(name.to_string()) {
            return;
        }
        let Some(m) = self.mixins.get(name) else { return };
        out.extend(m.properties.iter().cloned());
        for nested in &m.mixins {
            self.collect_mixin(nested, out, seen);
        }
    }

    fn check_mixin_cycle(&self, name: &str, path: &mut Vec<String>) -> Result<(), TypeTreeError> {
        if path.iter().any(|p| p == name) {
            return Err(TypeTreeError::MixinCycle(name.to_string()));
        }
        path.push(name.to_string());
        if let Some(m) = self.mixins.get(name) {
            for nested in &m.mixins {
                self.check_mixin_cycle(nested, path)?;
            }
        }
        path.pop();
        Ok(())
    }
}
