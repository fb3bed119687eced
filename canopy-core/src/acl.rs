//! Access control model
//!
//! An ACL is a set of (privilege, principal) grants on a resource. A resource
//! either carries its own ACL or inherits the ACL of its nearest ancestor that
//! has one.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Prefix shared by all pseudo principal names
pub const PSEUDO_PREFIX: &str = "pseudo:";

/// Kind of security principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrincipalKind {
    User,
    Group,
    /// Pseudo principals such as "everyone" or "the owner"
    Pseudo,
}

/// Opaque identity of a user, group or pseudo principal
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal {
    name: String,
    kind: PrincipalKind,
}

impl Principal {
    pub fn user(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: PrincipalKind::User }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: PrincipalKind::Group }
    }

    /// Everyone, authenticated or not
    pub fn all() -> Self {
        Self { name: format!("{}all", PSEUDO_PREFIX), kind: PrincipalKind::Pseudo }
    }

    /// Whoever owns the resource
    pub fn owner() -> Self {
        Self { name: format!("{}owner", PSEUDO_PREFIX), kind: PrincipalKind::Pseudo }
    }

    pub fn authenticated() -> Self {
        Self { name: format!("{}authenticated", PSEUDO_PREFIX), kind: PrincipalKind::Pseudo }
    }

    /// Rebuild a principal from its persisted (name, is-user) form
    pub fn from_stored(name: &str, is_user: bool) -> Self {
        if name.starts_with(PSEUDO_PREFIX) {
            Self { name: name.to_string(), kind: PrincipalKind::Pseudo }
        } else if is_user {
            Self::user(name)
        } else {
            Self::group(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PrincipalKind {
        self.kind
    }

    /// Users and pseudo principals are persisted with the user flag set
    pub fn is_user(&self) -> bool {
        self.kind != PrincipalKind::Group
    }

    pub fn is_pseudo(&self) -> bool {
        self.kind == PrincipalKind::Pseudo
    }

    /// Name qualified by kind, unique across users and groups
    ///
    /// Users: `u:name`, groups: `g:name`, pseudo principals: their own name.
    pub fn qualified_name(&self) -> String {
        match self.kind {
            PrincipalKind::User => format!("u:{}", self.name),
            PrincipalKind::Group => format!("g:{}", self.name),
            PrincipalKind::Pseudo => self.name.clone(),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// Grantable action on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Privilege {
    All,
    ReadWrite,
    AddComment,
    Read,
    ReadProcessed,
}

impl Privilege {
    pub const ALL: [Privilege; 5] = [
        Privilege::All,
        Privilege::ReadWrite,
        Privilege::AddComment,
        Privilege::Read,
        Privilege::ReadProcessed,
    ];

    /// Action name as persisted in the action lookup table
    pub fn name(&self) -> &'static str {
        match self {
            Privilege::All => "all",
            Privilege::ReadWrite => "read-write",
            Privilege::AddComment => "add-comment",
            Privilege::Read => "read",
            Privilege::ReadProcessed => "read-processed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Whether holding this privilege lets a principal read the resource
    pub fn grants_read(&self) -> bool {
        !matches!(self, Privilege::AddComment)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Access control list of a resource
///
/// An inherited ACL carries the effective entries of the ancestor it was
/// inherited from, so two inherited ACLs compare equal only when they grant
/// the same thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    inherited: bool,
    entries: BTreeMap<Privilege, BTreeSet<Principal>>,
}

impl Acl {
    /// An empty ACL owned by the resource itself
    pub fn new() -> Self {
        Self { inherited: false, entries: BTreeMap::new() }
    }

    /// An ACL inherited from an ancestor, with no known effective entries yet
    pub fn inheriting() -> Self {
        Self { inherited: true, entries: BTreeMap::new() }
    }

    pub fn is_inherited(&self) -> bool {
        self.inherited
    }

    pub fn set_inherited(&mut self, inherited: bool) {
        self.inherited = inherited;
    }

    /// Same entries, marked as inherited
    pub fn to_inherited(&self) -> Self {
        Self { inherited: true, entries: self.entries.clone() }
    }

    pub fn add_entry(&mut self, privilege: Privilege, principal: Principal) {
        self.entries.entry(privilege).or_default().insert(principal);
    }

    pub fn remove_entry(&mut self, privilege: Privilege, principal: &Principal) -> bool {
        let Some(principals) = self.entries.get_mut(&privilege) else {
            return false;
        };
        let removed = principals.remove(principal);
        if principals.is_empty() {
            self.entries.remove(&privilege);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn privileges(&self) -> impl Iterator<Item = Privilege> + '_ {
        self.entries.keys().copied()
    }

    pub fn principals(&self, privilege: Privilege) -> impl Iterator<Item = &Principal> + '_ {
        self.entries.get(&privilege).into_iter().flatten()
    }

    /// Every (privilege, principal) pair in a stable order
    pub fn entries(&self) -> impl Iterator<Item = (Privilege, &Principal)> + '_ {
        self.entries
            .iter()
            .flat_map(|(privilege, principals)| principals.iter().map(move |p| (*privilege, p)))
    }

    pub fn has_entry(&self, privilege: Privilege, principal: &Principal) -> bool {
        self.entries.get(&privilege).is_some_and(|set| set.contains(principal))
    }

    /// Compare granted entries, ignoring the inherited flag
    pub fn same_entries(&self, other: &Acl) -> bool {
        self.entries == other.entries
    }

    /// Principals holding any privilege that grants read access
    pub fn read_principals(&self) -> BTreeSet<Principal> {
        self.entries
            .iter()
            .filter(|(privilege, _)| privilege.grants_read())
            .flat_map(|(_, principals)| principals.iter().cloned())
            .collect()
    }

    pub fn read_granted_to_all(&self) -> bool {
        let all = Principal::all();
        self.entries
            .iter()
            .any(|(privilege, principals)| privilege.grants_read() && principals.contains(&all))
    }
}

impl Default for Acl {
    fn default() -> Self {
        Self::inheriting()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_stored_form() {
        assert_eq!(Principal::from_stored("alice", true), Principal::user("alice"));
        assert_eq!(Principal::from_stored("editors", false), Principal::group("editors"));
        assert_eq!(Principal::from_stored("pseudo:all", true), Principal::all());
        assert!(Principal::all().is_user());
        assert!(!Principal::group("editors").is_user());
        assert_eq!(Principal::group("editors").qualified_name(), "g:editors");
    }

    #[test]
    fn test_privilege_names_round_trip() {
        for privilege in Privilege::ALL {
            assert_eq!(Privilege::from_name(privilege.name()), Some(privilege));
        }
        assert_eq!(Privilege::from_name("write"), None);
    }

    #[test]
    fn test_entries_and_removal() {
        let mut acl = Acl::new();
        acl.add_entry(Privilege::Read, Principal::user("bob"));
        acl.add_entry(Privilege::All, Principal::user("alice"));
        acl.add_entry(Privilege::Read, Principal::user("bob"));
        assert_eq!(acl.entries().count(), 2);
        assert!(acl.has_entry(Privilege::All, &Principal::user("alice")));

        assert!(acl.remove_entry(Privilege::Read, &Principal::user("bob")));
        assert!(!acl.remove_entry(Privilege::Read, &Principal::user("bob")));
        assert_eq!(acl.privileges().collect::<Vec<_>>(), vec![Privilege::All]);
    }

    #[test]
    fn test_read_principals_skip_comment_only_grants() {
        let mut acl = Acl::new();
        acl.add_entry(Privilege::AddComment, Principal::user("carol"));
        acl.add_entry(Privilege::ReadProcessed, Principal::group("staff"));
        let readers = acl.read_principals();
        assert_eq!(readers.len(), 1);
        assert!(readers.contains(&Principal::group("staff")));
        assert!(!acl.read_granted_to_all());

        acl.add_entry(Privilege::Read, Principal::all());
        assert!(acl.read_granted_to_all());
    }

    #[test]
    fn test_same_entries_ignores_inherited_flag() {
        let mut own = Acl::new();
        own.add_entry(Privilege::Read, Principal::all());
        let inherited = own.to_inherited();
        assert_ne!(own, inherited);
        assert!(own.same_entries(&inherited));
    }
}
