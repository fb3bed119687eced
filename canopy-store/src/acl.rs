//! ACL persistence
//!
//! `acl_entry` rows exist only for resources with `acl_inherited = 0`. An
//! inherited ACL resolves to the entries of the nearest ancestor that has
//! its own.

use crate::error::{Result, StoreError};
use crate::lookup::LookupTables;
use crate::records::{descendant_pattern, path_column, to_millis};
use canopy_core::{Acl, Principal, Resource, ResourceId, ResourcePath};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;

/// Outcome of ACL reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclChange {
    /// Inherited before and after, same effective entries; no rows touched
    Unchanged,
    /// Entries removed, resource marked inherited
    Inherited,
    /// Entries replaced by this many rows
    Replaced(usize),
}

const ENTRY_SELECT: &str = "SELECT e.resource_id, a.name, e.user_or_group_name, e.is_user \
     FROM acl_entry e JOIN action_type a ON a.action_type_id = e.action_type_id";

fn collect_entries(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<HashMap<i64, Acl>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let mut rows = stmt.query(args)?;
    let mut acls: HashMap<i64, Acl> = HashMap::new();
    while let Some(row) = rows.next()? {
        let resource_id: i64 = row.get(0)?;
        let action: String = row.get(1)?;
        let name: String = row.get(2)?;
        let is_user: bool = row.get(3)?;
        acls.entry(resource_id)
            .or_default()
            .add_entry(LookupTables::privilege(&action)?, Principal::from_stored(&name, is_user));
    }
    for acl in acls.values_mut() {
        acl.set_inherited(false);
    }
    Ok(acls)
}

/// Entries of a resource's own ACL
pub fn own_entries(conn: &Connection, id: ResourceId) -> Result<Acl> {
    let sql = format!("{} WHERE e.resource_id = ?1", ENTRY_SELECT);
    let mut acls = collect_entries(conn, &sql, params![id.value()])?;
    let mut acl = acls.remove(&id.value()).unwrap_or_default();
    acl.set_inherited(false);
    Ok(acl)
}

/// Own ACL entries of every direct child of `parent`, keyed by resource id
pub fn child_entries(conn: &Connection, parent: &ResourcePath) -> Result<HashMap<i64, Acl>> {
    let sql = format!(
        "{} WHERE e.resource_id IN \
         (SELECT resource_id FROM resource WHERE uri LIKE ?1 ESCAPE '\\' AND depth = ?2)",
        ENTRY_SELECT
    );
    collect_entries(conn, &sql, params![descendant_pattern(parent), parent.depth() as i64 + 1])
}

/// Nearest proper ancestor of `path` with its own ACL
pub fn nearest_acl_ancestor(conn: &Connection, path: &ResourcePath) -> Result<Option<ResourceId>> {
    let ancestors = path.ancestors();
    if ancestors.is_empty() {
        return Ok(None);
    }
    let placeholders = vec!["?"; ancestors.len()].join(", ");
    let sql = format!(
        "SELECT resource_id FROM resource WHERE acl_inherited = 0 AND uri IN ({}) ORDER BY depth DESC LIMIT 1",
        placeholders
    );
    Ok(conn
        .query_row(&sql, params_from_iter(ancestors.iter().map(|a| a.as_str())), |row| {
            row.get(0).map(ResourceId)
        })
        .optional()?)
}

/// Effective ACL of a resource and, when inherited, where it comes from
pub fn effective(
    conn: &Connection,
    path: &ResourcePath,
    id: ResourceId,
    inherited: bool,
) -> Result<(Acl, Option<ResourceId>)> {
    if !inherited {
        return Ok((own_entries(conn, id)?, None));
    }
    match nearest_acl_ancestor(conn, path)? {
        Some(source) => Ok((own_entries(conn, source)?.to_inherited(), Some(source))),
        None => Ok((Acl::inheriting(), None)),
    }
}

fn is_inherited(conn: &Connection, id: ResourceId) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT acl_inherited FROM resource WHERE resource_id = ?1",
        params![id.value()],
        |row| row.get(0),
    )?)
}

/// Insert one row per (privilege, principal) and mark the resource as owning its ACL
pub fn insert_entries(
    conn: &Connection,
    lookups: &LookupTables,
    id: ResourceId,
    acl: &Acl,
    granted_by: &Principal,
    granted_at: DateTime<Utc>,
) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO acl_entry (resource_id, action_type_id, user_or_group_name, is_user, \
         granted_by_user_name, granted_date) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut inserted = 0;
    for (privilege, principal) in acl.entries() {
        inserted += stmt.execute(params![
            id.value(),
            lookups.action_id(privilege)?,
            principal.name(),
            principal.is_user(),
            granted_by.name(),
            to_millis(&granted_at),
        ])?;
    }
    conn.execute("UPDATE resource SET acl_inherited = 0 WHERE resource_id = ?1", params![id.value()])?;
    Ok(inserted)
}

/// Reconcile the persisted ACL of `id` with `resource.acl`
pub fn store_acl(conn: &Connection, lookups: &LookupTables, id: ResourceId, resource: &Resource) -> Result<AclChange> {
    let incoming = &resource.acl;
    if incoming.is_inherited() && is_inherited(conn, id)? {
        let (persisted, _) = effective(conn, &resource.path, id, true)?;
        if persisted.same_entries(incoming) {
            return Ok(AclChange::Unchanged);
        }
    }
    if !incoming.is_inherited() && incoming.is_empty() {
        return Err(StoreError::EmptyAcl(resource.path.clone()));
    }

    conn.execute("DELETE FROM acl_entry WHERE resource_id = ?1", params![id.value()])?;
    if incoming.is_inherited() {
        conn.execute("UPDATE resource SET acl_inherited = 1 WHERE resource_id = ?1", params![id.value()])?;
        return Ok(AclChange::Inherited);
    }
    let inserted = insert_entries(conn, lookups, id, incoming, &resource.properties_modified_by, Utc::now())?;
    Ok(AclChange::Replaced(inserted))
}

/// Paths in the subtree of `path` that carry their own ACL, ascending
pub fn discover(conn: &Connection, path: &ResourcePath) -> Result<Vec<ResourcePath>> {
    let mut stmt = conn.prepare_cached(
        "SELECT uri FROM resource WHERE acl_inherited = 0 AND (uri = ?1 OR uri LIKE ?2 ESCAPE '\\') ORDER BY uri",
    )?;
    let rows = stmt.query_map(params![path.as_str(), descendant_pattern(path)], |row| path_column(row, 0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records;
    use crate::schema;
    use canopy_core::Privilege;

    fn total_changes(conn: &Connection) -> i64 {
        conn.query_row("SELECT total_changes()", [], |row| row.get(0)).unwrap()
    }

    fn setup() -> (Connection, LookupTables) {
        let conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();
        let lookups = LookupTables::load(&conn).unwrap();
        (conn, lookups)
    }

    fn put(conn: &Connection, lookups: &LookupTables, resource: &Resource) -> ResourceId {
        let (id, _) = records::upsert(conn, resource).unwrap();
        store_acl(conn, lookups, id, resource).unwrap();
        id
    }

    fn public_acl() -> Acl {
        let mut acl = Acl::new();
        acl.add_entry(Privilege::Read, Principal::all());
        acl.add_entry(Privilege::All, Principal::user("root"));
        acl
    }

    #[test]
    fn test_inherited_unchanged_acl_touches_no_rows() {
        let (conn, lookups) = setup();
        let owner = Principal::user("root");
        let root = Resource::new(ResourcePath::root(), true, owner.clone()).with_acl(public_acl());
        let root_id = put(&conn, &lookups, &root);
        let doc = Resource::new(ResourcePath::parse("/doc").unwrap(), false, owner);
        let doc_id = put(&conn, &lookups, &doc);

        let (acl, from) = effective(&conn, &doc.path, doc_id, true).unwrap();
        assert_eq!(from, Some(root_id));
        let loaded = doc.clone().with_acl(acl);

        let before = total_changes(&conn);
        assert_eq!(store_acl(&conn, &lookups, doc_id, &loaded).unwrap(), AclChange::Unchanged);
        assert_eq!(total_changes(&conn), before);
    }

    #[test]
    fn test_own_acl_replaces_rows() {
        let (conn, lookups) = setup();
        let mut acl = public_acl();
        let res = Resource::new(ResourcePath::parse("/a").unwrap(), true, Principal::user("root")).with_acl(acl.clone());
        let id = put(&conn, &lookups, &res);
        assert!(own_entries(&conn, id).unwrap().same_entries(&acl));

        acl.remove_entry(Privilege::Read, &Principal::all());
        acl.add_entry(Privilege::ReadWrite, Principal::group("editors"));
        let res = res.with_acl(acl.clone());
        assert_eq!(store_acl(&conn, &lookups, id, &res).unwrap(), AclChange::Replaced(2));
        let stored = own_entries(&conn, id).unwrap();
        assert!(stored.same_entries(&acl));
        assert!(!stored.is_inherited());

        let res = res.with_acl(Acl::inheriting());
        assert_eq!(store_acl(&conn, &lookups, id, &res).unwrap(), AclChange::Inherited);
        assert!(own_entries(&conn, id).unwrap().is_empty());
        assert_eq!(discover(&conn, &ResourcePath::root()).unwrap(), Vec::<ResourcePath>::new());
    }

    #[test]
    fn test_empty_own_acl_is_rejected() {
        let (conn, lookups) = setup();
        let res = Resource::new(ResourcePath::parse("/a").unwrap(), true, Principal::user("root")).with_acl(Acl::new());
        let (id, _) = records::upsert(&conn, &res).unwrap();
        assert!(matches!(store_acl(&conn, &lookups, id, &res), Err(StoreError::EmptyAcl(_))));
    }

    #[test]
    fn test_unknown_action_rolls_back_the_resource_row() {
        let (conn, _) = setup();
        let res = Resource::new(ResourcePath::parse("/a").unwrap(), true, Principal::user("root")).with_acl(public_acl());

        let tx = conn.unchecked_transaction().unwrap();
        let (id, _) = records::upsert(&tx, &res).unwrap();
        let err = store_acl(&tx, &LookupTables::default(), id, &res).unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { kind: "action", .. }));
        drop(tx);

        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM resource", [], |row| row.get(0)).unwrap();
        assert_eq!(rows, 0);
        let entries: i64 = conn.query_row("SELECT COUNT(*) FROM acl_entry", [], |row| row.get(0)).unwrap();
        assert_eq!(entries, 0);
    }

    #[test]
    fn test_nearest_ancestor_wins() {
        let (conn, lookups) = setup();
        let owner = Principal::user("root");
        put(&conn, &lookups, &Resource::new(ResourcePath::root(), true, owner.clone()).with_acl(public_acl()));
        let mut private = Acl::new();
        private.add_entry(Privilege::All, Principal::group("staff"));
        let a = Resource::new(ResourcePath::parse("/a").unwrap(), true, owner.clone()).with_acl(private.clone());
        let a_id = put(&conn, &lookups, &a);
        let leaf = Resource::new(ResourcePath::parse("/a/b/c").unwrap(), false, owner);
        let leaf_id = put(&conn, &lookups, &leaf);

        let (acl, from) = effective(&conn, &leaf.path, leaf_id, true).unwrap();
        assert_eq!(from, Some(a_id));
        assert!(acl.is_inherited());
        assert!(acl.same_entries(&private));
        assert_eq!(discover(&conn, &ResourcePath::root()).unwrap().len(), 2);
    }
}
