//! Resource rows and subtree addressing
//!
//! A subtree of X is `uri = X OR uri LIKE 'X/%'`; LIKE is case-sensitive on
//! every pooled connection and the prefix is escaped. Children of X are the
//! subtree rows at exactly `depth(X) + 1`.

use crate::error::Result;
use canopy_core::{Acl, Principal, Resource, ResourceId, ResourcePath};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(crate) const RESOURCE_COLUMNS: &str = "resource_id, uri, is_collection, resource_owner, created_by, \
     creation_time, content_modified_by, content_last_modified, properties_modified_by, \
     properties_last_modified, display_name, content_type, character_encoding, content_language, acl_inherited";

pub(crate) fn to_millis(time: &DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Epoch milliseconds at `index`; values outside chrono's range are a conversion failure
pub(crate) fn time_column(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(index)?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Integer,
            format!("timestamp {} out of range", millis).into(),
        )
    })
}

/// LIKE pattern matching every proper descendant of `path`
pub(crate) fn descendant_pattern(path: &ResourcePath) -> String {
    let mut pattern = String::new();
    for c in path.descendant_prefix().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub(crate) fn path_column(row: &Row<'_>, index: usize) -> rusqlite::Result<ResourcePath> {
    let uri: String = row.get(index)?;
    ResourcePath::parse(&uri).map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn principal_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Principal> {
    let name: String = row.get(index)?;
    Ok(Principal::from_stored(&name, true))
}

/// Map a row selected with `RESOURCE_COLUMNS`
///
/// The ACL comes back empty, marked inherited or not; entries are loaded separately.
pub(crate) fn map_resource(row: &Row<'_>) -> rusqlite::Result<Resource> {
    let acl_inherited: bool = row.get(14)?;
    Ok(Resource {
        id: Some(ResourceId(row.get(0)?)),
        path: path_column(row, 1)?,
        collection: row.get(2)?,
        owner: principal_column(row, 3)?,
        created_by: principal_column(row, 4)?,
        creation_time: time_column(row, 5)?,
        content_modified_by: principal_column(row, 6)?,
        content_last_modified: time_column(row, 7)?,
        properties_modified_by: principal_column(row, 8)?,
        properties_last_modified: time_column(row, 9)?,
        display_name: row.get(10)?,
        content_type: row.get(11)?,
        character_encoding: row.get(12)?,
        content_language: row.get(13)?,
        acl: if acl_inherited { Acl::inheriting() } else { Acl::new() },
        acl_inherited_from: None,
        lock: None,
        child_paths: Vec::new(),
        properties: Vec::new(),
    })
}

pub fn find(conn: &Connection, path: &ResourcePath) -> Result<Option<Resource>> {
    let sql = format!("SELECT {} FROM resource WHERE uri = ?1", RESOURCE_COLUMNS);
    Ok(conn.query_row(&sql, params![path.as_str()], map_resource).optional()?)
}

pub fn find_id(conn: &Connection, path: &ResourcePath) -> Result<Option<ResourceId>> {
    Ok(conn
        .query_row("SELECT resource_id FROM resource WHERE uri = ?1", params![path.as_str()], |row| {
            row.get(0).map(ResourceId)
        })
        .optional()?)
}

/// Direct children of `parent`, ascending
pub fn children(conn: &Connection, parent: &ResourcePath) -> Result<Vec<Resource>> {
    let sql = format!(
        "SELECT {} FROM resource WHERE uri LIKE ?1 ESCAPE '\\' AND depth = ?2 ORDER BY uri",
        RESOURCE_COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params![descendant_pattern(parent), parent.depth() as i64 + 1], map_resource)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Paths `levels` below `parent`, ascending
pub fn descendant_paths_at(conn: &Connection, parent: &ResourcePath, levels: usize) -> Result<Vec<ResourcePath>> {
    let mut stmt =
        conn.prepare_cached("SELECT uri FROM resource WHERE uri LIKE ?1 ESCAPE '\\' AND depth = ?2 ORDER BY uri")?;
    let rows = stmt.query_map(params![descendant_pattern(parent), (parent.depth() + levels) as i64], |row| {
        path_column(row, 0)
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// `path` and everything below it, ascending
pub fn subtree_paths(conn: &Connection, path: &ResourcePath) -> Result<Vec<ResourcePath>> {
    let mut stmt =
        conn.prepare_cached("SELECT uri FROM resource WHERE uri = ?1 OR uri LIKE ?2 ESCAPE '\\' ORDER BY uri")?;
    let rows = stmt.query_map(params![path.as_str(), descendant_pattern(path)], |row| path_column(row, 0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Insert or update the resource row; returns the id and whether it was created
///
/// The `acl_inherited` column is left to ACL reconciliation.
pub fn upsert(conn: &Connection, resource: &Resource) -> Result<(ResourceId, bool)> {
    let uri = resource.path.as_str();
    let updated = conn.execute(
        "UPDATE resource SET is_collection = ?2, resource_owner = ?3, content_last_modified = ?4, \
         content_modified_by = ?5, properties_last_modified = ?6, properties_modified_by = ?7, \
         display_name = ?8, content_type = ?9, character_encoding = ?10, content_language = ?11 \
         WHERE uri = ?1",
        params![
            uri,
            resource.collection,
            resource.owner.name(),
            to_millis(&resource.content_last_modified),
            resource.content_modified_by.name(),
            to_millis(&resource.properties_last_modified),
            resource.properties_modified_by.name(),
            resource.display_name,
            resource.content_type,
            resource.character_encoding,
            resource.content_language,
        ],
    )?;
    if updated > 0 {
        let id = find_id(conn, &resource.path)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        return Ok((id, false));
    }

    conn.execute(
        "INSERT INTO resource (uri, depth, is_collection, resource_owner, creation_time, created_by, \
         content_last_modified, content_modified_by, properties_last_modified, properties_modified_by, \
         display_name, content_type, character_encoding, content_language, acl_inherited) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 1)",
        params![
            uri,
            resource.path.depth() as i64,
            resource.collection,
            resource.owner.name(),
            to_millis(&resource.creation_time),
            resource.created_by.name(),
            to_millis(&resource.content_last_modified),
            resource.content_modified_by.name(),
            to_millis(&resource.properties_last_modified),
            resource.properties_modified_by.name(),
            resource.display_name,
            resource.content_type,
            resource.character_encoding,
            resource.content_language,
        ],
    )?;
    Ok((ResourceId(conn.last_insert_rowid()), true))
}

/// Delete `path` and its subtree with all dependent rows; returns resource rows removed
pub fn delete_subtree(conn: &Connection, path: &ResourcePath) -> Result<usize> {
    let pattern = descendant_pattern(path);
    for table in ["acl_entry", "lock_record", "extra_prop_entry"] {
        let sql = format!(
            "DELETE FROM {} WHERE resource_id IN \
             (SELECT resource_id FROM resource WHERE uri = ?1 OR uri LIKE ?2 ESCAPE '\\')",
            table
        );
        conn.execute(&sql, params![path.as_str(), pattern])?;
    }
    Ok(conn.execute(
        "DELETE FROM resource WHERE uri = ?1 OR uri LIKE ?2 ESCAPE '\\'",
        params![path.as_str(), pattern],
    )?)
}

/// Duplicate the rows of the `from` subtree under `to`; returns resource rows copied
///
/// Copies resource rows (new ids, rebased paths and depths), extra properties
/// and, with `copy_acls`, ACL entries. Without `copy_acls` the whole copy
/// inherits its ACL.
pub fn copy_subtree(
    conn: &Connection,
    from: &ResourcePath,
    to: &ResourcePath,
    copy_acls: bool,
    owner: Option<&Principal>,
) -> Result<usize> {
    let from_pattern = descendant_pattern(from);
    let depth_diff = to.depth() as i64 - from.depth() as i64;
    let copied = conn.execute(
        "INSERT INTO resource (uri, depth, is_collection, resource_owner, creation_time, created_by, \
         content_last_modified, content_modified_by, properties_last_modified, properties_modified_by, \
         display_name, content_type, character_encoding, content_language, acl_inherited) \
         SELECT ?3 || substr(uri, length(?1) + 1), depth + ?4, is_collection, coalesce(?5, resource_owner), \
         creation_time, created_by, content_last_modified, content_modified_by, properties_last_modified, \
         properties_modified_by, display_name, content_type, character_encoding, content_language, acl_inherited \
         FROM resource WHERE uri = ?1 OR uri LIKE ?2 ESCAPE '\\' ORDER BY uri",
        params![from.as_str(), from_pattern, to.as_str(), depth_diff, owner.map(|p| p.name())],
    )?;

    conn.execute(
        "INSERT INTO extra_prop_entry (resource_id, name_space, name, value) \
         SELECT d.resource_id, p.name_space, p.name, p.value \
         FROM extra_prop_entry p \
         JOIN resource s ON s.resource_id = p.resource_id \
         JOIN resource d ON d.uri = ?3 || substr(s.uri, length(?1) + 1) \
         WHERE s.uri = ?1 OR s.uri LIKE ?2 ESCAPE '\\' \
         ORDER BY p.extra_prop_entry_id",
        params![from.as_str(), from_pattern, to.as_str()],
    )?;

    if copy_acls {
        conn.execute(
            "INSERT INTO acl_entry (resource_id, action_type_id, user_or_group_name, is_user, \
             granted_by_user_name, granted_date) \
             SELECT d.resource_id, a.action_type_id, a.user_or_group_name, a.is_user, \
             a.granted_by_user_name, a.granted_date \
             FROM acl_entry a \
             JOIN resource s ON s.resource_id = a.resource_id \
             JOIN resource d ON d.uri = ?3 || substr(s.uri, length(?1) + 1) \
             WHERE s.uri = ?1 OR s.uri LIKE ?2 ESCAPE '\\'",
            params![from.as_str(), from_pattern, to.as_str()],
        )?;
    } else {
        conn.execute(
            "UPDATE resource SET acl_inherited = 1 WHERE uri = ?1 OR uri LIKE ?2 ESCAPE '\\'",
            params![to.as_str(), descendant_pattern(to)],
        )?;
    }
    Ok(copied)
}
