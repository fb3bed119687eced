//! Lock persistence
//!
//! At most one lock row per resource. Reads never return a lock whose
//! timeout has passed; expired rows are removed by `delete_expired`.

use crate::error::Result;
use crate::lookup::LookupTables;
use crate::records::{descendant_pattern, path_column, time_column, to_millis};
use canopy_core::{Lock, LockDepth, Principal, ResourceId, ResourcePath};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

const LOCK_SELECT: &str = "SELECT l.resource_id, l.token, t.name, l.lock_owner, l.lock_owner_info, l.depth, l.timeout \
     FROM lock_record l JOIN lock_type t ON t.lock_type_id = l.lock_type_id";

fn map_lock(row: &Row<'_>) -> rusqlite::Result<(i64, Lock)> {
    let type_name: String = row.get(2)?;
    let lock_type = LookupTables::lock_type(&type_name)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let depth: String = row.get(5)?;
    let depth = LockDepth::parse(&depth).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, format!("unknown lock depth {:?}", depth).into())
    })?;
    let owner: String = row.get(3)?;
    Ok((
        row.get(0)?,
        Lock {
            token: row.get(1)?,
            lock_type,
            principal: Principal::from_stored(&owner, true),
            owner_info: row.get(4)?,
            depth,
            timeout: time_column(row, 6)?,
        },
    ))
}

/// Unexpired lock of a resource
pub fn load(conn: &Connection, id: ResourceId, now: DateTime<Utc>) -> Result<Option<Lock>> {
    let sql = format!("{} WHERE l.resource_id = ?1 AND l.timeout > ?2", LOCK_SELECT);
    let lock = conn.query_row(&sql, params![id.value(), to_millis(&now)], map_lock).optional()?;
    Ok(lock.map(|(_, lock)| lock))
}

/// Unexpired locks of the direct children of `parent`, keyed by resource id
pub fn load_children(conn: &Connection, parent: &ResourcePath, now: DateTime<Utc>) -> Result<HashMap<i64, Lock>> {
    let sql = format!(
        "{} WHERE l.timeout > ?3 AND l.resource_id IN \
         (SELECT resource_id FROM resource WHERE uri LIKE ?1 ESCAPE '\\' AND depth = ?2)",
        LOCK_SELECT
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(
        params![descendant_pattern(parent), parent.depth() as i64 + 1, to_millis(&now)],
        map_lock,
    )?;
    Ok(rows.collect::<rusqlite::Result<HashMap<_, _>>>()?)
}

/// Reconcile the persisted lock of `id` with `lock`
///
/// `None` removes any lock. Otherwise the row with the same token is updated,
/// or inserted when there is none; a lock under another token is dropped first.
pub fn store(conn: &Connection, lookups: &LookupTables, id: ResourceId, lock: Option<&Lock>) -> Result<()> {
    let Some(lock) = lock else {
        conn.execute("DELETE FROM lock_record WHERE resource_id = ?1", params![id.value()])?;
        return Ok(());
    };
    let lock_type_id = lookups.lock_type_id(lock.lock_type)?;
    conn.execute(
        "DELETE FROM lock_record WHERE resource_id = ?1 AND token <> ?2",
        params![id.value(), lock.token],
    )?;
    let updated = conn.execute(
        "UPDATE lock_record SET resource_id = ?2, lock_type_id = ?3, lock_owner = ?4, lock_owner_info = ?5, \
         depth = ?6, timeout = ?7 WHERE token = ?1",
        params![
            lock.token,
            id.value(),
            lock_type_id,
            lock.principal.name(),
            lock.owner_info,
            lock.depth.as_str(),
            to_millis(&lock.timeout),
        ],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO lock_record (resource_id, token, lock_type_id, lock_owner, lock_owner_info, depth, timeout) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.value(),
                lock.token,
                lock_type_id,
                lock.principal.name(),
                lock.owner_info,
                lock.depth.as_str(),
                to_millis(&lock.timeout),
            ],
        )?;
    }
    Ok(())
}

/// Remove every lock whose timeout lies before `now`
pub fn delete_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    Ok(conn.execute("DELETE FROM lock_record WHERE timeout < ?1", params![to_millis(&now)])?)
}

/// Locked paths in the subtree of `path`, ascending
pub fn discover(conn: &Connection, path: &ResourcePath, now: DateTime<Utc>) -> Result<Vec<ResourcePath>> {
    let mut stmt = conn.prepare_cached(
        "SELECT r.uri FROM lock_record l JOIN resource r ON r.resource_id = l.resource_id \
         WHERE l.timeout > ?3 AND (r.uri = ?1 OR r.uri LIKE ?2 ESCAPE '\\') ORDER BY r.uri",
    )?;
    let rows = stmt.query_map(params![path.as_str(), descendant_pattern(path), to_millis(&now)], |row| {
        path_column(row, 0)
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records;
    use crate::schema;
    use canopy_core::{LockType, Resource};
    use chrono::Duration;

    fn lock(token: &str, timeout: DateTime<Utc>) -> Lock {
        Lock {
            token: token.to_string(),
            lock_type: LockType::ExclusiveWrite,
            principal: Principal::user("alice"),
            owner_info: "alice@example.com".to_string(),
            depth: LockDepth::Infinity,
            timeout,
        }
    }

    #[test]
    fn test_one_lock_per_resource() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();
        let lookups = LookupTables::load(&conn).unwrap();
        let res = Resource::new(ResourcePath::parse("/a").unwrap(), false, Principal::user("alice"));
        let (id, _) = records::upsert(&conn, &res).unwrap();
        let now = Utc::now();

        store(&conn, &lookups, id, Some(&lock("t1", now + Duration::minutes(5)))).unwrap();
        store(&conn, &lookups, id, Some(&lock("t2", now + Duration::minutes(10)))).unwrap();
        let loaded = load(&conn, id, now).unwrap().unwrap();
        assert_eq!(loaded.token, "t2");
        assert_eq!(loaded.depth, LockDepth::Infinity);
        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM lock_record", [], |r| r.get(0)).unwrap();
        assert_eq!(rows, 1);

        assert!(load(&conn, id, now + Duration::minutes(11)).unwrap().is_none());
        assert_eq!(discover(&conn, &ResourcePath::root(), now).unwrap().len(), 1);

        store(&conn, &lookups, id, None).unwrap();
        assert!(load(&conn, id, now).unwrap().is_none());
    }

    #[test]
    fn test_unknown_lock_type_rolls_back_the_resource_row() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();
        let res = Resource::new(ResourcePath::parse("/a").unwrap(), false, Principal::user("alice"));

        let tx = conn.unchecked_transaction().unwrap();
        let (id, _) = records::upsert(&tx, &res).unwrap();
        let err = store(&tx, &LookupTables::default(), id, Some(&lock("t1", Utc::now() + Duration::minutes(5))))
            .unwrap_err();
        assert!(matches!(err, crate::error::StoreError::SchemaMismatch { kind: "lock type", .. }));
        drop(tx);

        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM resource", [], |r| r.get(0)).unwrap();
        assert_eq!(rows, 0);
        let locks: i64 = conn.query_row("SELECT COUNT(*) FROM lock_record", [], |r| r.get(0)).unwrap();
        assert_eq!(locks, 0);
    }
}
