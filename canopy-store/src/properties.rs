//! Flat extra properties, replaced wholesale on every store

use crate::error::Result;
use crate::records::descendant_pattern;
use canopy_core::{ExtraProperty, ResourceId, ResourcePath};
use rusqlite::{params, Connection};
use std::collections::HashMap;

pub fn store(conn: &Connection, id: ResourceId, properties: &[ExtraProperty]) -> Result<()> {
    conn.execute("DELETE FROM extra_prop_entry WHERE resource_id = ?1", params![id.value()])?;
    let mut stmt =
        conn.prepare_cached("INSERT INTO extra_prop_entry (resource_id, name_space, name, value) VALUES (?1, ?2, ?3, ?4)")?;
    for p in properties {
        stmt.execute(params![id.value(), p.namespace, p.name, p.value])?;
    }
    Ok(())
}

pub fn load(conn: &Connection, id: ResourceId) -> Result<Vec<ExtraProperty>> {
    let mut stmt = conn.prepare_cached(
        "SELECT name_space, name, value FROM extra_prop_entry WHERE resource_id = ?1 ORDER BY extra_prop_entry_id",
    )?;
    let rows = stmt.query_map(params![id.value()], |row| {
        Ok(ExtraProperty::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Properties of the direct children of `parent`, keyed by resource id
pub fn load_children(conn: &Connection, parent: &ResourcePath) -> Result<HashMap<i64, Vec<ExtraProperty>>> {
    let mut stmt = conn.prepare_cached(
        "SELECT p.resource_id, p.name_space, p.name, p.value FROM extra_prop_entry p \
         JOIN resource r ON r.resource_id = p.resource_id \
         WHERE r.uri LIKE ?1 ESCAPE '\\' AND r.depth = ?2 ORDER BY p.extra_prop_entry_id",
    )?;
    let mut rows = stmt.query(params![descendant_pattern(parent), parent.depth() as i64 + 1])?;
    let mut out: HashMap<i64, Vec<ExtraProperty>> = HashMap::new();
    while let Some(row) = rows.next()? {
        out.entry(row.get(0)?).or_default().push(ExtraProperty::new(
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ));
    }
    Ok(out)
}
