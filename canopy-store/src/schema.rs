//! Relational schema
//!
//! Times are stored as epoch milliseconds. Paths are stored as `uri` together
//! with their `depth` so children can be selected by exact depth.

use canopy_core::{LockType, Privilege};
use rusqlite::{params, Connection};
use tracing::info;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS resource (
    resource_id INTEGER PRIMARY KEY AUTOINCREMENT,
    uri TEXT NOT NULL UNIQUE,
    depth INTEGER NOT NULL,
    is_collection INTEGER NOT NULL,
    resource_owner TEXT NOT NULL,
    creation_time INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    content_last_modified INTEGER NOT NULL,
    content_modified_by TEXT NOT NULL,
    properties_last_modified INTEGER NOT NULL,
    properties_modified_by TEXT NOT NULL,
    display_name TEXT,
    content_type TEXT,
    character_encoding TEXT,
    content_language TEXT,
    acl_inherited INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS resource_depth_idx ON resource(depth);

CREATE TABLE IF NOT EXISTS action_type (
    action_type_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS acl_entry (
    acl_entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_id INTEGER NOT NULL REFERENCES resource(resource_id),
    action_type_id INTEGER NOT NULL REFERENCES action_type(action_type_id),
    user_or_group_name TEXT NOT NULL,
    is_user INTEGER NOT NULL,
    granted_by_user_name TEXT NOT NULL,
    granted_date INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS acl_entry_resource_idx ON acl_entry(resource_id);

CREATE TABLE IF NOT EXISTS lock_type (
    lock_type_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS lock_record (
    lock_id INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_id INTEGER NOT NULL UNIQUE REFERENCES resource(resource_id),
    token TEXT NOT NULL UNIQUE,
    lock_type_id INTEGER NOT NULL REFERENCES lock_type(lock_type_id),
    lock_owner TEXT NOT NULL,
    lock_owner_info TEXT NOT NULL,
    depth TEXT NOT NULL,
    timeout INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS lock_record_timeout_idx ON lock_record(timeout);

CREATE TABLE IF NOT EXISTS extra_prop_entry (
    extra_prop_entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_id INTEGER NOT NULL REFERENCES resource(resource_id),
    name_space TEXT NOT NULL,
    name TEXT NOT NULL,
    value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS extra_prop_entry_resource_idx ON extra_prop_entry(resource_id);

CREATE TABLE IF NOT EXISTS changelog_entry (
    changelog_entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    logger_id INTEGER NOT NULL,
    logger_type INTEGER NOT NULL,
    operation TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    uri TEXT NOT NULL,
    resource_id INTEGER,
    is_collection INTEGER NOT NULL
);
";

/// Connection pragmas, then tables, indexes and seeded lookup rows
pub fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", "-64000")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.execute_batch(SCHEMA)?;

    let mut seeded = 0;
    for privilege in Privilege::ALL {
        seeded += conn.execute("INSERT OR IGNORE INTO action_type (name) VALUES (?1)", params![privilege.name()])?;
    }
    for lock_type in LockType::ALL {
        seeded += conn.execute("INSERT OR IGNORE INTO lock_type (name) VALUES (?1)", params![lock_type.name()])?;
    }
    if seeded > 0 {
        info!("Initialized schema, seeded {} lookup rows", seeded);
    }
    Ok(())
}
