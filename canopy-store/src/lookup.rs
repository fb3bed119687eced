//! Action and lock type lookup tables
//!
//! Loaded once when the store opens; read-only afterwards.

use crate::error::{Result, StoreError};
use canopy_core::{LockType, Privilege};
use rusqlite::Connection;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct LookupTables {
    actions: HashMap<String, i64>,
    lock_types: HashMap<String, i64>,
}

impl LookupTables {
    pub fn load(conn: &Connection) -> Result<Self> {
        Ok(Self {
            actions: load_table(conn, "SELECT name, action_type_id FROM action_type")?,
            lock_types: load_table(conn, "SELECT name, lock_type_id FROM lock_type")?,
        })
    }

    pub fn action_id(&self, privilege: Privilege) -> Result<i64> {
        self.actions.get(privilege.name()).copied().ok_or_else(|| StoreError::SchemaMismatch {
            kind: "action",
            name: privilege.name().to_string(),
        })
    }

    pub fn lock_type_id(&self, lock_type: LockType) -> Result<i64> {
        self.lock_types.get(lock_type.name()).copied().ok_or_else(|| StoreError::SchemaMismatch {
            kind: "lock type",
            name: lock_type.name().to_string(),
        })
    }

    /// Map a persisted action name back to a privilege
    pub fn privilege(name: &str) -> Result<Privilege> {
        Privilege::from_name(name).ok_or_else(|| StoreError::SchemaMismatch { kind: "action", name: name.to_string() })
    }

    pub fn lock_type(name: &str) -> Result<LockType> {
        LockType::from_name(name).ok_or_else(|| StoreError::SchemaMismatch { kind: "lock type", name: name.to_string() })
    }
}

fn load_table(conn: &Connection, sql: &str) -> Result<HashMap<String, i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<HashMap<_, _>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    #[test]
    fn test_missing_name_is_a_schema_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();
        conn.execute("DELETE FROM lock_type WHERE name = 'SHARED_ACL_WRITE'", []).unwrap();
        let tables = LookupTables::load(&conn).unwrap();

        assert!(tables.action_id(Privilege::Read).is_ok());
        assert!(tables.lock_type_id(LockType::ExclusiveWrite).is_ok());
        assert!(matches!(
            tables.lock_type_id(LockType::SharedAclWrite),
            Err(StoreError::SchemaMismatch { kind: "lock type", .. })
        ));
        assert!(LookupTables::privilege("bogus").is_err());
    }
}
