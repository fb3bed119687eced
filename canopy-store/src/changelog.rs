//! Append-only change log

use crate::error::Result;
use crate::records::{descendant_pattern, path_column, time_column, to_millis};
use canopy_core::{ChangeLogEntry, ResourceId, ResourcePath};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::warn;

/// A change to record, before logger ids are validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogRecord {
    /// Numeric id of the consumer the entry is addressed to, as configured
    pub logger_id: String,
    pub logger_type: String,
    pub path: ResourcePath,
    pub operation: String,
    pub resource_id: Option<ResourceId>,
    pub collection: bool,
}

impl ChangeLogRecord {
    pub fn new(
        logger_id: impl Into<String>,
        logger_type: impl Into<String>,
        path: ResourcePath,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            logger_id: logger_id.into(),
            logger_type: logger_type.into(),
            path,
            operation: operation.into(),
            resource_id: None,
            collection: false,
        }
    }

    pub fn with_resource(mut self, id: ResourceId, collection: bool) -> Self {
        self.resource_id = Some(id);
        self.collection = collection;
        self
    }
}

/// Append entries for `record`; returns rows inserted
///
/// With `recurse` on a collection, one row per subtree member is written by a
/// single statement. A non-numeric logger id or type is logged and skipped.
pub fn append(conn: &Connection, record: &ChangeLogRecord, recurse: bool, now: DateTime<Utc>) -> Result<usize> {
    let (Ok(logger_id), Ok(logger_type)) = (record.logger_id.trim().parse::<i64>(), record.logger_type.trim().parse::<i64>())
    else {
        warn!(
            "Skipping change log entry for {}: logger id {:?} / type {:?} is not numeric",
            record.path, record.logger_id, record.logger_type
        );
        return Ok(0);
    };

    if recurse && record.collection {
        return Ok(conn.execute(
            "INSERT INTO changelog_entry (logger_id, logger_type, operation, timestamp, uri, resource_id, is_collection) \
             SELECT ?1, ?2, ?3, ?4, uri, resource_id, is_collection FROM resource \
             WHERE uri = ?5 OR uri LIKE ?6 ESCAPE '\\' ORDER BY uri",
            params![
                logger_id,
                logger_type,
                record.operation,
                to_millis(&now),
                record.path.as_str(),
                descendant_pattern(&record.path),
            ],
        )?);
    }

    Ok(conn.execute(
        "INSERT INTO changelog_entry (logger_id, logger_type, operation, timestamp, uri, resource_id, is_collection) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            logger_id,
            logger_type,
            record.operation,
            to_millis(&now),
            record.path.as_str(),
            record.resource_id.map(|id| id.value()),
            record.collection,
        ],
    )?)
}

/// Entries after `after_id`, in insertion order
pub fn read(conn: &Connection, after_id: i64, limit: usize) -> Result<Vec<ChangeLogEntry>> {
    let mut stmt = conn.prepare_cached(
        "SELECT changelog_entry_id, logger_id, logger_type, uri, operation, resource_id, is_collection, timestamp \
         FROM changelog_entry WHERE changelog_entry_id > ?1 ORDER BY changelog_entry_id LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![after_id, limit as i64], |row| {
        Ok(ChangeLogEntry {
            id: row.get(0)?,
            logger_id: row.get(1)?,
            logger_type: row.get(2)?,
            path: path_column(row, 3)?,
            operation: row.get(4)?,
            resource_id: row.get::<_, Option<i64>>(5)?.map(ResourceId),
            collection: row.get(6)?,
            timestamp: time_column(row, 7)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
