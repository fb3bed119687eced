//! Resource tree store
//!
//! Every public operation takes one pooled connection and runs one
//! transaction inside a single `interact` call. The transaction commits only
//! when the whole body succeeds; on error it is dropped and rolls back.
//! Content side effects run after the relational commit.

use crate::acl;
use crate::changelog::{self, ChangeLogRecord};
use crate::config::StoreConfig;
use crate::content::ContentStore;
use crate::error::{Result, StoreError};
use crate::lock;
use crate::lookup::LookupTables;
use crate::properties;
use crate::records;
use crate::schema;
use canopy_core::{ChangeLogEntry, Principal, Resource, ResourceId, ResourcePath};
use chrono::Utc;
use deadpool_sqlite::{Config, Pool, PoolConfig, PoolError, Runtime};
use rusqlite::{Connection, TransactionBehavior};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

fn pool_error(e: PoolError) -> StoreError {
    match e {
        PoolError::Timeout(_) => StoreError::PoolTimeout,
        other => StoreError::Pool(other.to_string()),
    }
}

/// Persistent store for the resource tree
#[derive(Clone)]
pub struct ResourceTreeStore {
    pool: Pool,
    lookups: Arc<LookupTables>,
    content: Arc<dyn ContentStore>,
    busy_timeout: Duration,
}

impl std::fmt::Debug for ResourceTreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTreeStore")
            .field("lookups", &self.lookups)
            .field("busy_timeout", &self.busy_timeout)
            .finish_non_exhaustive()
    }
}

impl ResourceTreeStore {
    /// Validate `config`, build the pool, create the schema if needed and load lookup tables
    pub async fn open(config: &StoreConfig, content: Arc<dyn ContentStore>) -> Result<Self> {
        config.validate()?;
        let mut pool_config = PoolConfig::new(config.max_connections);
        pool_config.timeouts.wait = Some(config.acquire_timeout());
        let mut cfg = Config::new(&config.url);
        cfg.pool = Some(pool_config);
        let pool = cfg.create_pool(Runtime::Tokio1).map_err(|e| StoreError::Pool(e.to_string()))?;

        let busy_timeout = config.busy_timeout();
        let conn = pool.get().await.map_err(pool_error)?;
        let lookups = conn
            .interact(move |conn| -> Result<LookupTables> {
                conn.busy_timeout(busy_timeout)?;
                schema::init(conn)?;
                LookupTables::load(conn)
            })
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))??;

        info!("Opened resource store at {} ({} connections max)", config.url, config.max_connections);
        Ok(Self { pool, lookups: Arc::new(lookups), content, busy_timeout })
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    async fn transaction<T, F>(&self, access: Access, body: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &LookupTables) -> Result<T> + Send + 'static,
    {
        let conn = self.pool.get().await.map_err(pool_error)?;
        let lookups = self.lookups.clone();
        let busy_timeout = self.busy_timeout;
        conn.interact(move |conn| -> Result<T> {
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update(None, "case_sensitive_like", true)?;
            let behavior = match access {
                Access::Read => TransactionBehavior::Deferred,
                Access::Write => TransactionBehavior::Immediate,
            };
            let tx = conn.transaction_with_behavior(behavior)?;
            let out = body(&tx, &lookups)?;
            tx.commit()?;
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?
    }

    /// Snapshot of the resource at `path`
    ///
    /// Loads the row, then its unexpired lock, child paths, effective ACL and
    /// extra properties.
    pub async fn load(&self, path: &ResourcePath) -> Result<Option<Resource>> {
        let path = path.clone();
        self.transaction(Access::Read, move |conn, _| {
            let Some(mut resource) = records::find(conn, &path)? else {
                return Ok(None);
            };
            let id = resource.id.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            resource.lock = lock::load(conn, id, Utc::now())?;
            resource.child_paths = records::descendant_paths_at(conn, &path, 1)?;
            let (acl, inherited_from) = acl::effective(conn, &path, id, resource.acl.is_inherited())?;
            resource.acl = acl;
            resource.acl_inherited_from = inherited_from;
            resource.properties = properties::load(conn, id)?;
            Ok(Some(resource))
        })
        .await
    }

    /// Insert or update `resource` with its ACL, lock and extra properties
    ///
    /// A new resource also gets a content placeholder once the rows are committed.
    pub async fn store(&self, resource: &Resource) -> Result<ResourceId> {
        let snapshot = resource.clone();
        let (id, created) = self
            .transaction(Access::Write, move |conn, lookups| {
                let (id, created) = records::upsert(conn, &snapshot)?;
                let change = acl::store_acl(conn, lookups, id, &snapshot)?;
                lock::store(conn, lookups, id, snapshot.lock.as_ref())?;
                properties::store(conn, id, &snapshot.properties)?;
                debug!("Stored {} (id {}, created {}, acl {:?})", snapshot.path, id, created, change);
                Ok((id, created))
            })
            .await?;
        if created {
            self.content.create_placeholder(&resource.path, resource.collection).await?;
        }
        Ok(id)
    }

    /// Remove `resource` and its subtree, then its content; returns rows removed
    pub async fn delete(&self, resource: &Resource) -> Result<usize> {
        let path = resource.path.clone();
        let removed = self.transaction(Access::Write, move |conn, _| records::delete_subtree(conn, &path)).await?;
        self.content.delete_recursive(&resource.path).await?;
        debug!("Deleted {} ({} resources)", resource.path, removed);
        Ok(removed)
    }

    /// Duplicate `resource` and its subtree under `dest`; returns the new root id
    ///
    /// With `copy_acls` the copy keeps the ACL content it had at the source: own
    /// entries are copied and an inherited root ACL is materialised on the new
    /// root. Without it every copied resource inherits. `owner` replaces the
    /// owner of every copied resource.
    pub async fn copy(
        &self,
        resource: &Resource,
        dest: &ResourcePath,
        copy_acls: bool,
        owner: Option<&Principal>,
    ) -> Result<ResourceId> {
        let from = resource.path.clone();
        let invalid = |reason| StoreError::InvalidCopy { from: from.clone(), to: dest.clone(), reason };
        if from.is_root() {
            return Err(invalid("the root cannot be copied"));
        }
        if dest.is_in_subtree_of(&from) {
            return Err(invalid("destination lies inside the source"));
        }

        let to = dest.clone();
        let owner = owner.cloned();
        let granted_by = resource.properties_modified_by.clone();
        let (new_id, copied) = self
            .transaction(Access::Write, move |conn, lookups| {
                let source = records::find(conn, &from)?.ok_or_else(|| StoreError::NotFound(from.clone()))?;
                if records::find_id(conn, &to)?.is_some() {
                    return Err(StoreError::AlreadyExists(to.clone()));
                }
                let copied = records::copy_subtree(conn, &from, &to, copy_acls, owner.as_ref())?;
                let new_id = records::find_id(conn, &to)?.ok_or_else(|| StoreError::NotFound(to.clone()))?;
                if copy_acls && source.acl.is_inherited() {
                    let source_id = source.id.ok_or_else(|| StoreError::NotFound(from.clone()))?;
                    let (effective, _) = acl::effective(conn, &from, source_id, true)?;
                    if !effective.is_empty() {
                        acl::insert_entries(conn, lookups, new_id, &effective, &granted_by, Utc::now())?;
                    }
                }
                Ok((new_id, copied))
            })
            .await?;

        self.content.copy(&resource.path, dest, resource.collection).await?;
        debug!("Copied {} to {} ({} resources)", resource.path, dest, copied);
        Ok(new_id)
    }

    /// `parent` and every path below it, ascending
    pub async fn list_sub_tree(&self, parent: &ResourcePath) -> Result<Vec<ResourcePath>> {
        let parent = parent.clone();
        self.transaction(Access::Read, move |conn, _| records::subtree_paths(conn, &parent)).await
    }

    /// Direct children of `parent` with their child paths, locks, ACLs and properties
    ///
    /// Runs a fixed number of queries regardless of the number of children.
    pub async fn load_children(&self, parent: &ResourcePath) -> Result<Vec<Resource>> {
        let parent = parent.clone();
        self.transaction(Access::Read, move |conn, _| {
            let Some(parent_row) = records::find(conn, &parent)? else {
                return Ok(Vec::new());
            };
            let parent_id = parent_row.id.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            let (parent_acl, parent_from) = acl::effective(conn, &parent, parent_id, parent_row.acl.is_inherited())?;
            let (inherited_acl, inherited_from) = if parent_acl.is_inherited() {
                (parent_acl, parent_from)
            } else {
                (parent_acl.to_inherited(), Some(parent_id))
            };

            let now = Utc::now();
            let mut children = records::children(conn, &parent)?;
            let mut grandchildren: HashMap<ResourcePath, Vec<ResourcePath>> = HashMap::new();
            for path in records::descendant_paths_at(conn, &parent, 2)? {
                if let Some(child) = path.parent() {
                    grandchildren.entry(child).or_default().push(path);
                }
            }
            let mut locks = lock::load_children(conn, &parent, now)?;
            let mut acls = acl::child_entries(conn, &parent)?;
            let mut props = properties::load_children(conn, &parent)?;

            for child in &mut children {
                let Some(id) = child.id else { continue };
                child.child_paths = grandchildren.remove(&child.path).unwrap_or_default();
                child.lock = locks.remove(&id.value());
                child.properties = props.remove(&id.value()).unwrap_or_default();
                if child.acl.is_inherited() {
                    child.acl = inherited_acl.clone();
                    child.acl_inherited_from = inherited_from;
                } else {
                    child.acl = acls.remove(&id.value()).unwrap_or_else(canopy_core::Acl::new);
                }
            }
            Ok(children)
        })
        .await
    }

    /// Paths in the subtree of `resource` holding an unexpired lock
    pub async fn discover_locks(&self, resource: &ResourcePath) -> Result<Vec<ResourcePath>> {
        let path = resource.clone();
        self.transaction(Access::Read, move |conn, _| lock::discover(conn, &path, Utc::now())).await
    }

    /// Paths in the subtree of `resource` carrying their own ACL
    pub async fn discover_acls(&self, resource: &ResourcePath) -> Result<Vec<ResourcePath>> {
        let path = resource.clone();
        self.transaction(Access::Read, move |conn, _| acl::discover(conn, &path)).await
    }

    /// Remove every expired lock; returns how many were removed
    pub async fn delete_expired_locks(&self) -> Result<usize> {
        let removed = self.transaction(Access::Write, |conn, _| lock::delete_expired(conn, Utc::now())).await?;
        info!("Deleted {} expired locks", removed);
        Ok(removed)
    }

    /// Append change log rows for `record`; returns rows inserted
    pub async fn add_change_log_entry(&self, record: &ChangeLogRecord, recurse: bool) -> Result<usize> {
        let record = record.clone();
        self.transaction(Access::Write, move |conn, _| changelog::append(conn, &record, recurse, Utc::now()))
            .await
    }

    /// Up to `limit` change log entries with ids above `after_id`, oldest first
    pub async fn read_change_log(&self, after_id: i64, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        self.transaction(Access::Read, move |conn, _| changelog::read(conn, after_id, limit)).await
    }
}
