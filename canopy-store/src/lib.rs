//! Canopy Store
//!
//! Relational persistence for the resource tree on a pooled SQLite database:
//! resource rows, ACL entries, locks, flat extra properties and the change
//! log. Content bytes live behind [`ContentStore`].

pub mod acl;
pub mod changelog;
pub mod config;
pub mod content;
pub mod error;
pub mod lock;
pub mod lookup;
pub mod properties;
pub mod records;
pub mod schema;
pub mod store;

pub use acl::AclChange;
pub use changelog::ChangeLogRecord;
pub use config::StoreConfig;
pub use content::{ContentError, ContentStore, DiskContentStore};
pub use error::{Result, StoreError};
pub use lookup::LookupTables;
pub use store::ResourceTreeStore;
