//! NodeDB engine
//!
//! One contract, several embedded backends. Every backend persists the same three
//! logical tables (Nodes, NameIndex, Relationships) and must give identical
//! observable behavior: snapshot-isolated cursors and all-or-nothing directory
//! replaces.

pub mod cursor;
pub mod memory;
pub(crate) mod kv;
pub(crate) mod replace;
pub mod sled_db;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use cursor::NodeCursor;
pub use memory::MemoryNodeDb;
pub use sled_db::SledNodeDb;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteNodeDb;

use crate::collation::Collator;
use crate::config::{Backend, StorageConfig};
use crate::error::StorageError;
use crate::tree::node::{DirectoryNode, Node};
use crate::types::{NodeId, SortType};
use tracing::info;

/// Persistent node cache
///
/// Implementations are shared across threads. Cursor creation may run
/// concurrently with a replace and never observes a partial one.
pub trait NodeDb: Send + Sync {
    /// Short backend identifier (`sled`, `memory`, `sqlite`).
    fn backend_name(&self) -> &'static str;

    /// The well-known root directory. Always present once the store is open.
    fn root_directory_node(&self) -> DirectoryNode;

    /// Snapshot cursor over `directory`'s children.
    ///
    /// `Ok(None)` when the directory does not exist in the store.
    fn cursor_for_directory(
        &self,
        directory: &DirectoryNode,
        sort_type: SortType,
    ) -> Result<Option<NodeCursor>, StorageError>;

    /// Atomically replace the full child set of `target`.
    ///
    /// On success `target.children` holds the committed children with their
    /// assigned IDs and `target.listing_revision` the new stored revision. On
    /// failure neither the store nor `target` changes.
    fn replace_nodes_in_directory(
        &self,
        target: &mut DirectoryNode,
        children: Vec<Node>,
    ) -> Result<(), StorageError>;

    /// Parent directory of `node_id`, `ROOT_PARENT_NODE_ID` for the root.
    fn parent_of(&self, node_id: NodeId) -> Result<Option<NodeId>, StorageError>;

    /// Force buffered writes to durable storage.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Open the backend selected by `config`.
pub fn open_node_db(
    config: &StorageConfig,
    collator: Collator,
) -> Result<Box<dyn NodeDb>, StorageError> {
    let db: Box<dyn NodeDb> = match config.backend {
        Backend::Memory => Box::new(MemoryNodeDb::open(collator)?),
        Backend::Sled => {
            let path = store_path(config)?;
            Box::new(SledNodeDb::open_with_config(&path, config, collator)?)
        }
        #[cfg(feature = "sqlite")]
        Backend::Sqlite => {
            let path = store_path(config)?;
            Box::new(SqliteNodeDb::open(&path, collator)?)
        }
        #[cfg(not(feature = "sqlite"))]
        Backend::Sqlite => {
            return Err(StorageError::Unknown(
                "this build has no sqlite backend".to_string(),
            ))
        }
    };
    info!(backend = db.backend_name(), "Node store opened");
    Ok(db)
}

fn store_path(config: &StorageConfig) -> Result<std::path::PathBuf, StorageError> {
    config.store_path().ok_or_else(|| {
        StorageError::not_found("no store path configured and no platform data directory")
    })
}
