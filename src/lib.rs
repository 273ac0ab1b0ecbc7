//! nodedb: local metadata cache for a cloud file-storage client
//!
//! Mirrors a remote directory tree into an embedded store so listings can be
//! browsed offline in locale-aware name order and refreshed one directory at a
//! time with atomic whole-listing replaces.

pub mod collation;
pub mod config;
pub mod error;
pub mod logging;
pub mod schema;
pub mod store;
pub mod tooling;
pub mod tree;
pub mod types;

pub use collation::Collator;
pub use error::{ErrorKind, StorageError};
pub use store::{open_node_db, NodeCursor, NodeDb};
pub use tree::{DirectoryNode, FileNode, Node};
pub use types::{NodeId, NodeKind, SortType};
