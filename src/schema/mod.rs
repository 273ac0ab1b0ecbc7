//! Schema & Key Encoding
//!
//! Three logical tables share one ordered key space, partitioned by a four byte
//! prefix. All integers are big-endian so byte order matches numeric order.
//!
//! | table | key | value |
//! |---|---|---|
//! | Nodes | `NODE ∥ nodeID` | node record |
//! | NameIndex | `NIDX ∥ parentID ∥ nodeID ∥ mtime ∥ type ∥ nameLength ∥ name` | empty |
//! | Relationships | `RELS ∥ parentID ∥ nodeID` | empty |
//! | Metadata | `META ∥ name` | entry specific |
//!
//! NameIndex keys only sort correctly under [`KeyComparator`].

pub mod comparator;
pub mod keys;

pub use comparator::KeyComparator;
pub use keys::{
    validate_name, MetaKey, NameIndexKey, NodeRecord, NodesKey, RelationshipsKey,
    META_PREFIX, NAME_INDEX_PREFIX, NODES_PREFIX, PREFIX_LEN, RELATIONSHIPS_PREFIX,
    SCHEMA_VERSION,
};

use crate::error::StorageError;
use thiserror::Error;

/// Key and record encoding errors
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("malformed {table} key: {reason}")]
    MalformedKey { table: &'static str, reason: String },

    #[error("malformed node record: {0}")]
    MalformedRecord(String),
}

impl From<SchemaError> for StorageError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::InvalidName { name, reason } => StorageError::InvalidName { name, reason },
            other => StorageError::Corruption(other.to_string()),
        }
    }
}
