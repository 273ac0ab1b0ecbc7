//! Core types shared by the node model, the key schema and the storage engines.

use serde::{Deserialize, Serialize};
use std::fmt;

/// NodeID: Store-assigned identity of a persisted node
pub type NodeId = u32;

/// Well-known ID of the root directory
pub const ROOT_NODE_ID: NodeId = 1;

/// Parent sentinel of the root directory; never a real node
pub const ROOT_PARENT_NODE_ID: NodeId = 0;

/// Invalid / absent node ID
pub const INVALID_NODE_ID: NodeId = NodeId::MAX;

/// Maximum length of a node name in UTF-8 bytes
pub const NODE_NAME_LENGTH_MAX: usize = u8::MAX as usize;

/// Node variant tag, as persisted in keys and records.
///
/// The discriminant order is the enumeration order: directories before files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Directory = 0,
    File = 1,
}

impl NodeKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(NodeKind::Directory),
            1 => Some(NodeKind::File),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Directory => f.write_str("directory"),
            NodeKind::File => f.write_str("file"),
        }
    }
}

/// Cursor sort order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortType {
    /// Storage order. Unstable across reopen.
    Unsorted,
    /// Directories before files, names in collation order.
    ByName,
}
