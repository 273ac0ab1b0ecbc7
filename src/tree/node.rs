//! File and directory node types

use crate::collation::Collator;
use crate::types::{NodeId, NodeKind, ROOT_NODE_ID};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::OnceLock;

/// Name of the root directory record
pub const ROOT_DIRECTORY_NAME: &str = "/";

/// File node representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Assigned by the store; `None` until persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub name: String,
    pub mtime: u64,
}

impl FileNode {
    pub fn new(name: impl Into<String>, mtime: u64) -> Self {
        FileNode {
            node_id: None,
            name: name.into(),
            mtime,
        }
    }
}

/// Directory node representation
///
/// Owns its in-memory children. The parent relation is not modelled here; stores
/// answer it through their relationships table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub name: String,
    #[serde(default)]
    pub listing_revision: u64,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl DirectoryNode {
    pub fn new(name: impl Into<String>) -> Self {
        DirectoryNode {
            node_id: None,
            name: name.into(),
            listing_revision: 0,
            children: Vec::new(),
        }
    }

    /// The well-known root directory, with its fixed ID.
    pub fn root() -> Self {
        DirectoryNode {
            node_id: Some(ROOT_NODE_ID),
            ..DirectoryNode::new(ROOT_DIRECTORY_NAME)
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn with_listing_revision(mut self, listing_revision: u64) -> Self {
        self.listing_revision = listing_revision;
        self
    }

    pub fn is_root_directory(&self) -> bool {
        self.node_id == Some(ROOT_NODE_ID)
    }

    /// Call the matching handler once per child, in the collection's current order.
    pub fn enumerate_children<F, D>(&self, mut on_file: F, mut on_directory: D)
    where
        F: FnMut(&FileNode),
        D: FnMut(&DirectoryNode),
    {
        for child in &self.children {
            match child {
                Node::File(file) => on_file(file),
                Node::Directory(directory) => on_directory(directory),
            }
        }
    }
}

/// Cache node type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    File(FileNode),
    Directory(DirectoryNode),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::File(file) => &file.name,
            Node::Directory(directory) => &directory.name,
        }
    }

    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Node::File(file) => file.node_id,
            Node::Directory(directory) => directory.node_id,
        }
    }

    pub(crate) fn set_node_id(&mut self, node_id: NodeId) {
        match self {
            Node::File(file) => file.node_id = Some(node_id),
            Node::Directory(directory) => directory.node_id = Some(node_id),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::File(_) => NodeKind::File,
            Node::Directory(_) => NodeKind::Directory,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn is_root_directory(&self) -> bool {
        match self {
            Node::Directory(directory) => directory.is_root_directory(),
            Node::File(_) => false,
        }
    }

    /// mtime for files, listing revision for directories
    pub fn stamp(&self) -> u64 {
        match self {
            Node::File(file) => file.mtime,
            Node::Directory(directory) => directory.listing_revision,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryNode> {
        match self {
            Node::Directory(directory) => Some(directory),
            Node::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    /// Dispatch to exactly one handler based on the variant.
    pub fn visit<'a, R>(
        &'a self,
        on_file: impl FnOnce(&'a FileNode) -> R,
        on_directory: impl FnOnce(&'a DirectoryNode) -> R,
    ) -> R {
        match self {
            Node::File(file) => on_file(file),
            Node::Directory(directory) => on_directory(directory),
        }
    }

    /// Total order under the process locale: directories first, then collated names.
    pub fn compare(&self, other: &Node) -> Ordering {
        static SYSTEM_COLLATOR: OnceLock<Collator> = OnceLock::new();
        self.compare_with(other, SYSTEM_COLLATOR.get_or_init(Collator::system))
    }

    /// Total order under an explicit collator.
    ///
    /// Ties between identical names fall back to node ID, then stamp.
    pub fn compare_with(&self, other: &Node, collator: &Collator) -> Ordering {
        self.kind()
            .cmp(&other.kind())
            .then_with(|| collator.compare(self.name(), other.name()))
            .then_with(|| self.node_id().cmp(&other.node_id()))
            .then_with(|| self.stamp().cmp(&other.stamp()))
    }
}

impl From<FileNode> for Node {
    fn from(file: FileNode) -> Self {
        Node::File(file)
    }
}

impl From<DirectoryNode> for Node {
    fn from(directory: DirectoryNode) -> Self {
        Node::Directory(directory)
    }
}
