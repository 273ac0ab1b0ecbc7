//! Node Model
//!
//! In-memory file and directory values mirrored from the remote namespace, and the
//! archive format used to move whole subtrees in and out of the cache.

pub mod archive;
pub mod node;

pub use node::{DirectoryNode, FileNode, Node};
