//! Snapshot cursor over one directory listing
//!
//! A cursor captures the child set and child records when it is created. Writes
//! committed afterwards are invisible to it.

use crate::error::StorageError;
use crate::schema::{NodeRecord, SchemaError};
use crate::tree::node::{DirectoryNode, Node};
use crate::types::{NodeId, SortType};

/// Captured state of one listed child
#[derive(Debug, Clone)]
pub(crate) enum CursorSlot {
    Present(NodeRecord),
    Malformed(String),
    Missing,
}

impl CursorSlot {
    pub(crate) fn from_encoded(bytes: Option<&[u8]>) -> Self {
        match bytes {
            None => CursorSlot::Missing,
            Some(bytes) => match NodeRecord::decode(bytes) {
                Ok(record) => CursorSlot::Present(record),
                Err(err) => CursorSlot::Malformed(err.to_string()),
            },
        }
    }

    pub(crate) fn from_decoded(result: Result<Option<NodeRecord>, SchemaError>) -> Self {
        match result {
            Ok(Some(record)) => CursorSlot::Present(record),
            Ok(None) => CursorSlot::Missing,
            Err(err) => CursorSlot::Malformed(err.to_string()),
        }
    }
}

/// Indexed, read-only view of a directory's children
#[derive(Debug, Clone)]
pub struct NodeCursor {
    directory: DirectoryNode,
    sort_type: SortType,
    entries: Vec<(NodeId, CursorSlot)>,
}

impl NodeCursor {
    pub(crate) fn new(
        directory: DirectoryNode,
        sort_type: SortType,
        entries: Vec<(NodeId, CursorSlot)>,
    ) -> Self {
        NodeCursor {
            directory,
            sort_type,
            entries,
        }
    }

    /// The listed directory as of the snapshot, without children.
    pub fn directory_node(&self) -> &DirectoryNode {
        &self.directory
    }

    pub fn sort_type(&self) -> SortType {
        self.sort_type
    }

    /// Number of children in the snapshot.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Materialize the child at `index`.
    ///
    /// Out-of-range indexes and listed children without a record fail with
    /// `NotFound`; records that do not decode fail with `Corruption`.
    pub fn fetch_node_at_index(&self, index: usize) -> Result<Node, StorageError> {
        let (node_id, slot) = self.entries.get(index).ok_or_else(|| {
            StorageError::not_found(format!(
                "index {} out of range for {} children",
                index,
                self.entries.len()
            ))
        })?;
        match slot {
            CursorSlot::Present(record) => Ok(record.clone().into_node(*node_id)),
            CursorSlot::Missing => Err(StorageError::not_found(format!(
                "node {} has no record",
                node_id
            ))),
            CursorSlot::Malformed(reason) => Err(StorageError::corruption(format!(
                "node {}: {}",
                node_id, reason
            ))),
        }
    }

    /// Fetch every child in cursor order.
    pub fn iter(&self) -> impl Iterator<Item = Result<Node, StorageError>> + '_ {
        (0..self.count()).map(move |index| self.fetch_node_at_index(index))
    }
}
