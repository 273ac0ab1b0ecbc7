//! Shared plumbing for ordered key-value backends
//!
//! The sled and in-memory engines both store the prefix-partitioned key space from
//! [`crate::schema`]. Everything here is independent of how the bytes are held:
//! bootstrap, replace-plan translation into a write batch, and cursor snapshots.

use crate::error::StorageError;
use crate::schema::{
    KeyComparator, MetaKey, NameIndexKey, NodeRecord, NodesKey, RelationshipsKey, SchemaError,
    RELATIONSHIPS_PREFIX, SCHEMA_VERSION,
};
use crate::store::cursor::{CursorSlot, NodeCursor};
use crate::store::replace::{PlanSource, ReplacePlan};
use crate::tree::node::{DirectoryNode, ROOT_DIRECTORY_NAME};
use crate::types::{NodeId, NodeKind, SortType, ROOT_NODE_ID, ROOT_PARENT_NODE_ID};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

pub(crate) type KvPair = (Vec<u8>, Vec<u8>);

/// Point-in-time reads over the key space
pub(crate) trait KvRead {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// All pairs whose key starts with `prefix`, in byte order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StorageError>;
}

/// A single operation in a write batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Fails the Nth batch write after being armed
///
/// Engines consult it before every write inside a commit so tests can abort a
/// replace part way through.
#[derive(Debug, Default)]
pub(crate) struct FaultPoint {
    remaining: AtomicUsize,
}

impl FaultPoint {
    /// Let `writes` more writes through, then fail the next one.
    #[cfg(test)]
    pub(crate) fn arm(&self, writes: usize) {
        self.remaining.store(writes + 1, Ordering::SeqCst);
    }

    pub(crate) fn check(&self) -> Result<(), StorageError> {
        let previous = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match previous {
            Ok(1) => Err(StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            ))),
            _ => Ok(()),
        }
    }
}

/// Replace planning over any key-value reader.
pub(crate) struct KvPlanSource<'a, R: KvRead + ?Sized>(pub &'a R);

impl<R: KvRead + ?Sized> PlanSource for KvPlanSource<'_, R> {
    fn node_record(&self, node_id: NodeId) -> Result<Option<NodeRecord>, StorageError> {
        match self.0.get(&NodesKey::new(node_id).encode())? {
            Some(bytes) => Ok(Some(NodeRecord::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn child_ids(&self, parent_id: NodeId) -> Result<Vec<NodeId>, StorageError> {
        self.0
            .scan_prefix(&RelationshipsKey::parent_prefix(parent_id))?
            .into_iter()
            .map(|(key, _)| Ok(RelationshipsKey::decode(&key)?.node_id))
            .collect()
    }

    fn next_node_id(&self) -> Result<NodeId, StorageError> {
        read_meta_u32(self.0, MetaKey::NextNodeId)
    }
}

fn read_meta_u32<R: KvRead + ?Sized>(reader: &R, key: MetaKey) -> Result<u32, StorageError> {
    let bytes = reader
        .get(&key.encode())?
        .ok_or_else(|| StorageError::corruption(format!("metadata entry {:?} missing", key)))?;
    Ok(key.decode_u32(&bytes)?)
}

/// Writes that initialize an empty key space, or `None` when the store is already set up.
///
/// An existing store must carry the current schema version and a root directory.
pub(crate) fn bootstrap_ops<R: KvRead + ?Sized>(
    reader: &R,
    comparator: &KeyComparator,
) -> Result<Option<Vec<BatchOp>>, StorageError> {
    match reader.get(&MetaKey::SchemaVersion.encode())? {
        Some(bytes) => {
            let version = MetaKey::SchemaVersion.decode_u32(&bytes)?;
            if version != SCHEMA_VERSION {
                return Err(StorageError::corruption(format!(
                    "schema version {} is not supported (expected {})",
                    version, SCHEMA_VERSION
                )));
            }
            let source = KvPlanSource(reader);
            match source.node_record(ROOT_NODE_ID)? {
                Some(record) if record.kind == NodeKind::Directory => {}
                _ => return Err(StorageError::corruption("root directory record missing")),
            }
            read_meta_u32(reader, MetaKey::NextNodeId)?;
            if let Some(stored) = reader.get(&MetaKey::Collation.encode())? {
                let stored = String::from_utf8_lossy(&stored);
                if stored != comparator.name() {
                    // Keys carry no collated bytes, so the new order applies on read.
                    info!(
                        previous = %stored,
                        current = %comparator.name(),
                        "Name collation changed since last open"
                    );
                    return Ok(Some(vec![collation_op(comparator)]));
                }
            }
            Ok(None)
        }
        None => {
            if !reader.scan_prefix(&[])?.is_empty() {
                return Err(StorageError::corruption(
                    "store holds data but no schema version",
                ));
            }
            let root = NodeRecord::directory(ROOT_DIRECTORY_NAME, 0);
            debug!("Initializing empty node store");
            Ok(Some(vec![
                BatchOp::Put {
                    key: NodesKey::new(ROOT_NODE_ID).encode(),
                    value: root.encode()?,
                },
                BatchOp::Put {
                    key: MetaKey::NextNodeId.encode(),
                    value: MetaKey::encode_u32(ROOT_NODE_ID + 1),
                },
                BatchOp::Put {
                    key: MetaKey::SchemaVersion.encode(),
                    value: MetaKey::encode_u32(SCHEMA_VERSION),
                },
                collation_op(comparator),
            ]))
        }
    }
}

fn collation_op(comparator: &KeyComparator) -> BatchOp {
    BatchOp::Put {
        key: MetaKey::Collation.encode(),
        value: comparator.name().into_bytes(),
    }
}

/// Root directory as currently stored.
pub(crate) fn load_root<R: KvRead + ?Sized>(reader: &R) -> Result<DirectoryNode, StorageError> {
    let record = KvPlanSource(reader)
        .node_record(ROOT_NODE_ID)?
        .ok_or_else(|| StorageError::corruption("root directory record missing"))?;
    Ok(DirectoryNode {
        node_id: Some(ROOT_NODE_ID),
        name: record.name,
        listing_revision: record.stamp,
        children: Vec::new(),
    })
}

/// Translate a replace plan into one write batch.
pub(crate) fn plan_to_batch(plan: &ReplacePlan) -> Result<Vec<BatchOp>, StorageError> {
    let mut ops = Vec::with_capacity(plan.removals.len() * 3 + plan.upserts.len() * 4 + 2);

    for removal in &plan.removals {
        ops.push(BatchOp::Delete {
            key: NodesKey::new(removal.node_id).encode(),
        });
        ops.push(BatchOp::Delete {
            key: RelationshipsKey::new(removal.parent_id, removal.node_id).encode(),
        });
        let index_key = stored_index_key(removal.parent_id, removal.node_id, &removal.record)?;
        ops.push(BatchOp::Delete {
            key: index_key.encode(),
        });
    }

    for upsert in &plan.upserts {
        let index_key = NameIndexKey::for_record(plan.target_id, upsert.node_id, &upsert.record)?;
        if let Some(previous) = &upsert.previous {
            let stale = stored_index_key(plan.target_id, upsert.node_id, previous)?;
            if stale != index_key {
                ops.push(BatchOp::Delete { key: stale.encode() });
            }
        }
        ops.push(BatchOp::Put {
            key: index_key.encode(),
            value: Vec::new(),
        });
        ops.push(BatchOp::Put {
            key: RelationshipsKey::new(plan.target_id, upsert.node_id).encode(),
            value: Vec::new(),
        });
        ops.push(BatchOp::Put {
            key: NodesKey::new(upsert.node_id).encode(),
            value: upsert.record.encode()?,
        });
    }

    ops.push(BatchOp::Put {
        key: NodesKey::new(plan.target_id).encode(),
        value: plan.target_record.encode()?,
    });
    ops.push(BatchOp::Put {
        key: MetaKey::NextNodeId.encode(),
        value: MetaKey::encode_u32(plan.next_node_id),
    });
    Ok(ops)
}

/// Index key of an already persisted record. A stored name that no longer
/// validates means the store was damaged.
fn stored_index_key(
    parent_id: NodeId,
    node_id: NodeId,
    record: &NodeRecord,
) -> Result<NameIndexKey, StorageError> {
    NameIndexKey::for_record(parent_id, node_id, record).map_err(|err| {
        StorageError::corruption(format!("stored node {}: {}", node_id, err))
    })
}

/// Capture a cursor snapshot from a consistent reader.
///
/// Returns `None` when the directory has no ID or no directory record.
pub(crate) fn load_cursor<R: KvRead + ?Sized>(
    reader: &R,
    comparator: &KeyComparator,
    directory: &DirectoryNode,
    sort_type: SortType,
) -> Result<Option<NodeCursor>, StorageError> {
    let Some(directory_id) = directory.node_id else {
        return Ok(None);
    };
    let record = match KvPlanSource(reader).node_record(directory_id)? {
        Some(record) if record.kind == NodeKind::Directory => record,
        _ => return Ok(None),
    };

    let child_ids: Vec<NodeId> = match sort_type {
        SortType::Unsorted => KvPlanSource(reader).child_ids(directory_id)?,
        SortType::ByName => {
            let mut keys: Vec<Vec<u8>> = reader
                .scan_prefix(&NameIndexKey::parent_prefix(directory_id))?
                .into_iter()
                .map(|(key, _)| key)
                .collect();
            let mut failure = None;
            keys.sort_by(|a, b| {
                comparator.compare(a, b).unwrap_or_else(|err| {
                    failure.get_or_insert(err);
                    // Undecodable keys sort last, bytewise, so the order stays total.
                    let a_bad = NameIndexKey::decode(a).is_err();
                    let b_bad = NameIndexKey::decode(b).is_err();
                    a_bad.cmp(&b_bad).then_with(|| a.cmp(b))
                })
            });
            if let Some(err) = failure {
                return Err(err);
            }
            // A lone key is never compared, so decoding here still catches it.
            keys.iter()
                .map(|key| NameIndexKey::decode(key).map(|key| key.node_id()))
                .collect::<Result<Vec<_>, SchemaError>>()?
        }
    };

    let mut entries = Vec::with_capacity(child_ids.len());
    for node_id in child_ids {
        let bytes = reader.get(&NodesKey::new(node_id).encode())?;
        entries.push((node_id, CursorSlot::from_encoded(bytes.as_deref())));
    }

    let snapshot = DirectoryNode {
        node_id: Some(directory_id),
        name: record.name,
        listing_revision: record.stamp,
        children: Vec::new(),
    };
    Ok(Some(NodeCursor::new(snapshot, sort_type, entries)))
}

/// Parent of `node_id` from the Relationships table.
///
/// Relationships keys lead with the parent, so this scans the whole table:
/// linear in the number of stored nodes.
pub(crate) fn parent_of<R: KvRead + ?Sized>(
    reader: &R,
    node_id: NodeId,
) -> Result<Option<NodeId>, StorageError> {
    if node_id == ROOT_NODE_ID {
        return Ok(Some(ROOT_PARENT_NODE_ID));
    }
    for (key, _) in reader.scan_prefix(&RELATIONSHIPS_PREFIX)? {
        let key = RelationshipsKey::decode(&key)?;
        if key.node_id == node_id {
            return Ok(Some(key.parent_id));
        }
    }
    Ok(None)
}
