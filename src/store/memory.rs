//! In-memory backend
//!
//! The key space is an immutable `BTreeMap` behind an `Arc`. Readers clone the
//! `Arc` and work on that version; a replace builds the next version off to the
//! side and swaps it in, so a reader never sees half of one.

use crate::collation::Collator;
use crate::error::StorageError;
use crate::schema::KeyComparator;
use crate::store::cursor::NodeCursor;
use crate::store::kv::{self, BatchOp, FaultPoint, KvPair, KvPlanSource, KvRead};
use crate::store::replace::plan_replace;
use crate::store::NodeDb;
use crate::tree::node::{DirectoryNode, Node};
use crate::types::{NodeId, SortType};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

type KeySpace = BTreeMap<Vec<u8>, Vec<u8>>;

impl KvRead for KeySpace {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(BTreeMap::get(self, key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StorageError> {
        Ok(self
            .range::<[u8], _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

/// Volatile NodeDB, mostly for tests and ephemeral sessions
pub struct MemoryNodeDb {
    current: RwLock<Arc<KeySpace>>,
    writer: Mutex<()>,
    comparator: KeyComparator,
    fault: FaultPoint,
}

impl MemoryNodeDb {
    pub fn open(collator: Collator) -> Result<Self, StorageError> {
        let comparator = KeyComparator::new(collator);
        let mut space = KeySpace::new();
        if let Some(ops) = kv::bootstrap_ops(&space, &comparator)? {
            apply(&mut space, ops, None)?;
        }
        Ok(MemoryNodeDb {
            current: RwLock::new(Arc::new(space)),
            writer: Mutex::new(()),
            comparator,
            fault: FaultPoint::default(),
        })
    }

    fn snapshot(&self) -> Arc<KeySpace> {
        Arc::clone(&self.current.read())
    }
}

fn apply(
    space: &mut KeySpace,
    ops: Vec<BatchOp>,
    fault: Option<&FaultPoint>,
) -> Result<(), StorageError> {
    for op in ops {
        if let Some(fault) = fault {
            fault.check()?;
        }
        match op {
            BatchOp::Put { key, value } => {
                space.insert(key, value);
            }
            BatchOp::Delete { key } => {
                space.remove(&key);
            }
        }
    }
    Ok(())
}

impl NodeDb for MemoryNodeDb {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn root_directory_node(&self) -> DirectoryNode {
        kv::load_root(&*self.snapshot()).unwrap_or_else(|_| DirectoryNode::root())
    }

    fn cursor_for_directory(
        &self,
        directory: &DirectoryNode,
        sort_type: SortType,
    ) -> Result<Option<NodeCursor>, StorageError> {
        let snapshot = self.snapshot();
        kv::load_cursor(&*snapshot, &self.comparator, directory, sort_type)
    }

    fn replace_nodes_in_directory(
        &self,
        target: &mut DirectoryNode,
        children: Vec<Node>,
    ) -> Result<(), StorageError> {
        let _writer = self.writer.lock();
        let base = self.snapshot();
        let plan = plan_replace(&KvPlanSource(&*base), target, children)?;
        let ops = kv::plan_to_batch(&plan)?;

        let mut next = KeySpace::clone(&base);
        apply(&mut next, ops, Some(&self.fault))?;
        *self.current.write() = Arc::new(next);

        debug!(
            directory = plan.target_id,
            retained = plan.retained(),
            added = plan.added(),
            removed = plan.removals.len(),
            "Replaced directory children"
        );
        plan.apply_to(target);
        Ok(())
    }

    fn parent_of(&self, node_id: NodeId) -> Result<Option<NodeId>, StorageError> {
        kv::parent_of(&*self.snapshot(), node_id)
    }
}
