//! sled backend
//!
//! All tables live in the default tree as one prefix-partitioned key space. A
//! replace commits through a single sled transaction. sled iterators do not read
//! from a fixed snapshot, so cursor capture and replace commit are kept apart by a
//! reader/writer gate; capture is short because the cursor owns its data after it.

use crate::collation::Collator;
use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::schema::KeyComparator;
use crate::store::cursor::NodeCursor;
use crate::store::kv::{self, BatchOp, FaultPoint, KvPair, KvPlanSource, KvRead};
use crate::store::replace::plan_replace;
use crate::store::NodeDb;
use crate::tree::node::{DirectoryNode, Node};
use crate::types::{NodeId, SortType};
use parking_lot::RwLock;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use tracing::{debug, info, warn};

impl KvRead for sled::Tree {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(sled::Tree::get(self, key)?.map(|value| value.to_vec()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>, StorageError> {
        sled::Tree::scan_prefix(self, prefix)
            .map(|item| {
                let (key, value) = item?;
                Ok((key.to_vec(), value.to_vec()))
            })
            .collect()
    }
}

/// NodeDB over a sled database directory
///
/// Cursor capture holds a read gate, so a replace arriving during capture waits
/// for it to finish. Readers still never observe a partial replace.
pub struct SledNodeDb {
    db: sled::Db,
    comparator: KeyComparator,
    root: DirectoryNode,
    gate: RwLock<()>,
    fault: FaultPoint,
}

impl SledNodeDb {
    /// Open or bootstrap a store at `path` with default tuning.
    pub fn open(path: &Path, collator: Collator) -> Result<Self, StorageError> {
        Self::open_with_config(path, &StorageConfig::default(), collator)
    }

    /// Open or bootstrap a store at `path`, taking cache and flush tuning from `config`.
    pub fn open_with_config(
        path: &Path,
        config: &StorageConfig,
        collator: Collator,
    ) -> Result<Self, StorageError> {
        std::fs::create_dir_all(path)?;
        let db = sled::Config::new()
            .path(path)
            .cache_capacity(config.cache_capacity_bytes)
            .flush_every_ms(config.flush_every_ms)
            .open()?;
        Self::from_db(db, collator)
    }

    /// Wrap an already opened sled database.
    pub fn from_db(db: sled::Db, collator: Collator) -> Result<Self, StorageError> {
        let comparator = KeyComparator::new(collator);
        if let Some(ops) = kv::bootstrap_ops(&*db, &comparator)? {
            let mut batch = sled::Batch::default();
            for op in ops {
                match op {
                    BatchOp::Put { key, value } => batch.insert(key, value),
                    BatchOp::Delete { key } => batch.remove(key),
                }
            }
            db.apply_batch(batch)?;
            db.flush()?;
            info!(collation = %comparator.name(), "Bootstrapped sled node store");
        }
        let root = kv::load_root(&*db)?;
        Ok(SledNodeDb {
            db,
            comparator,
            root,
            gate: RwLock::new(()),
            fault: FaultPoint::default(),
        })
    }

    fn commit(&self, ops: &[BatchOp]) -> Result<(), StorageError> {
        let result: Result<(), TransactionError<StorageError>> = self.db.transaction(|tx| {
            for op in ops {
                self.fault
                    .check()
                    .map_err(ConflictableTransactionError::Abort)?;
                match op {
                    BatchOp::Put { key, value } => {
                        tx.insert(key.as_slice(), value.as_slice())?;
                    }
                    BatchOp::Delete { key } => {
                        tx.remove(key.as_slice())?;
                    }
                }
            }
            Ok(())
        });
        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }
}

impl NodeDb for SledNodeDb {
    fn backend_name(&self) -> &'static str {
        "sled"
    }

    fn root_directory_node(&self) -> DirectoryNode {
        match kv::load_root(&*self.db) {
            Ok(root) => root,
            Err(err) => {
                warn!(error = %err, "Root record unreadable, using the identity from open");
                self.root.clone()
            }
        }
    }

    fn cursor_for_directory(
        &self,
        directory: &DirectoryNode,
        sort_type: SortType,
    ) -> Result<Option<NodeCursor>, StorageError> {
        let _snapshot = self.gate.read();
        let cursor = kv::load_cursor(&*self.db, &self.comparator, directory, sort_type)?;
        if let Some(cursor) = &cursor {
            debug!(
                directory = ?directory.node_id,
                count = cursor.count(),
                ?sort_type,
                "Captured cursor"
            );
        }
        Ok(cursor)
    }

    fn replace_nodes_in_directory(
        &self,
        target: &mut DirectoryNode,
        children: Vec<Node>,
    ) -> Result<(), StorageError> {
        let _writer = self.gate.write();
        let plan = plan_replace(&KvPlanSource(&*self.db), target, children)?;
        let ops = kv::plan_to_batch(&plan)?;
        self.commit(&ops)?;
        debug!(
            directory = plan.target_id,
            retained = plan.retained(),
            added = plan.added(),
            removed = plan.removals.len(),
            revision = plan.target_record.stamp,
            "Replaced directory children"
        );
        plan.apply_to(target);
        Ok(())
    }

    fn parent_of(&self, node_id: NodeId) -> Result<Option<NodeId>, StorageError> {
        let _snapshot = self.gate.read();
        kv::parent_of(&*self.db, node_id)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
