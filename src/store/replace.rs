//! Whole-directory replace planning
//!
//! Backends read the current state through [`PlanSource`] inside their write
//! transaction, get back a [`ReplacePlan`], and apply it in the same transaction.
//! The plan decides node identity: which incoming children keep an existing ID,
//! which get a fresh one, and which persisted nodes disappear.

use crate::error::StorageError;
use crate::schema::{validate_name, NodeRecord};
use crate::tree::node::{DirectoryNode, Node};
use crate::types::{NodeId, NodeKind, INVALID_NODE_ID, ROOT_NODE_ID};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Read access needed to plan a replace
pub(crate) trait PlanSource {
    fn node_record(&self, node_id: NodeId) -> Result<Option<NodeRecord>, StorageError>;
    fn child_ids(&self, parent_id: NodeId) -> Result<Vec<NodeId>, StorageError>;
    fn next_node_id(&self) -> Result<NodeId, StorageError>;
}

/// A persisted node to delete, with the record needed to locate its index entries
#[derive(Debug, Clone)]
pub(crate) struct Removal {
    pub parent_id: NodeId,
    pub node_id: NodeId,
    pub record: NodeRecord,
}

/// A child of the target to write
#[derive(Debug, Clone)]
pub(crate) struct Upsert {
    pub node_id: NodeId,
    pub previous: Option<NodeRecord>,
    pub record: NodeRecord,
}

#[derive(Debug)]
pub(crate) struct ReplacePlan {
    pub target_id: NodeId,
    /// Target record with its listing revision bumped
    pub target_record: NodeRecord,
    /// Dropped children and, for dropped directories, their whole subtree
    pub removals: Vec<Removal>,
    pub upserts: Vec<Upsert>,
    pub next_node_id: NodeId,
    children: Vec<Node>,
    retained: usize,
}

impl ReplacePlan {
    pub fn added(&self) -> usize {
        self.upserts.len() - self.retained
    }

    pub fn retained(&self) -> usize {
        self.retained
    }

    /// Reflect the committed state in the caller's directory value.
    pub fn apply_to(self, target: &mut DirectoryNode) {
        target.listing_revision = self.target_record.stamp;
        target.children = self.children;
    }
}

/// Plan replacing the children of `target` with `children`.
pub(crate) fn plan_replace(
    source: &impl PlanSource,
    target: &DirectoryNode,
    children: Vec<Node>,
) -> Result<ReplacePlan, StorageError> {
    let target_id = target.node_id.ok_or_else(|| {
        StorageError::not_found(format!("directory {:?} has never been stored", target.name))
    })?;
    let mut target_record = match source.node_record(target_id)? {
        Some(record) if record.kind == NodeKind::Directory => record,
        Some(_) => {
            return Err(StorageError::not_found(format!(
                "node {} is not a directory",
                target_id
            )))
        }
        None => {
            return Err(StorageError::not_found(format!(
                "directory {} does not exist",
                target_id
            )))
        }
    };
    for child in &children {
        validate_name(child.name())?;
    }

    let mut current: BTreeMap<NodeId, NodeRecord> = BTreeMap::new();
    for node_id in source.child_ids(target_id)? {
        current.insert(node_id, load_record(source, target_id, node_id)?);
    }

    let mut claimed: HashSet<NodeId> = HashSet::new();
    let mut assigned: Vec<Option<NodeId>> = vec![None; children.len()];

    // Explicit IDs from the current child set win first.
    for (slot, child) in assigned.iter_mut().zip(&children) {
        if let Some(node_id) = child.node_id() {
            let same_kind = current
                .get(&node_id)
                .map_or(false, |record| record.kind == child.kind());
            if same_kind && claimed.insert(node_id) {
                *slot = Some(node_id);
            }
        }
    }

    // Then unclaimed current children with the same kind and name, lowest ID first.
    let mut by_name: HashMap<(NodeKind, &str), VecDeque<NodeId>> = HashMap::new();
    for (node_id, record) in &current {
        if !claimed.contains(node_id) {
            by_name
                .entry((record.kind, record.name.as_str()))
                .or_default()
                .push_back(*node_id);
        }
    }
    let mut next_node_id = source.next_node_id()?;
    if next_node_id <= ROOT_NODE_ID {
        return Err(StorageError::corruption(format!(
            "node ID counter at {} overlaps the root",
            next_node_id
        )));
    }
    for (slot, child) in assigned.iter_mut().zip(&children) {
        if slot.is_some() {
            continue;
        }
        let reused = by_name
            .get_mut(&(child.kind(), child.name()))
            .and_then(|ids| {
                while let Some(node_id) = ids.pop_front() {
                    if claimed.insert(node_id) {
                        return Some(node_id);
                    }
                }
                None
            });
        *slot = match reused {
            Some(node_id) => Some(node_id),
            None => {
                if next_node_id == INVALID_NODE_ID {
                    return Err(StorageError::IdSpaceExhausted);
                }
                let fresh = next_node_id;
                next_node_id += 1;
                Some(fresh)
            }
        };
    }

    let mut upserts = Vec::with_capacity(children.len());
    let mut committed = Vec::with_capacity(children.len());
    let mut retained = 0;
    for (slot, mut child) in assigned.into_iter().zip(children) {
        let node_id = slot.ok_or_else(|| {
            StorageError::Unknown(format!("no node ID assigned to {:?}", child.name()))
        })?;
        let previous = current.get(&node_id).cloned();
        child.set_node_id(node_id);
        if let Node::Directory(directory) = &mut child {
            directory.children.clear();
            // A retained directory keeps the revision of its own stored listing.
            if let Some(stored) = &previous {
                directory.listing_revision = stored.stamp;
            }
        }
        if previous.is_some() {
            retained += 1;
        }
        upserts.push(Upsert {
            node_id,
            previous,
            record: NodeRecord::from_node(&child),
        });
        committed.push(child);
    }

    let mut removals = Vec::new();
    for (node_id, record) in current {
        if claimed.contains(&node_id) {
            continue;
        }
        let is_directory = record.kind == NodeKind::Directory;
        removals.push(Removal {
            parent_id: target_id,
            node_id,
            record,
        });
        if is_directory {
            collect_subtree(source, node_id, &mut removals)?;
        }
    }

    target_record.stamp = target_record.stamp.saturating_add(1);

    Ok(ReplacePlan {
        target_id,
        target_record,
        removals,
        upserts,
        next_node_id,
        children: committed,
        retained,
    })
}

fn load_record(
    source: &impl PlanSource,
    parent_id: NodeId,
    node_id: NodeId,
) -> Result<NodeRecord, StorageError> {
    source.node_record(node_id)?.ok_or_else(|| {
        StorageError::corruption(format!(
            "node {} is listed under {} but has no record",
            node_id, parent_id
        ))
    })
}

fn collect_subtree(
    source: &impl PlanSource,
    directory_id: NodeId,
    removals: &mut Vec<Removal>,
) -> Result<(), StorageError> {
    let mut pending = vec![directory_id];
    while let Some(parent_id) = pending.pop() {
        for node_id in source.child_ids(parent_id)? {
            let record = load_record(source, parent_id, node_id)?;
            if record.kind == NodeKind::Directory {
                pending.push(node_id);
            }
            removals.push(Removal {
                parent_id,
                node_id,
                record,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tree::node::FileNode;
    use std::cell::RefCell;

    /// Parent → children map plus records, no persistence
    #[derive(Default)]
    struct FakeSource {
        records: BTreeMap<NodeId, NodeRecord>,
        children: BTreeMap<NodeId, Vec<NodeId>>,
        next: NodeId,
        child_lookups: RefCell<usize>,
    }

    impl FakeSource {
        fn new() -> Self {
            let mut source = FakeSource {
                next: 2,
                ..Default::default()
            };
            source
                .records
                .insert(ROOT_NODE_ID, NodeRecord::directory("/", 0));
            source
        }

        fn add(&mut self, parent: NodeId, record: NodeRecord) -> NodeId {
            let id = self.next;
            self.next += 1;
            self.records.insert(id, record);
            self.children.entry(parent).or_default().push(id);
            id
        }
    }

    impl PlanSource for FakeSource {
        fn node_record(&self, node_id: NodeId) -> Result<Option<NodeRecord>, StorageError> {
            Ok(self.records.get(&node_id).cloned())
        }

        fn child_ids(&self, parent_id: NodeId) -> Result<Vec<NodeId>, StorageError> {
            *self.child_lookups.borrow_mut() += 1;
            Ok(self.children.get(&parent_id).cloned().unwrap_or_default())
        }

        fn next_node_id(&self) -> Result<NodeId, StorageError> {
            Ok(self.next)
        }
    }

    #[test]
    fn test_fresh_children_get_sequential_ids() {
        let source = FakeSource::new();
        let plan = plan_replace(
            &source,
            &DirectoryNode::root(),
            vec![
                DirectoryNode::new("Photos").into(),
                FileNode::new("notes.txt", 100).into(),
            ],
        )
        .unwrap();

        let ids: Vec<NodeId> = plan.upserts.iter().map(|u| u.node_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(plan.next_node_id, 4);
        assert_eq!(plan.added(), 2);
        assert!(plan.removals.is_empty());
        assert_eq!(plan.target_record.stamp, 1);
    }

    #[test]
    fn test_same_name_and_kind_keeps_identity() {
        let mut source = FakeSource::new();
        let photos = source.add(ROOT_NODE_ID, NodeRecord::directory("Photos", 7));
        let notes = source.add(ROOT_NODE_ID, NodeRecord::file("notes", 1));

        let plan = plan_replace(
            &source,
            &DirectoryNode::root(),
            vec![
                DirectoryNode::new("Photos").into(),
                // Same name, different kind: a new node.
                DirectoryNode::new("notes").into(),
            ],
        )
        .unwrap();

        assert_eq!(plan.upserts[0].node_id, photos);
        assert_eq!(plan.upserts[0].record.stamp, 7);
        assert_ne!(plan.upserts[1].node_id, notes);
        assert_eq!(plan.retained(), 1);
        assert_eq!(plan.removals.len(), 1);
        assert_eq!(plan.removals[0].node_id, notes);

        let mut root = DirectoryNode::root();
        plan.apply_to(&mut root);
        assert_eq!(root.listing_revision, 1);
        assert_eq!(root.children[0].node_id(), Some(photos));
        assert_eq!(root.children[0].stamp(), 7);
    }

    #[test]
    fn test_explicit_id_allows_rename() {
        let mut source = FakeSource::new();
        let old = source.add(ROOT_NODE_ID, NodeRecord::file("draft.txt", 1));
        let mut renamed = FileNode::new("final.txt", 2);
        renamed.node_id = Some(old);

        let plan = plan_replace(&source, &DirectoryNode::root(), vec![renamed.into()]).unwrap();
        assert_eq!(plan.upserts[0].node_id, old);
        assert_eq!(
            plan.upserts[0].previous,
            Some(NodeRecord::file("draft.txt", 1))
        );
        assert!(plan.removals.is_empty());
    }

    #[test]
    fn test_foreign_id_is_not_stolen() {
        let mut source = FakeSource::new();
        let dir = source.add(ROOT_NODE_ID, NodeRecord::directory("d", 0));
        let elsewhere = source.add(dir, NodeRecord::file("x", 1));
        let mut moved = FileNode::new("x", 1);
        moved.node_id = Some(elsewhere);

        let plan = plan_replace(&source, &DirectoryNode::root(), vec![
            DirectoryNode::new("d").into(),
            moved.into(),
        ])
        .unwrap();
        assert_ne!(plan.upserts[1].node_id, elsewhere);
    }

    #[test]
    fn test_removed_directory_cascades() {
        let mut source = FakeSource::new();
        let dir = source.add(ROOT_NODE_ID, NodeRecord::directory("old", 0));
        let nested = source.add(dir, NodeRecord::directory("nested", 0));
        let leaf = source.add(nested, NodeRecord::file("leaf", 5));

        let plan = plan_replace(&source, &DirectoryNode::root(), Vec::new()).unwrap();
        let mut removed: Vec<(NodeId, NodeId)> = plan
            .removals
            .iter()
            .map(|r| (r.parent_id, r.node_id))
            .collect();
        removed.sort();
        assert_eq!(
            removed,
            vec![(ROOT_NODE_ID, dir), (dir, nested), (nested, leaf)]
        );
    }

    #[test]
    fn test_missing_or_file_target_is_not_found() {
        let mut source = FakeSource::new();
        let file = source.add(ROOT_NODE_ID, NodeRecord::file("f", 0));

        let unsaved = DirectoryNode::new("never stored");
        let err = plan_replace(&source, &unsaved, Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut gone = DirectoryNode::new("gone");
        gone.node_id = Some(99);
        assert_eq!(
            plan_replace(&source, &gone, Vec::new()).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let mut not_dir = DirectoryNode::new("f");
        not_dir.node_id = Some(file);
        assert_eq!(
            plan_replace(&source, &not_dir, Vec::new()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_invalid_child_name_rejected_before_reads() {
        let source = FakeSource::new();
        let err = plan_replace(
            &source,
            &DirectoryNode::root(),
            vec![FileNode::new("x".repeat(256), 0).into()],
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::InvalidName { .. }));
        assert_eq!(*source.child_lookups.borrow(), 0);
    }

    #[test]
    fn test_id_space_exhaustion() {
        let mut source = FakeSource::new();
        source.next = INVALID_NODE_ID;
        let err = plan_replace(
            &source,
            &DirectoryNode::root(),
            vec![FileNode::new("a", 0).into()],
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::IdSpaceExhausted));
    }

    #[test]
    fn test_listed_child_without_record_is_corruption() {
        let mut source = FakeSource::new();
        source.children.insert(ROOT_NODE_ID, vec![42]);
        let err = plan_replace(&source, &DirectoryNode::root(), Vec::new()).unwrap_err();
        assert!(err.is_corruption());
    }
}
