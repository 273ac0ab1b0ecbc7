//! Behavior every NodeDb backend must share.
//!
//! `backend_suite!` instantiates the same tests for each engine.

use nodedb::collation::Collator;
use nodedb::error::{ErrorKind, StorageError};
use nodedb::store::{MemoryNodeDb, NodeDb, SledNodeDb};
use nodedb::tree::node::{DirectoryNode, FileNode, Node};
use nodedb::types::{NodeKind, SortType};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn collator() -> Collator {
    Collator::new("en")
}

pub fn open_sled(path: &Path) -> Box<dyn NodeDb> {
    Box::new(SledNodeDb::open(path, collator()).unwrap())
}

pub fn open_memory(_path: &Path) -> Box<dyn NodeDb> {
    Box::new(MemoryNodeDb::open(collator()).unwrap())
}

#[cfg(feature = "sqlite")]
pub fn open_sqlite(path: &Path) -> Box<dyn NodeDb> {
    Box::new(nodedb::store::SqliteNodeDb::open(path, collator()).unwrap())
}

fn listing(db: &dyn NodeDb, directory: &DirectoryNode, sort_type: SortType) -> Vec<Node> {
    db.cursor_for_directory(directory, sort_type)
        .unwrap()
        .expect("directory exists")
        .iter()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn tuples(nodes: &[Node]) -> BTreeSet<(String, NodeKind, u64)> {
    nodes
        .iter()
        .map(|n| {
            let mtime = n.as_file().map(|f| f.mtime).unwrap_or(0);
            (n.name().to_string(), n.kind(), mtime)
        })
        .collect()
}

fn files(names: &[&str]) -> Vec<Node> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| FileNode::new(*name, i as u64 + 1).into())
        .collect()
}

pub fn fresh_root_is_empty(open: fn(&Path) -> Box<dyn NodeDb>) {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path());
    let root = db.root_directory_node();
    assert!(root.is_root_directory());
    let cursor = db
        .cursor_for_directory(&root, SortType::ByName)
        .unwrap()
        .unwrap();
    assert_eq!(cursor.count(), 0);
    assert_eq!(
        cursor.fetch_node_at_index(0).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

pub fn photos_and_notes_scenario(open: fn(&Path) -> Box<dyn NodeDb>) {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path());
    let mut root = db.root_directory_node();
    db.replace_nodes_in_directory(
        &mut root,
        vec![
            DirectoryNode::new("Photos").into(),
            FileNode::new("notes.txt", 100).into(),
            FileNode::new("Notes.txt", 50).into(),
        ],
    )
    .unwrap();

    let cursor = db
        .cursor_for_directory(&root, SortType::ByName)
        .unwrap()
        .unwrap();
    assert_eq!(cursor.count(), 3);
    let first = cursor.fetch_node_at_index(0).unwrap();
    assert_eq!(first.name(), "Photos");
    assert!(first.is_directory());
    assert_eq!(cursor.fetch_node_at_index(1).unwrap().name(), "notes.txt");
    assert_eq!(cursor.fetch_node_at_index(2).unwrap().name(), "Notes.txt");
    assert_eq!(cursor.fetch_node_at_index(2).unwrap().stamp(), 50);
    assert_eq!(
        cursor.fetch_node_at_index(3).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

pub fn cursor_is_a_snapshot(open: fn(&Path) -> Box<dyn NodeDb>) {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path());
    let mut root = db.root_directory_node();
    db.replace_nodes_in_directory(&mut root, files(&["a", "b"]))
        .unwrap();
    let before = db
        .cursor_for_directory(&root, SortType::ByName)
        .unwrap()
        .unwrap();

    db.replace_nodes_in_directory(&mut root, files(&["x", "y", "z"]))
        .unwrap();
    let after = db
        .cursor_for_directory(&root, SortType::ByName)
        .unwrap()
        .unwrap();

    assert_eq!(before.count(), 2);
    let names: Vec<String> = before
        .iter()
        .map(|n| n.unwrap().name().to_string())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(after.count(), 3);
    assert_eq!(after.fetch_node_at_index(0).unwrap().name(), "x");
}

pub fn replace_yields_exactly_the_new_set(open: fn(&Path) -> Box<dyn NodeDb>) {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path());
    let mut root = db.root_directory_node();
    db.replace_nodes_in_directory(&mut root, files(&["keep", "drop-1", "drop-2"]))
        .unwrap();

    let next: Vec<Node> = vec![
        FileNode::new("keep", 9).into(),
        FileNode::new("fresh", 4).into(),
        DirectoryNode::new("sub").into(),
    ];
    let expected = tuples(&next);
    db.replace_nodes_in_directory(&mut root, next).unwrap();

    for sort_type in [SortType::ByName, SortType::Unsorted] {
        let nodes = listing(db.as_ref(), &root, sort_type);
        assert_eq!(nodes.len(), 3);
        assert_eq!(tuples(&nodes), expected);
    }
    assert_eq!(root.listing_revision, 2);
    assert_eq!(tuples(&root.children), expected);
}

pub fn identity_follows_name_and_kind(open: fn(&Path) -> Box<dyn NodeDb>) {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path());
    let mut root = db.root_directory_node();
    db.replace_nodes_in_directory(&mut root, vec![DirectoryNode::new("Photos").into()])
        .unwrap();
    let mut photos = root.children[0].as_directory().unwrap().clone();
    db.replace_nodes_in_directory(&mut photos, files(&["beach.jpg"]))
        .unwrap();

    db.replace_nodes_in_directory(
        &mut root,
        vec![DirectoryNode::new("Photos").into(), FileNode::new("a", 1).into()],
    )
    .unwrap();
    let refreshed = root.children[0].as_directory().unwrap().clone();
    assert_eq!(refreshed.node_id, photos.node_id);
    assert_eq!(listing(db.as_ref(), &refreshed, SortType::ByName).len(), 1);
    assert_eq!(db.parent_of(photos.node_id.unwrap()).unwrap(), root.node_id);

    db.replace_nodes_in_directory(&mut root, files(&["a"])).unwrap();
    assert!(db
        .cursor_for_directory(&photos, SortType::ByName)
        .unwrap()
        .is_none());
}

pub fn invalid_names_change_nothing(open: fn(&Path) -> Box<dyn NodeDb>) {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path());
    let mut root = db.root_directory_node();
    db.replace_nodes_in_directory(&mut root, files(&["ok"])).unwrap();
    let before = root.clone();

    for bad in ["x".repeat(256), "a/b".to_string(), String::new()] {
        let err = db
            .replace_nodes_in_directory(
                &mut root,
                vec![FileNode::new("fine", 1).into(), FileNode::new(bad, 1).into()],
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidName { .. }));
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }
    assert_eq!(root, before);
    let names: Vec<String> = listing(db.as_ref(), &root, SortType::ByName)
        .iter()
        .map(|n| n.name().to_string())
        .collect();
    assert_eq!(names, vec!["ok"]);

    // 255 bytes is the limit, not past it.
    db.replace_nodes_in_directory(&mut root, vec![FileNode::new("y".repeat(255), 1).into()])
        .unwrap();
}

pub fn missing_target_is_not_found(open: fn(&Path) -> Box<dyn NodeDb>) {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path());
    let mut ghost = DirectoryNode::new("ghost");
    ghost.node_id = Some(4_000);
    let err = db
        .replace_nodes_in_directory(&mut ghost, files(&["a"]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(ghost.children.is_empty());
    assert!(db
        .cursor_for_directory(&ghost, SortType::Unsorted)
        .unwrap()
        .is_none());
}

pub fn readers_never_see_half_a_replace(open: fn(&Path) -> Box<dyn NodeDb>) {
    let dir = TempDir::new().unwrap();
    let db: Arc<dyn NodeDb> = Arc::from(open(dir.path()));
    let small: Vec<&str> = vec!["s1", "s2", "s3"];
    let large: Vec<&str> = vec!["l1", "l2", "l3", "l4", "l5"];
    let small_set: BTreeSet<String> = small.iter().map(|s| s.to_string()).collect();
    let large_set: BTreeSet<String> = large.iter().map(|s| s.to_string()).collect();

    let mut root = db.root_directory_node();
    db.replace_nodes_in_directory(&mut root, files(&small)).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        let mut root = root.clone();
        std::thread::spawn(move || {
            for round in 0..40 {
                let names = if round % 2 == 0 { &large } else { &small };
                db.replace_nodes_in_directory(&mut root, files(names)).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    while !done.load(Ordering::SeqCst) {
        let cursor = db
            .cursor_for_directory(&root, SortType::ByName)
            .unwrap()
            .unwrap();
        let seen: BTreeSet<String> = cursor
            .iter()
            .map(|n| n.unwrap().name().to_string())
            .collect();
        assert_eq!(seen.len(), cursor.count());
        assert!(seen == small_set || seen == large_set, "mixed listing: {:?}", seen);
    }
    writer.join().unwrap();
}

pub fn by_name_order_holds(open: fn(&Path) -> Box<dyn NodeDb>) {
    let name_sets = prop::collection::btree_set("[a-zA-Z0-9 ._éÉ-]{1,12}", 1..24);
    let kind_flags = prop::collection::vec(any::<bool>(), 24);
    proptest!(ProptestConfig::with_cases(12), |(names in name_sets, kinds in kind_flags)| {
        let dir = TempDir::new().unwrap();
        let db = open(dir.path());
        let mut root = db.root_directory_node();
        let children: Vec<Node> = names
            .iter()
            .zip(&kinds)
            .map(|(name, is_dir)| {
                if *is_dir {
                    DirectoryNode::new(name.as_str()).into()
                } else {
                    FileNode::new(name.as_str(), 7).into()
                }
            })
            .collect();
        db.replace_nodes_in_directory(&mut root, children).unwrap();

        let nodes = listing(db.as_ref(), &root, SortType::ByName);
        prop_assert_eq!(nodes.len(), names.len());
        let collator = collator();
        for pair in nodes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.kind() <= b.kind());
            if a.kind() == b.kind() {
                prop_assert!(collator.compare(a.name(), b.name()).is_le());
            }
        }
    });
}

pub fn root_survives_reopen(open: fn(&Path) -> Box<dyn NodeDb>) {
    let dir = TempDir::new().unwrap();
    let root_id = {
        let db = open(dir.path());
        let mut root = db.root_directory_node();
        db.replace_nodes_in_directory(&mut root, files(&["persisted"]))
            .unwrap();
        db.flush().unwrap();
        root.node_id
    };
    let db = open(dir.path());
    let root = db.root_directory_node();
    assert!(root.is_root_directory());
    assert_eq!(root.node_id, root_id);
    assert_eq!(root.listing_revision, 1);
    let names: Vec<String> = listing(db.as_ref(), &root, SortType::Unsorted)
        .iter()
        .map(|n| n.name().to_string())
        .collect();
    assert_eq!(names, vec!["persisted"]);
}

macro_rules! backend_suite {
    ($backend:ident, $open:path, persistent = $persistent:tt) => {
        mod $backend {
            use super::*;

            #[test]
            fn fresh_root_is_empty() {
                super::fresh_root_is_empty($open);
            }

            #[test]
            fn photos_and_notes_scenario() {
                super::photos_and_notes_scenario($open);
            }

            #[test]
            fn cursor_is_a_snapshot() {
                super::cursor_is_a_snapshot($open);
            }

            #[test]
            fn replace_yields_exactly_the_new_set() {
                super::replace_yields_exactly_the_new_set($open);
            }

            #[test]
            fn identity_follows_name_and_kind() {
                super::identity_follows_name_and_kind($open);
            }

            #[test]
            fn invalid_names_change_nothing() {
                super::invalid_names_change_nothing($open);
            }

            #[test]
            fn missing_target_is_not_found() {
                super::missing_target_is_not_found($open);
            }

            #[test]
            fn readers_never_see_half_a_replace() {
                super::readers_never_see_half_a_replace($open);
            }

            #[test]
            fn by_name_order_holds() {
                super::by_name_order_holds($open);
            }

            backend_suite!(@persistent $persistent, $open);
        }
    };
    (@persistent true, $open:path) => {
        #[test]
        fn root_survives_reopen() {
            super::root_survives_reopen($open);
        }
    };
    (@persistent false, $open:path) => {};
}

backend_suite!(sled_backend, open_sled, persistent = true);
backend_suite!(memory_backend, open_memory, persistent = false);
#[cfg(feature = "sqlite")]
backend_suite!(sqlite_backend, open_sqlite, persistent = true);
