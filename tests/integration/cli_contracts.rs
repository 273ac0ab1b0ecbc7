use std::fs;

use clap::Parser;
use nodedb::collation::Collator;
use nodedb::config::{Backend, NodeDbConfig};
use nodedb::error::ApiError;
use nodedb::store::{MemoryNodeDb, SledNodeDb};
use nodedb::tooling::cli::{Cli, CliContext, Commands};
use nodedb::tree::archive;
use nodedb::tree::node::{DirectoryNode, FileNode, Node};
use tempfile::TempDir;

fn memory_context() -> CliContext {
    let db = MemoryNodeDb::open(Collator::new("en")).unwrap();
    CliContext::with_db(NodeDbConfig::default(), Box::new(db))
}

fn write_archive(dir: &TempDir, tree: &Node) -> std::path::PathBuf {
    let path = dir.path().join("tree.json");
    fs::write(&path, archive::encode(tree).unwrap()).unwrap();
    path
}

fn music() -> Node {
    DirectoryNode::new("cloud")
        .with_children(vec![
            FileNode::new("b-side.flac", 10).into(),
            DirectoryNode::new("Albums")
                .with_children(vec![FileNode::new("track01.flac", 20).into()])
                .into(),
            FileNode::new("A-side.flac", 30).into(),
        ])
        .into()
}

#[test]
fn parse_valid_command_matrix() {
    let cases: Vec<Vec<&str>> = vec![
        vec!["nodedb", "ls"],
        vec!["nodedb", "ls", "/Photos", "--unsorted"],
        vec!["nodedb", "import", "tree.json"],
        vec!["nodedb", "import", "tree.json", "--into", "/a"],
        vec!["nodedb", "export"],
        vec!["nodedb", "export", "/a/b"],
        vec!["nodedb", "stat"],
        vec!["nodedb", "config"],
        vec!["nodedb", "--backend", "sqlite", "stat"],
        vec!["nodedb", "--store", "/tmp/store", "--config", "nodedb.toml", "ls"],
        vec!["nodedb", "--config", "nodedb.toml", "--no-global-config", "config"],
    ];

    for args in cases {
        let parsed = Cli::try_parse_from(args.clone());
        assert!(parsed.is_ok(), "expected valid parse for args: {args:?}");
    }
}

#[test]
fn parse_rejects_unknown_backend_and_missing_archive() {
    assert!(Cli::try_parse_from(["nodedb", "--backend", "rocksdb", "stat"]).is_err());
    assert!(Cli::try_parse_from(["nodedb", "import"]).is_err());
    assert!(Cli::try_parse_from(["nodedb"]).is_err());
    assert!(Cli::try_parse_from(["nodedb", "--no-global-config", "stat"]).is_err());
}

#[test]
fn ls_lists_directories_first_in_name_order() {
    let dir = TempDir::new().unwrap();
    let ctx = memory_context();
    let archive_path = write_archive(&dir, &music());
    ctx.execute(&Commands::Import {
        archive: archive_path,
        into: None,
    })
    .unwrap();

    let out = ctx
        .execute(&Commands::Ls {
            path: None,
            unsorted: false,
        })
        .unwrap();
    assert!(out.starts_with("/ (3 entries, revision 1)"));
    let albums = out.find("Albums").unwrap();
    let a_side = out.find("A-side.flac").unwrap();
    let b_side = out.find("b-side.flac").unwrap();
    assert!(albums < a_side && a_side < b_side);
}

#[test]
fn import_into_missing_directory_fails_without_writing() {
    let dir = TempDir::new().unwrap();
    let ctx = memory_context();
    let archive_path = write_archive(&dir, &music());
    let err = ctx
        .execute(&Commands::Import {
            archive: archive_path,
            into: Some("/nowhere".to_string()),
        })
        .unwrap_err();
    assert!(matches!(err, ApiError::PathNotFound(_)));
    assert_eq!(ctx.node_db().root_directory_node().listing_revision, 0);
}

#[test]
fn export_of_subdirectory_is_an_archive_of_that_subtree() {
    let dir = TempDir::new().unwrap();
    let ctx = memory_context();
    let archive_path = write_archive(&dir, &music());
    ctx.execute(&Commands::Import {
        archive: archive_path,
        into: None,
    })
    .unwrap();

    let exported = ctx
        .execute(&Commands::Export {
            path: Some("/Albums".to_string()),
        })
        .unwrap();
    let tree = archive::decode(exported.as_bytes()).unwrap();
    let albums = tree.as_directory().unwrap();
    assert_eq!(albums.name, "Albums");
    assert_eq!(albums.children.len(), 1);
    assert_eq!(albums.children[0].name(), "track01.flac");
    assert_eq!(albums.children[0].stamp(), 20);
}

#[test]
fn config_command_renders_effective_toml() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("nodedb.toml");
    fs::write(
        &config_path,
        "[storage]\nbackend = \"memory\"\n\n[collation]\nlocale = \"sv\"\n",
    )
    .unwrap();

    let cli = Cli::try_parse_from([
        "nodedb",
        "--config",
        config_path.to_str().unwrap(),
        "--no-global-config",
        "config",
    ])
    .unwrap();
    assert!(cli.no_global_config);
    let config = CliContext::load_config(&cli).unwrap();
    assert_eq!(config.storage.backend, Backend::Memory);
    assert_eq!(config.collation.locale.as_deref(), Some("sv"));

    let ctx = CliContext::new(&cli).unwrap();
    assert_eq!(ctx.node_db().backend_name(), "memory");
    let rendered = ctx.execute(&cli.command).unwrap();
    let parsed: NodeDbConfig = toml::from_str(&rendered).unwrap();
    assert_eq!(parsed.collation.locale.as_deref(), Some("sv"));
}

#[test]
fn sled_store_keeps_imports_across_contexts() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store");
    let archive_path = write_archive(&dir, &music());
    {
        let db = SledNodeDb::open(&store, Collator::new("en")).unwrap();
        let ctx = CliContext::with_db(NodeDbConfig::default(), Box::new(db));
        let out = ctx
            .execute(&Commands::Import {
                archive: archive_path,
                into: None,
            })
            .unwrap();
        assert_eq!(out, "Imported 4 nodes into /");
    }

    let db = SledNodeDb::open(&store, Collator::new("en")).unwrap();
    let ctx = CliContext::with_db(NodeDbConfig::default(), Box::new(db));
    let out = ctx.execute(&Commands::Stat).unwrap();
    assert!(out.contains("backend: sled"));
    assert!(out.contains("directories: 1"));
    assert!(out.contains("files: 3"));
}
