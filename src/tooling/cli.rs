//! CLI Tooling
//!
//! Command-line access to a node store: browse listings, import and export
//! archives, and inspect the effective configuration.

use crate::config::{Backend, ConfigLoader, NodeDbConfig};
use crate::error::{ApiError, StorageError};
use crate::store::{open_node_db, NodeDb};
use crate::tree::archive;
use crate::tree::node::{DirectoryNode, Node};
use crate::types::SortType;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use std::path::{Path, PathBuf};
use tracing::info;

/// nodedb CLI - local metadata cache for cloud file storage
#[derive(Parser)]
#[command(name = "nodedb")]
#[command(about = "Browse and maintain a local node metadata cache")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Read only the --config file, not the global one
    #[arg(long, requires = "config")]
    pub no_global_config: bool,

    /// Store directory (overrides storage.path)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Storage backend (overrides storage.backend)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List a directory
    Ls {
        /// Directory path, `/` when omitted
        path: Option<String>,
        /// Storage order instead of name order
        #[arg(long)]
        unsorted: bool,
    },
    /// Replace a directory's contents with an archived subtree
    Import {
        /// Archive file produced by `export`
        archive: PathBuf,
        /// Target directory, `/` when omitted
        #[arg(long)]
        into: Option<String>,
    },
    /// Write a directory subtree as an archive to stdout
    Export {
        /// Directory path, `/` when omitted
        path: Option<String>,
    },
    /// Show store statistics
    Stat,
    /// Print the effective configuration
    Config,
}

/// CLI context for executing commands
pub struct CliContext {
    config: NodeDbConfig,
    db: Box<dyn NodeDb>,
}

impl CliContext {
    /// Load configuration, apply command line overrides and open the store.
    pub fn new(cli: &Cli) -> Result<Self, ApiError> {
        let config = Self::load_config(cli)?;
        let db = open_node_db(&config.storage, config.collation.collator())?;
        Ok(Self { config, db })
    }

    /// Effective configuration for `cli`, without opening the store.
    pub fn load_config(cli: &Cli) -> Result<NodeDbConfig, ApiError> {
        let mut config = match &cli.config {
            Some(path) if cli.no_global_config => ConfigLoader::load_from_file(path)?,
            Some(path) => ConfigLoader::load_with_file(path)?,
            None => ConfigLoader::load()?,
        };
        if let Some(store) = &cli.store {
            config.storage.path = Some(store.clone());
        }
        if let Some(backend) = cli.backend {
            config.storage.backend = backend;
        }
        Ok(config)
    }

    /// Wrap an already opened store.
    pub fn with_db(config: NodeDbConfig, db: Box<dyn NodeDb>) -> Self {
        Self { config, db }
    }

    pub fn node_db(&self) -> &dyn NodeDb {
        self.db.as_ref()
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let output = match command {
            Commands::Ls { path, unsorted } => {
                let sort_type = if *unsorted {
                    SortType::Unsorted
                } else {
                    SortType::ByName
                };
                self.list(path.as_deref().unwrap_or("/"), sort_type)?
            }
            Commands::Import { archive, into } => {
                self.import(archive, into.as_deref().unwrap_or("/"))?
            }
            Commands::Export { path } => self.export(path.as_deref().unwrap_or("/"))?,
            Commands::Stat => self.stat()?,
            Commands::Config => self.config.to_toml()?,
        };
        self.db.flush()?;
        Ok(output)
    }

    /// Follow `path` from the root one component at a time.
    pub fn resolve_directory(&self, path: &str) -> Result<DirectoryNode, ApiError> {
        let mut current = self.db.root_directory_node();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let cursor = self
                .db
                .cursor_for_directory(&current, SortType::ByName)?
                .ok_or_else(|| ApiError::PathNotFound(path.to_string()))?;
            let mut next = None;
            for node in cursor.iter() {
                if let Node::Directory(directory) = node? {
                    if directory.name == component {
                        next = Some(directory);
                        break;
                    }
                }
            }
            current = next.ok_or_else(|| ApiError::PathNotFound(path.to_string()))?;
        }
        Ok(current)
    }

    fn list(&self, path: &str, sort_type: SortType) -> Result<String, ApiError> {
        let directory = self.resolve_directory(path)?;
        let cursor = self
            .db
            .cursor_for_directory(&directory, sort_type)?
            .ok_or_else(|| ApiError::PathNotFound(path.to_string()))?;

        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Type", "Name", "Node ID", "Modified / Revision"]);
        for node in cursor.iter() {
            let node = node?;
            let id = node
                .node_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            let row = node.visit(
                |file| vec!["file".to_string(), file.name.clone(), id.clone(), format_mtime(file.mtime)],
                |dir| {
                    vec![
                        "dir".to_string(),
                        dir.name.clone(),
                        id.clone(),
                        format!("r{}", dir.listing_revision),
                    ]
                },
            );
            table.add_row(row);
        }
        Ok(format!(
            "{} ({} entries, revision {})\n{}",
            path,
            cursor.count(),
            cursor.directory_node().listing_revision,
            table
        ))
    }

    fn import(&self, archive_path: &Path, into: &str) -> Result<String, ApiError> {
        let bytes = std::fs::read(archive_path).map_err(StorageError::from)?;
        let children = match archive::decode(&bytes)? {
            Node::Directory(directory) => directory.children,
            Node::File(file) => vec![Node::File(file)],
        };
        let mut target = self.resolve_directory(into)?;
        let written = self.import_level(&mut target, children)?;
        info!(path = into, nodes = written, "Imported archive");
        Ok(format!("Imported {} nodes into {}", written, into))
    }

    /// Replace `target`'s listing, then recurse into each archived subdirectory.
    fn import_level(
        &self,
        target: &mut DirectoryNode,
        mut children: Vec<Node>,
    ) -> Result<usize, ApiError> {
        let nested: Vec<Option<Vec<Node>>> = children
            .iter_mut()
            .map(|child| match child {
                Node::Directory(directory) => Some(std::mem::take(&mut directory.children)),
                Node::File(_) => None,
            })
            .collect();
        self.db.replace_nodes_in_directory(target, children)?;

        let mut written = target.children.len();
        for (index, grandchildren) in nested.into_iter().enumerate() {
            let Some(grandchildren) = grandchildren else {
                continue;
            };
            if let Some(Node::Directory(directory)) = target.children.get(index) {
                let mut directory = directory.clone();
                written += self.import_level(&mut directory, grandchildren)?;
                target.children[index] = Node::Directory(directory);
            }
        }
        Ok(written)
    }

    fn export(&self, path: &str) -> Result<String, ApiError> {
        let directory = self.resolve_directory(path)?;
        let tree = self.load_subtree(&directory)?;
        let bytes = archive::encode(&Node::Directory(tree))?;
        String::from_utf8(bytes).map_err(|e| ApiError::ConfigError(e.to_string()))
    }

    /// Materialize the stored subtree under `directory`.
    pub fn load_subtree(&self, directory: &DirectoryNode) -> Result<DirectoryNode, ApiError> {
        let cursor = self
            .db
            .cursor_for_directory(directory, SortType::ByName)?
            .ok_or_else(|| ApiError::PathNotFound(directory.name.clone()))?;
        let mut loaded = cursor.directory_node().clone();
        for node in cursor.iter() {
            let node = match node? {
                Node::Directory(child) => Node::Directory(self.load_subtree(&child)?),
                file => file,
            };
            loaded.children.push(node);
        }
        Ok(loaded)
    }

    fn stat(&self) -> Result<String, ApiError> {
        let root = self.load_subtree(&self.db.root_directory_node())?;
        let (mut directories, mut files) = (0usize, 0usize);
        let mut pending = vec![&root];
        while let Some(directory) = pending.pop() {
            directory.enumerate_children(
                |_| files += 1,
                |_| directories += 1,
            );
            pending.extend(directory.children.iter().filter_map(Node::as_directory));
        }
        Ok(format!(
            "backend: {}\nroot revision: {}\ndirectories: {}\nfiles: {}",
            self.db.backend_name(),
            root.listing_revision,
            directories,
            files
        ))
    }
}

fn format_mtime(mtime: u64) -> String {
    i64::try_from(mtime)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| mtime.to_string())
}
