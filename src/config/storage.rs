//! StorageConfig and store path resolution.

use crate::config::xdg;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Embedded engine behind the NodeDB contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sled,
    Memory,
    Sqlite,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Sled => "sled",
            Backend::Memory => "memory",
            Backend::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

fn default_cache_capacity_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_flush_every_ms() -> Option<u64> {
    Some(500)
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Store directory; unset means `$XDG_DATA_HOME/nodedb/store`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// sled page cache size
    #[serde(default = "default_cache_capacity_bytes")]
    pub cache_capacity_bytes: u64,

    /// sled background flush interval; unset disables periodic flushing
    #[serde(default = "default_flush_every_ms")]
    pub flush_every_ms: Option<u64>,
}

impl StorageConfig {
    /// Configured store directory, or the platform default.
    pub fn store_path(&self) -> Option<PathBuf> {
        match &self.path {
            Some(path) if !path.as_os_str().is_empty() => Some(path.clone()),
            _ => xdg::data_dir().map(|dir| dir.join("store")),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: None,
            cache_capacity_bytes: default_cache_capacity_bytes(),
            flush_every_ms: default_flush_every_ms(),
        }
    }
}
