//! Configuration
//!
//! Layered with the `config` crate. Precedence, lowest first: built-in defaults,
//! the global file `$XDG_CONFIG_HOME/nodedb/config.toml`, an explicit file passed
//! on the command line, and `NODEDB__SECTION__KEY` environment variables.

mod facade;
pub mod merge {
    pub mod service;
}
pub mod paths {
    pub mod xdg_root;
}
pub mod sources {
    pub mod environment;
    pub mod global_file;
}
mod storage;

pub use facade::ConfigLoader;
pub use paths::xdg_root as xdg;
pub use storage::{Backend, StorageConfig};

use crate::collation::{CaseFirst, Collator};
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeDbConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub collation: CollationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeDbConfig {
    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
    }
}

/// Name collation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollationConfig {
    /// Locale such as `en_US.UTF-8`; unset means the process locale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Override the locale's case ordering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_first: Option<CaseFirst>,
}

impl CollationConfig {
    pub fn collator(&self) -> Collator {
        let collator = match &self.locale {
            Some(locale) => Collator::new(locale),
            None => Collator::system(),
        };
        match self.case_first {
            Some(case_first) => collator.with_case_first(case_first),
            None => collator,
        }
    }
}
