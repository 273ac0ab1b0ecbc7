//! MergeService: orchestrates sources and deserializes to NodeDbConfig.

use crate::config::sources::{environment, global_file};
use crate::config::NodeDbConfig;
use config::{Config, ConfigError, File, FileFormat};
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from standard sources.
    /// Precedence: defaults (lowest) -> global file -> explicit file -> environment (highest).
    pub fn load(explicit: Option<&Path>) -> Result<NodeDbConfig, ConfigError> {
        let builder = Config::builder();
        let builder = global_file::add_to_builder(builder);
        let builder = match explicit {
            Some(path) => {
                builder.add_source(File::from(path).format(FileFormat::Toml).required(true))
            }
            None => builder,
        };
        let builder = environment::add_to_builder(builder);

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load a single file with only the environment overlay.
    pub fn load_from_file(path: &Path) -> Result<NodeDbConfig, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true));
        let builder = environment::add_to_builder(builder);

        let config = builder.build()?;
        config.try_deserialize()
    }
}
