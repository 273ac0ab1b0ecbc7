//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::NodeDbConfig;
use crate::error::ApiError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the global file and environment.
    pub fn load() -> Result<NodeDbConfig, ApiError> {
        Ok(MergeService::load(None)?)
    }

    /// Load configuration with an explicit file layered over the global one.
    pub fn load_with_file(path: &Path) -> Result<NodeDbConfig, ApiError> {
        Ok(MergeService::load(Some(path))?)
    }

    /// Load a single file with only the environment overlay, skipping the global file.
    pub fn load_from_file(path: &Path) -> Result<NodeDbConfig, ApiError> {
        Ok(MergeService::load_from_file(path)?)
    }
}
