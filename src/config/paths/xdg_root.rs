//! XDG Base Directory locations for nodedb.

use std::path::PathBuf;

const APPLICATION: &str = "nodedb";

/// `$XDG_CONFIG_HOME/nodedb`
pub fn config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().join(APPLICATION))
}

/// `$XDG_DATA_HOME/nodedb`
pub fn data_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.data_dir().join(APPLICATION))
}

/// Global configuration file, `$XDG_CONFIG_HOME/nodedb/config.toml`
pub fn global_config_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Directory for the default log file
pub fn state_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APPLICATION).and_then(|dirs| {
        dirs.state_dir()
            .map(|dir| dir.to_path_buf())
            .or_else(|| Some(dirs.data_local_dir().to_path_buf()))
    })
}
