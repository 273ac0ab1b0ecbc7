//! Global file source: `$XDG_CONFIG_HOME/nodedb/config.toml`, optional

use crate::config::xdg;
use config::builder::DefaultState;
use config::{ConfigBuilder, File, FileFormat};

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    match xdg::global_config_file() {
        Some(path) => builder.add_source(File::from(path).format(FileFormat::Toml).required(false)),
        None => builder,
    }
}
