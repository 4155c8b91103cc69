//! Global config file source: `$XDG_CONFIG_HOME/duet/config.toml`, optional.

use crate::config::xdg;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use tracing::debug;

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let path = match xdg::global_config_path() {
        Ok(path) => path,
        Err(e) => {
            debug!(error = %e, "Skipping global config file");
            return Ok(builder);
        }
    };
    Ok(builder.add_source(File::from(path).format(FileFormat::Toml).required(false)))
}
