//! XDG Base Directory utilities for duet's config and data.

use crate::error::ApiError;
use std::path::PathBuf;

/// Get XDG config home directory
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise defaults to `$HOME/.config`
pub fn config_home() -> Result<PathBuf, ApiError> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg_config_home.is_empty() {
            return Ok(PathBuf::from(xdg_config_home));
        }
    }

    let home = std::env::var("HOME").map_err(|_| {
        ApiError::ConfigError(
            "Could not determine XDG config home directory (HOME not set)".to_string(),
        )
    })?;

    Ok(PathBuf::from(home).join(".config"))
}

/// Global config file: `$XDG_CONFIG_HOME/duet/config.toml`
pub fn global_config_path() -> Result<PathBuf, ApiError> {
    Ok(config_home()?.join("duet").join("config.toml"))
}

/// Default sled directory for the admission registry, under the platform data dir
pub fn default_registry_path() -> Result<PathBuf, ApiError> {
    let project_dirs = directories::ProjectDirs::from("", "duet", "duet").ok_or_else(|| {
        ApiError::ConfigError(
            "Could not determine platform data directory for the admission registry".to_string(),
        )
    })?;
    Ok(project_dirs.data_dir().join("registry"))
}
