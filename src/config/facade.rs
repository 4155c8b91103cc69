//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::DuetConfig;
use crate::error::ApiError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from files and environment.
    pub fn load(explicit: Option<&Path>) -> Result<DuetConfig, ApiError> {
        Ok(MergeService::load(explicit)?)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<DuetConfig, ApiError> {
        Ok(MergeService::load_from_file(path)?)
    }

    /// Load and validate; what the agents need before starting.
    pub fn load_validated(explicit: Option<&Path>) -> Result<DuetConfig, ApiError> {
        let config = Self::load(explicit)?;
        config.validate()?;
        Ok(config)
    }

    /// Create default configuration.
    pub fn default() -> DuetConfig {
        DuetConfig::default()
    }
}
