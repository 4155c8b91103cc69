//! Built-in defaults, the lowest layer of every merge.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("admission.timeout_secs", 60)?
        .set_default("admission.grace_ms", 1000)?
        .set_default("arbitration.policy", "independent")?
        .set_default("arbitration.epoch", 0)?
        .set_default("moderation.anti_link", true)?
        .set_default("storage.in_memory", false)
}
