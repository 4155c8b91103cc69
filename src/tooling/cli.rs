//! CLI Tooling
//!
//! Command-line interface for running and inspecting the two agents.

use crate::admission::{AdmissionRegistry, SledAdmissionRegistry};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigLoader, DuetConfig};
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::runtime;
use crate::tooling::format::{format_pending_json, format_pending_text};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

/// Duet CLI - two-agent group moderation
#[derive(Parser, Debug)]
#[command(name = "duet")]
#[command(about = "Two cooperating moderation bots with timed join verification")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Resolve both agents and serve updates until Ctrl-C
    Run,
    /// List members pending verification in the persistent registry
    Pending {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the resolved configuration with tokens redacted
    Config {
        /// Output format (toml or json)
        #[arg(long, default_value = "toml")]
        format: String,
    },
}

/// CLI context holding the resolved configuration
pub struct CliContext {
    config: DuetConfig,
    config_path: Option<PathBuf>,
}

impl CliContext {
    /// Create a new CLI context
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load(config_path.as_deref())?;
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn from_config(config: DuetConfig) -> Self {
        Self {
            config,
            config_path: None,
        }
    }

    pub fn config(&self) -> &DuetConfig {
        &self.config
    }

    /// Logging settings with command-line overrides applied
    pub fn logging_config(&self, cli: &Cli) -> Result<LoggingConfig, ApiError> {
        self.config.logging.clone().with_overrides(
            cli.log_level.as_deref(),
            cli.log_format.as_deref(),
            cli.log_output.as_deref(),
            cli.log_file.clone(),
        )
    }

    /// Execute a CLI command
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Run => {
                info!(
                    config = ?self.config_path,
                    policy = ?self.config.arbitration.policy,
                    timeout_secs = self.config.admission.timeout_secs,
                    "Starting agents"
                );
                runtime::run(self.config.clone()).await?;
                Ok("Agents stopped.".to_string())
            }
            Commands::Pending { format } => self.list_pending(format),
            Commands::Config { format } => self.render_config(format),
        }
    }

    fn list_pending(&self, format: &str) -> Result<String, ApiError> {
        if self.config.storage.in_memory {
            return Err(ApiError::ConfigError(
                "storage.in_memory is set; there is no persistent registry to list".to_string(),
            ));
        }
        let path = self.config.storage.resolve_registry_path()?;
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "No admission registry at {}",
                path.display()
            )));
        }
        // sled holds an exclusive lock, so this fails while `duet run` is active
        let registry = SledAdmissionRegistry::open(&path)?;
        let entries = registry.list()?;
        let now_ms = SystemClock.now_ms();

        match format {
            "json" => serde_json::to_string_pretty(&format_pending_json(&entries, now_ms))
                .map_err(|e| ApiError::ConfigError(format!("Failed to render JSON: {}", e))),
            "text" => Ok(format_pending_text(&entries, now_ms)),
            other => Err(ApiError::ConfigError(format!(
                "Invalid format: {} (must be 'text' or 'json')",
                other
            ))),
        }
    }

    fn render_config(&self, format: &str) -> Result<String, ApiError> {
        let redacted = self.config.redacted();
        match format {
            "toml" => toml::to_string_pretty(&redacted)
                .map_err(|e| ApiError::ConfigError(format!("Failed to render TOML: {}", e))),
            "json" => serde_json::to_string_pretty(&redacted)
                .map_err(|e| ApiError::ConfigError(format!("Failed to render JSON: {}", e))),
            other => Err(ApiError::ConfigError(format!(
                "Invalid format: {} (must be 'toml' or 'json')",
                other
            ))),
        }
    }
}
