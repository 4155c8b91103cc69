//! Logging System
//!
//! Structured logging with the `tracing` crate. Level, format and destination
//! come from the `[logging]` config section, CLI flags and `DUET_LOG*`
//! environment variables. Both agents log through the same subscriber and tag
//! their records with an `agent` field.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt as layer_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const ENV_FILTER: &str = "DUET_LOG";
const ENV_MODULES: &str = "DUET_LOG_MODULES";
const ENV_FORMAT: &str = "DUET_LOG_FORMAT";
const ENV_OUTPUT: &str = "DUET_LOG_OUTPUT";
const ENV_FILE: &str = "DUET_LOG_FILE";

/// Dependencies that are chatty at `info` and below
const QUIET_DEPENDENCIES: [&str; 3] = ["hyper", "reqwest", "sled"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ApiError::ConfigError(format!(
                "Invalid log format: {} (must be 'json' or 'text')",
                other
            ))),
        }
    }
}

/// Where records go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogOutput {
    #[serde(rename = "stdout")]
    Stdout,
    #[default]
    #[serde(rename = "stderr")]
    Stderr,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "file+stderr")]
    FileAndStderr,
    /// stdout and stderr
    #[serde(rename = "both")]
    Both,
}

impl LogOutput {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogOutput::Stdout => "stdout",
            LogOutput::Stderr => "stderr",
            LogOutput::File => "file",
            LogOutput::FileAndStderr => "file+stderr",
            LogOutput::Both => "both",
        }
    }

    fn writes_file(&self) -> bool {
        matches!(self, LogOutput::File | LogOutput::FileAndStderr)
    }
}

impl fmt::Display for LogOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogOutput {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            "file" => Ok(LogOutput::File),
            "file+stderr" => Ok(LogOutput::FileAndStderr),
            "both" => Ok(LogOutput::Both),
            other => Err(ApiError::ConfigError(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr', 'file', 'file+stderr', or 'both')",
                other
            ))),
        }
    }
}

/// `[logging]` config section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// trace, debug, info, warn, error, off
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Log file when output includes a file; platform state dir otherwise
    pub file: Option<PathBuf>,
    /// ANSI colors for text written to a terminal stream
    pub color: bool,
    /// Per-module levels, e.g. `"duet::arbiter" = "debug"`
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Text,
            output: LogOutput::Stderr,
            file: None,
            color: true,
            modules: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Apply command-line overrides on top of the loaded section
    pub fn with_overrides(
        mut self,
        level: Option<&str>,
        format: Option<&str>,
        output: Option<&str>,
        file: Option<PathBuf>,
    ) -> Result<Self, ApiError> {
        if let Some(level) = level {
            self.level = level.to_string();
        }
        if let Some(format) = format {
            self.format = format.parse()?;
        }
        if let Some(output) = output {
            self.output = output.parse()?;
        }
        if file.is_some() {
            self.file = file;
        }
        Ok(self)
    }

    /// Fold `DUET_LOG_FORMAT`, `DUET_LOG_OUTPUT` and `DUET_LOG_FILE` into the
    /// section. Environment wins over flags and files.
    fn with_env(mut self) -> Result<Self, ApiError> {
        if let Some(format) = non_empty_env(ENV_FORMAT) {
            self.format = format.parse()?;
        }
        if let Some(output) = non_empty_env(ENV_OUTPUT) {
            self.output = output.parse()?;
        }
        if let Some(file) = non_empty_env(ENV_FILE) {
            self.file = Some(PathBuf::from(file));
        }
        Ok(self)
    }

    /// Filter directives: the base level for duet, quieter dependencies, then
    /// per-module levels from config and `DUET_LOG_MODULES`.
    fn directives(&self) -> Vec<String> {
        if self.level == "off" {
            return vec!["off".to_string()];
        }
        let mut directives = vec![self.level.clone()];
        directives.extend(
            QUIET_DEPENDENCIES
                .iter()
                .map(|dep| format!("{}=warn", dep)),
        );
        directives.extend(
            self.modules
                .iter()
                .map(|(module, level)| format!("{}={}", module, level)),
        );
        // DUET_LOG_MODULES=duet::arbiter=debug,duet::gateway=trace
        if let Some(modules) = non_empty_env(ENV_MODULES) {
            directives.extend(
                modules
                    .split(',')
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(module, level)| format!("{}={}", module.trim(), level.trim())),
            );
        }
        directives
    }

    fn env_filter(&self) -> Result<EnvFilter, ApiError> {
        // A full DUET_LOG filter replaces everything else
        if let Ok(filter) = EnvFilter::try_from_env(ENV_FILTER) {
            return Ok(filter);
        }
        let mut directives = self.directives().into_iter();
        let mut filter = EnvFilter::new(directives.next().unwrap_or_default());
        for directive in directives {
            filter = filter.add_directive(directive.parse().map_err(|e| {
                ApiError::ConfigError(format!("Invalid log directive '{}': {}", directive, e))
            })?);
        }
        Ok(filter)
    }

    fn make_writer(&self) -> Result<BoxMakeWriter, ApiError> {
        let writer = match self.output {
            LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogOutput::Both => BoxMakeWriter::new(std::io::stdout.and(std::io::stderr)),
            LogOutput::File => BoxMakeWriter::new(open_log_file(&self.log_file_path()?)?),
            LogOutput::FileAndStderr => BoxMakeWriter::new(
                open_log_file(&self.log_file_path()?)?.and(std::io::stderr),
            ),
        };
        Ok(writer)
    }

    /// Configured file, else `duet.log` in the platform state directory
    pub fn log_file_path(&self) -> Result<PathBuf, ApiError> {
        match &self.file {
            Some(path) if !path.as_os_str().is_empty() => Ok(path.clone()),
            _ => default_log_file_path(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn default_log_file_path() -> Result<PathBuf, ApiError> {
    let project_dirs = directories::ProjectDirs::from("", "duet", "duet").ok_or_else(|| {
        ApiError::ConfigError("Could not determine platform state directory for log file".to_string())
    })?;
    // Only Linux has a state dir
    let dir = project_dirs
        .state_dir()
        .unwrap_or_else(|| project_dirs.data_local_dir());
    Ok(dir.join("duet.log"))
}

fn open_log_file(path: &Path) -> Result<Arc<std::fs::File>, ApiError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ApiError::ConfigError(format!("Failed to create log directory {}: {}", parent.display(), e))
        })?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ApiError::ConfigError(format!("Failed to open log file {}: {}", path.display(), e)))?;
    Ok(Arc::new(file))
}

/// Install the global subscriber.
///
/// Precedence, highest first: `DUET_LOG*` environment variables, CLI flags
/// (already folded in by [`LoggingConfig::with_overrides`]), the config file,
/// defaults. Fails if a subscriber is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ApiError> {
    let config = config.cloned().unwrap_or_default().with_env()?;
    let already = |e: tracing_subscriber::util::TryInitError| ApiError::ConfigError(format!("Logging already initialized: {}", e));

    if !config.enabled {
        return Registry::default()
            .with(EnvFilter::new("off"))
            .with(layer_fmt::layer().with_writer(std::io::sink))
            .try_init()
            .map_err(already);
    }

    let filter = config.env_filter()?;
    let writer = config.make_writer()?;
    let ansi = config.color && !config.output.writes_file();
    let subscriber = Registry::default().with(filter);

    match config.format {
        LogFormat::Json => subscriber
            .with(
                layer_fmt::layer()
                    .json()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init()
            .map_err(already),
        LogFormat::Text => subscriber
            .with(
                layer_fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .try_init()
            .map_err(already),
    }
}
