//! Logging System
//!
//! Structured logging through `tracing`. Engines emit events; the binary decides
//! where they go. Level, format and destination come from configuration and can
//! be overridden with `NODEDB_LOG`, `NODEDB_LOG_FORMAT`, `NODEDB_LOG_OUTPUT` and
//! `NODEDB_LOG_FILE`.

use crate::config::xdg;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};
use tracing_subscriber::{EnvFilter, Registry};

const ENV_FILTER: &str = "NODEDB_LOG";
const ENV_FORMAT: &str = "NODEDB_LOG_FORMAT";
const ENV_OUTPUT: &str = "NODEDB_LOG_OUTPUT";
const ENV_FILE: &str = "NODEDB_LOG_FILE";

/// Event rendering
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

/// Where events are written
///
/// stdout carries command output (`export` writes an archive there), so the
/// default is stderr.
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
    #[serde(rename = "both")]
    Both,
}

impl LogOutput {
    fn writes_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::FileAndStderr)
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

impl fmt::Display for LogOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogOutput::Stdout => "stdout",
            LogOutput::Stderr => "stderr",
            LogOutput::File => "file",
            LogOutput::FileAndStderr => "file+stderr",
            LogOutput::Both => "both",
        })
    }
}

/// `[logging]` configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Whether logging is enabled (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base level or filter directive: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file when output includes a file; unset means `<state dir>/nodedb.log`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// ANSI colors for text output on a terminal stream
    #[serde(default = "default_true")]
    pub color: bool,

    /// Per-target levels, e.g. `"nodedb::store" = "debug"`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub modules: BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file: None,
            color: true,
            modules: BTreeMap::new(),
        }
    }
}

/// Log file location: explicit path, then `NODEDB_LOG_FILE`, then the state directory.
pub fn resolve_log_file_path(configured: Option<PathBuf>) -> Result<PathBuf, ApiError> {
    if let Some(path) = configured.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(path);
    }
    if let Some(path) = std::env::var_os(ENV_FILE).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let state_dir = xdg::state_dir().ok_or_else(|| {
        ApiError::ConfigError("Could not determine platform state directory for log file".into())
    })?;
    Ok(state_dir.join("nodedb.log"))
}

/// Install the global subscriber.
///
/// Environment variables win over `config`, which wins over defaults. Fails if a
/// subscriber is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ApiError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);
    let installed = if !config.enabled {
        Registry::default().with(EnvFilter::new("off")).try_init()
    } else {
        let filter = build_env_filter(config)?;
        let format = env_override(ENV_FORMAT)?.unwrap_or(config.format);
        let output = env_override(ENV_OUTPUT)?.unwrap_or(config.output);
        let writer = build_writer(output, config.file.clone())?;
        let ansi = config.color && !output.writes_file() && format == LogFormat::Text;

        let layer = tracing_fmt::layer()
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(ansi)
            .with_writer(writer);
        let registry = Registry::default().with(filter);
        match format {
            LogFormat::Json => registry.with(layer.json()).try_init(),
            LogFormat::Text => registry.with(layer).try_init(),
        }
    };
    installed.map_err(|e| ApiError::ConfigError(format!("Failed to install logger: {}", e)))
}

fn env_override<T: FromStr<Err = ApiError>>(var: &str) -> Result<Option<T>, ApiError> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => value.parse().map(Some),
        _ => Ok(None),
    }
}

fn build_writer(output: LogOutput, configured: Option<PathBuf>) -> Result<BoxMakeWriter, ApiError> {
    let open_file = || -> Result<std::sync::Mutex<std::fs::File>, ApiError> {
        let path = resolve_log_file_path(configured.clone())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ApiError::ConfigError(format!("Failed to create log directory: {}", e))
            })?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map(std::sync::Mutex::new)
            .map_err(|e| {
                ApiError::ConfigError(format!("Failed to open log file {:?}: {}", path, e))
            })
    };

    Ok(match output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::Both => BoxMakeWriter::new(std::io::stdout.and(std::io::stderr)),
        LogOutput::File => BoxMakeWriter::new(open_file()?),
        LogOutput::FileAndStderr => BoxMakeWriter::new(open_file()?.and(std::io::stderr)),
    })
}

/// `NODEDB_LOG` if set, otherwise the configured level plus per-module directives.
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, ApiError> {
    if let Ok(filter) = EnvFilter::try_from_env(ENV_FILTER) {
        return Ok(filter);
    }
    let mut filter = EnvFilter::new(&config.level);
    if config.level == "off" {
        return Ok(filter);
    }
    for (module, level) in &config.modules {
        let directive = format!("{}={}", module, level)
            .parse()
            .map_err(|e| ApiError::ConfigError(format!("Invalid log directive: {}", e)))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}
