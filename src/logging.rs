//! Logging System
//!
//! Structured logging through `tracing`. Level, format and destination come
//! from [`LoggingConfig`], overridable by `TREEFS_LOG`, `TREEFS_LOG_FORMAT`,
//! `TREEFS_LOG_OUTPUT` and `TREEFS_LOG_MODULES`.

use crate::error::FsError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    #[default]
    Stderr,
    File,
}

impl FromStr for LogFormat {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, FsError> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(FsError::Config(format!(
                "Invalid log format: {} (must be 'json' or 'text')",
                other
            ))),
        }
    }
}

impl FromStr for LogOutput {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, FsError> {
        match s {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            "file" => Ok(LogOutput::File),
            other => Err(FsError::Config(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr' or 'file')",
                other
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error or off
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Log file, used when `output` is `file`
    pub file: PathBuf,
    /// ANSI colors for text output on a terminal stream
    pub color: bool,
    /// Per-module level overrides, e.g. `treefs::tree = "trace"`
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file: PathBuf::from(".treefs/treefs.log"),
            color: true,
            modules: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Apply `TREEFS_LOG_FORMAT` / `TREEFS_LOG_OUTPUT` over the configured values.
    fn with_env_overrides(mut self) -> Result<Self, FsError> {
        if let Ok(format) = std::env::var("TREEFS_LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Ok(output) = std::env::var("TREEFS_LOG_OUTPUT") {
            self.output = output.parse()?;
        }
        Ok(self)
    }

    fn writer(&self) -> Result<BoxMakeWriter, FsError> {
        Ok(match self.output {
            LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogOutput::File => {
                if let Some(parent) = self.file.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| FsError::Config(format!("Failed to create log directory: {}", e)))?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.file)
                    .map_err(|e| FsError::Config(format!("Failed to open log file {:?}: {}", self.file, e)))?;
                BoxMakeWriter::new(Mutex::new(file))
            }
        })
    }
}

/// Install the global subscriber.
///
/// Environment variables win over the configuration, which wins over the
/// defaults. A second call is not an error; the first subscriber stays.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), FsError> {
    let config = config.cloned().unwrap_or_default().with_env_overrides()?;
    let filter = build_env_filter(&config)?;
    let writer = config.writer()?;
    let ansi = config.color && config.output != LogOutput::File;

    let registry = Registry::default().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .try_init(),
    };
    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
    Ok(())
}

fn directive(module: &str, level: &str) -> Result<tracing_subscriber::filter::Directive, FsError> {
    format!("{}={}", module.trim(), level.trim())
        .parse()
        .map_err(|e| FsError::Config(format!("Invalid log directive for {}: {}", module, e)))
}

/// `TREEFS_LOG` replaces the filter outright; otherwise start from the
/// configured level and layer module overrides from config and
/// `TREEFS_LOG_MODULES` (`module=level,module=level`).
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, FsError> {
    if let Ok(filter) = EnvFilter::try_from_env("TREEFS_LOG") {
        return Ok(filter);
    }
    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(&config.level);
    for (module, level) in &config.modules {
        filter = filter.add_directive(directive(module, level)?);
    }
    if let Ok(spec) = std::env::var("TREEFS_LOG_MODULES") {
        for pair in spec.split(',') {
            if let Some((module, level)) = pair.split_once('=') {
                filter = filter.add_directive(directive(module, level)?);
            }
        }
    }
    Ok(filter)
}
