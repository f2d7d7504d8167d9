//! Tracing subscriber setup shared by the CLI and the daemon.
//!
//! Console output goes through a non-blocking writer; an optional JSON log
//! file can be attached for later inspection. The returned guards must be
//! held for the life of the process so buffered lines are flushed on exit.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::config::{EnvParser, LoggingConfig};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("failed to prepare log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Logging options.
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `slod=debug,tower=warn`.
    pub level: String,
    /// Write console output to stderr instead of stdout.
    pub stderr: bool,
    /// Emit console output as JSON lines.
    pub json: bool,
    /// Additional JSON log file.
    pub file: Option<PathBuf>,
}

impl LogConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            stderr: false,
            json: false,
            file: None,
        }
    }

    /// Build from `SLO_LOG_LEVEL`, then `RUST_LOG`, then `default_level`.
    /// `SLO_LOG_JSON` switches console output to JSON.
    pub fn from_env(default_level: &str) -> Self {
        let mut parser = EnvParser::new();
        let level = parser.get_log_level("LOG_LEVEL", default_level);
        let json = parser.get_bool("LOG_JSON", false).value;

        let level = if level.is_from_env() {
            level.value
        } else {
            std::env::var("RUST_LOG").unwrap_or(level.value)
        };

        Self {
            level,
            json,
            ..Self::new("")
        }
    }

    /// Build from the `[logging]` section of the service configuration.
    pub fn from_service(config: &LoggingConfig) -> Self {
        Self {
            file: config.file.clone(),
            ..Self::new(config.level.clone()).with_json(config.json)
        }
    }

    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        EnvFilter::try_new(&self.level).map_err(|e| LoggingError::InvalidFilter {
            filter: self.level.clone(),
            message: e.to_string(),
        })
    }
}

/// Flush guards for the non-blocking writers.
#[must_use = "dropping the guards stops log output"]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install the global tracing subscriber.
pub fn init_logging(config: &LogConfig) -> Result<LogGuards, LoggingError> {
    let filter = config.filter()?;
    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let (console, guard) = if config.stderr {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };
    guards.push(guard);
    layers.push(if config.json {
        fmt::layer().json().with_writer(console).boxed()
    } else {
        fmt::layer().with_target(true).with_writer(console).boxed()
    });

    if let Some(path) = &config.file {
        let appender = file_appender(path)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LogGuards { _guards: guards })
}

fn file_appender(path: &Path) -> Result<tracing_appender::rolling::RollingFileAppender, LoggingError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|source| LoggingError::Io {
        path: dir.clone(),
        source,
    })?;
    let file_name = path.file_name().ok_or_else(|| LoggingError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
    })?;
    Ok(tracing_appender::rolling::never(dir, file_name))
}
