//! Service configuration file.
//!
//! `slod` reads `config.toml` from the platform config directory (or the
//! path given on the command line). Every key has a default, so a missing
//! file is equivalent to an empty one. `SLO_*` environment variables are
//! applied on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::env::{EnvError, EnvParser};
use super::source::{ConfigSource, Sourced};

/// Errors that can occur while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub diagnostics: DiagnosticsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// `bind:port` suitable for a socket listener.
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Where per-request diagnostics are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub directory: PathBuf,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("slo-diagnostics"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    /// Optional JSON log file in addition to console output.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl ServiceConfig {
    /// Default location of the configuration file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "slo-checker")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load the configuration file.
    ///
    /// An explicit path must exist. The default path is optional and falls
    /// back to built-in defaults when absent. The result is tagged with the
    /// file it was read from.
    pub fn load(path: Option<&Path>) -> Result<Sourced<Self>, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Sourced::default_value(Self::default())),
            },
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Sourced::from_file(Self::from_toml(&text, &path)?, &path)),
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Sourced::default_value(Self::default()))
            }
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    /// Apply `SLO_*` overrides and return the environment variables that
    /// took effect.
    pub fn apply_env(&mut self, parser: &mut EnvParser) -> Vec<String> {
        let mut applied = Vec::new();

        let bind = parser.get_string("BIND", &self.server.bind);
        let port = parser.get_u16_range("PORT", self.server.port, 1, u16::MAX);
        let enabled = parser.get_bool("DIAGNOSTICS_ENABLED", self.diagnostics.enabled);
        let directory = parser.get_path(
            "DIAGNOSTICS_DIR",
            &self.diagnostics.directory.to_string_lossy(),
        );
        let level = parser.get_log_level("LOG_LEVEL", &self.logging.level);
        let json = parser.get_bool("LOG_JSON", self.logging.json);

        self.server.bind = take(bind, &mut applied);
        self.server.port = take(port, &mut applied);
        self.diagnostics.enabled = take(enabled, &mut applied);
        self.diagnostics.directory = take(directory, &mut applied);
        self.logging.level = take(level, &mut applied);
        self.logging.json = take(json, &mut applied);

        applied
    }

    /// Load the file and apply environment overrides in one step.
    ///
    /// Invalid environment values are returned as warnings; the file or
    /// default value stays in effect for those keys.
    pub fn resolve(path: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
        let loaded = Self::load(path)?;
        let mut config = loaded.value;
        let mut parser = EnvParser::new();
        let env_applied = config.apply_env(&mut parser);
        Ok(ResolvedConfig {
            config,
            source: loaded.source,
            file: loaded.origin.map(PathBuf::from),
            env_applied,
            env_errors: parser.take_errors(),
        })
    }
}

/// Outcome of [`ServiceConfig::resolve`].
#[derive(Debug)]
pub struct ResolvedConfig {
    pub config: ServiceConfig,
    /// `File` when a configuration file was read, `Default` otherwise.
    pub source: ConfigSource,
    pub file: Option<PathBuf>,
    /// `SLO_*` variables that overrode a value.
    pub env_applied: Vec<String>,
    /// Variables that were set but could not be parsed.
    pub env_errors: Vec<EnvError>,
}

fn take<T>(sourced: Sourced<T>, applied: &mut Vec<String>) -> T {
    if sourced.is_from_env() {
        applied.extend(sourced.origin);
    }
    sourced.value
}
