//! Per-request diagnostics records.
//!
//! Each evaluation writes one JSON file named after its request id, so
//! concurrent requests never share a file. Writing is best-effort: the
//! caller logs failures and the HTTP response is unaffected.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use slo_common::config::DiagnosticsConfig;
use slo_efficiency::Diagnostics;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write diagnostics to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize diagnostics: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything known about one request once it has been answered.
#[derive(Debug, Serialize)]
pub struct DiagnosticsRecord<'a> {
    pub request_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub route: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slo_type: Option<u8>,
    pub outcome: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<&'a Diagnostics>,
    /// The request body as received, or `null` when it was not JSON.
    pub request: &'a Value,
}

#[derive(Debug, Clone)]
pub struct DiagnosticsSink {
    enabled: bool,
    directory: PathBuf,
}

impl DiagnosticsSink {
    pub fn new(config: &DiagnosticsConfig) -> Self {
        Self {
            enabled: config.enabled,
            directory: config.directory.clone(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path_for(&self, request_id: &Uuid) -> PathBuf {
        self.directory.join(format!("{request_id}.json"))
    }

    /// Persist a record. Returns the written path, or `None` when disabled.
    pub async fn write(&self, record: &DiagnosticsRecord<'_>) -> Result<Option<PathBuf>, SinkError> {
        if !self.enabled {
            return Ok(None);
        }

        let path = self.path_for(&record.request_id);
        let bytes = serde_json::to_vec_pretty(record)?;

        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| SinkError::Io {
                path: self.directory.clone(),
                source,
            })?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;

        debug!(request_id = %record.request_id, path = %path.display(), "diagnostics written");
        Ok(Some(path))
    }
}
