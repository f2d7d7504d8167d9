//! Efficiency SLO checker - HTTP daemon
//!
//! Answers SLO evaluation requests from the benchmark operator and native
//! clients, exports Prometheus metrics and keeps a diagnostics record for
//! every request.

#![forbid(unsafe_code)]

mod http_api;
mod metrics;
mod sink;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use slo_common::{LogConfig, ServiceConfig, init_logging};
use tracing::{info, warn};

use http_api::HttpState;
use metrics::Metrics;
use sink::DiagnosticsSink;

#[derive(Parser)]
#[command(name = "slod")]
#[command(author, version, about = "Efficiency SLO evaluation daemon")]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(short, long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for per-request diagnostics records
    #[arg(long)]
    diagnostics_dir: Option<PathBuf>,

    /// Do not write diagnostics records
    #[arg(long)]
    no_diagnostics: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolved = ServiceConfig::resolve(cli.config.as_deref())
        .context("failed to load configuration")?;
    let mut config = resolved.config;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(dir) = cli.diagnostics_dir {
        config.diagnostics.directory = dir;
    }
    if cli.no_diagnostics {
        config.diagnostics.enabled = false;
    }

    let mut log_config = LogConfig::from_service(&config.logging);
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config).context("failed to initialize logging")?;

    match &resolved.file {
        Some(path) => info!(source = %resolved.source, path = %path.display(), "configuration loaded"),
        None => info!(source = %resolved.source, "no configuration file, using defaults"),
    }
    if !resolved.env_applied.is_empty() {
        info!(vars = ?resolved.env_applied, "environment overrides applied");
    }
    // Invalid variables fall back to the file value; report them once logging is up.
    for error in &resolved.env_errors {
        warn!(error = %error, "ignoring invalid environment variable");
    }

    info!(
        "Starting slod v{} on {}",
        env!("CARGO_PKG_VERSION"),
        config.server.address()
    );
    if config.diagnostics.enabled {
        info!(
            directory = %config.diagnostics.directory.display(),
            "diagnostics records enabled"
        );
    }

    let state = HttpState {
        version: env!("CARGO_PKG_VERSION"),
        started_at: Instant::now(),
        pid: std::process::id(),
        metrics: Metrics::new().context("failed to register metrics")?,
        sink: DiagnosticsSink::new(&config.diagnostics),
    };

    http_api::start_server(config.server.address(), state)
        .await
        .context("HTTP server task panicked")?
        .with_context(|| format!("HTTP server on {} failed", config.server.address()))?;

    info!("slod stopped");
    Ok(())
}
