//! Command-line evaluation of efficiency SLOs.
#![forbid(unsafe_code)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use slo_efficiency::{
    Aggregation, EvaluationRequest, LogConfig, SloError, SloType, evaluate, init_logging, legacy,
};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "slo-efficiency", version, about = "Evaluate efficiency SLOs from benchmark telemetry")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a request file. Exit code 0: SLO met, 1: violated, 2: failed.
    Evaluate {
        /// Request JSON file, or `-` for stdin
        #[arg(short, long)]
        input: PathBuf,

        /// SLO type (`4`, `type4`); overrides `sloType` in the request
        #[arg(long)]
        slo_type: Option<SloType>,

        /// Input uses the benchmark-operator format (`results.first` stage triples)
        #[arg(long)]
        legacy: bool,

        /// Output format (json or pretty)
        #[arg(long, default_value = "json")]
        format: OutputFormat,
    },

    /// Apply one aggregation to a list of numbers
    Aggregate {
        /// Aggregation name, e.g. `mean`, `geomean`, `p99`
        name: String,

        #[arg(required = true, allow_hyphen_values = true)]
        values: Vec<f64>,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum OutputFormat {
    Json,
    Pretty,
}

const EXIT_VIOLATED: u8 = 1;
const EXIT_FAILED: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("warn").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = match init_logging(&log_config) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_FAILED);
        }
    };

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FAILED)
        }
    }
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Evaluate {
            input,
            slo_type,
            legacy,
            format,
        } => {
            let body = read_input(&input)?;
            let parsed = parse_request(&body, slo_type, legacy);
            let outcome = parsed.and_then(|request| evaluate(&request));

            let (output, code) = match outcome {
                Ok(evaluation) => {
                    info!(
                        slo_type = %evaluation.slo_type,
                        result = evaluation.result,
                        verdict = evaluation.verdict,
                        "evaluation finished"
                    );
                    let code = if evaluation.verdict {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::from(EXIT_VIOLATED)
                    };
                    (serde_json::to_value(&evaluation)?, code)
                }
                Err(e) => {
                    debug!(code = %e.code(), error = %e, "evaluation failed");
                    (error_body(&e), ExitCode::from(EXIT_FAILED))
                }
            };

            let rendered = match format {
                OutputFormat::Json => serde_json::to_string(&output)?,
                OutputFormat::Pretty => serde_json::to_string_pretty(&output)?,
            };
            println!("{rendered}");
            Ok(code)
        }
        Commands::Aggregate { name, values } => {
            let agg: Aggregation = name.parse()?;
            println!("{}", agg.apply(&values));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn read_input(path: &Path) -> Result<Value> {
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn parse_request(
    body: &Value,
    slo_type: Option<SloType>,
    legacy_format: bool,
) -> Result<EvaluationRequest, SloError> {
    match (legacy_format, slo_type) {
        (true, slo_type) => legacy::into_request(body, slo_type.unwrap_or(SloType::Type4)),
        (false, Some(slo_type)) => EvaluationRequest::from_json_as(body, slo_type),
        (false, None) => EvaluationRequest::from_json(body),
    }
}

fn error_body(error: &SloError) -> Value {
    json!({
        "code": error.code(),
        "error": error.to_string(),
    })
}
