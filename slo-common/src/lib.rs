//! Shared foundation for the efficiency SLO checker.
//!
//! This crate contains the telemetry data model, the error catalog,
//! service configuration and logging setup used by both the
//! `slo-efficiency` evaluator and the `slod` daemon.

pub mod config;
pub mod errors;
pub mod logging;
pub mod types;

pub use config::{
    ConfigError, ConfigSource, EnvError, EnvParser, ResolvedConfig, ServiceConfig, Sourced,
};
pub use errors::{ErrorCode, SloError};
pub use logging::{LogConfig, LogGuards, LoggingError, init_logging};
pub use types::{
    JoinMode, LogSeries, Metadata, Operator, RunResult, Sample, SampleValue, Series, Stage,
    StageData, StageGroup, WorkloadKind, parse_warmup,
};
