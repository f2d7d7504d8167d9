//! Error catalog for SLO evaluation.
//!
//! Every failure inside the efficiency pipeline is terminal for the current
//! evaluation. A failed evaluation is reported as an error, never as a `false`
//! verdict, so "SLO not met" and "could not be evaluated" stay distinguishable.
//!
//! # Error Code Ranges
//!
//! | Range       | Category | Description                               |
//! |-------------|----------|-------------------------------------------|
//! | E001-E019   | Request  | Malformed metadata or payload structure   |
//! | E020-E039   | Data     | Telemetry that cannot be reduced          |
//! | E040-E059   | Numeric  | Results without a meaningful value        |

use std::fmt;

use thiserror::Error;

/// Errors raised while evaluating an efficiency SLO.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SloError {
    #[error("invalid aggregation name: '{0}'")]
    InvalidAggregationName(String),

    #[error("invalid operator: '{0}'")]
    InvalidOperator(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("unknown SLO type: '{0}'")]
    UnknownSloType(String),

    #[error("invalid warmup '{0}': expected non-negative seconds or a duration like \"30s\"")]
    InvalidWarmup(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("payload topology mismatch: expected {expected}, found {found}")]
    TopologyMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("value '{0}' is not numeric")]
    NonNumericValue(String),

    #[error("series contains no samples")]
    EmptySeries,

    #[error("no samples left after warmup of {warmup_secs}s (series spans {span_secs}s)")]
    EmptyAfterWarmup { warmup_secs: f64, span_secs: f64 },

    #[error("repetition count mismatch: {left} vs {right}")]
    RepetitionCountMismatch { left: usize, right: usize },

    #[error("no repetitions to aggregate")]
    NoRepetitions,

    #[error("workload kind mismatch: expected {expected}, found {found}")]
    WorkloadKindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("clock unit mismatch: consumption in {consumption}, workload log in {workload}")]
    ClockUnitMismatch {
        consumption: &'static str,
        workload: &'static str,
    },

    #[error("repetition {repetition} produced no positive efficiency ratios")]
    NoPositiveRatios { repetition: usize },

    #[error("{quantity} is not a finite number ({value})")]
    NonFiniteResult { quantity: String, value: f64 },
}

impl SloError {
    /// Stable identifier in the `SLO-Exxx` format.
    pub fn code(&self) -> ErrorCode {
        let n = match self {
            Self::InvalidAggregationName(_) => 1,
            Self::InvalidOperator(_) => 2,
            Self::MissingRequiredField(_) => 3,
            Self::UnknownSloType(_) => 4,
            Self::InvalidWarmup(_) => 5,
            Self::TopologyMismatch { .. } => 6,
            Self::MalformedPayload(_) => 8,
            Self::NonNumericValue(_) => 20,
            Self::EmptySeries => 21,
            Self::EmptyAfterWarmup { .. } => 22,
            Self::RepetitionCountMismatch { .. } => 23,
            Self::NoRepetitions => 24,
            Self::WorkloadKindMismatch { .. } => 25,
            Self::ClockUnitMismatch { .. } => 26,
            Self::NoPositiveRatios { .. } => 40,
            Self::NonFiniteResult { .. } => 41,
        };
        ErrorCode(n)
    }

    /// Whether the error stems from the request itself (metadata or payload
    /// structure) rather than from the telemetry values it carries.
    pub fn is_input_error(&self) -> bool {
        self.code().0 < 20
    }
}

/// Numeric error code rendered as `SLO-E0xx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u16);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SLO-E{:03}", self.0)
    }
}

impl serde::Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
