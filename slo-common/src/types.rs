//! Telemetry data model shared by the evaluator, the CLI and the daemon.
//!
//! Everything here is request-scoped and immutable once constructed. Shapes
//! that the pipeline must never guess (staged vs. unstaged runs, raw vs.
//! pre-aggregated workload logs) carry explicit serde tags.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::SloError;

/// A sample value as delivered by the metric backend.
///
/// Prometheus encodes values as strings (`"12.5"`, `"NaN"`), log backends
/// deliver arbitrary line text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Number(f64),
    Text(String),
}

impl SampleValue {
    /// Coerce to a number, failing with [`SloError::NonNumericValue`].
    pub fn as_f64(&self) -> Result<f64, SloError> {
        match self {
            Self::Number(v) => Ok(*v),
            Self::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| SloError::NonNumericValue(s.clone())),
        }
    }
}

impl From<f64> for SampleValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for SampleValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Wire timestamp accepting both JSON numbers and numeric strings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamp(pub f64);

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(Self(v)),
            Repr::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Self)
                .map_err(|_| D::Error::custom(format!("invalid timestamp '{s}'"))),
        }
    }
}

/// One `(timestamp, value)` observation, encoded as a two element array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Timestamp, SampleValue)", into = "(f64, SampleValue)")]
pub struct Sample {
    pub timestamp: f64,
    pub value: SampleValue,
}

impl Sample {
    pub fn new(timestamp: f64, value: impl Into<SampleValue>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

impl From<(Timestamp, SampleValue)> for Sample {
    fn from((timestamp, value): (Timestamp, SampleValue)) -> Self {
        Self {
            timestamp: timestamp.0,
            value,
        }
    }
}

impl From<Sample> for (f64, SampleValue) {
    fn from(sample: Sample) -> Self {
        (sample.timestamp, sample.value)
    }
}

/// Non-empty, time-ordered result of one metric query for one stage of one
/// repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Sample>", into = "Vec<Sample>")]
pub struct Series(Vec<Sample>);

impl Series {
    /// Build a series, rejecting an empty sample list and timestamps that
    /// go backwards.
    pub fn new(samples: Vec<Sample>) -> Result<Self, SloError> {
        if samples.is_empty() {
            return Err(SloError::EmptySeries);
        }
        if let Some(i) = samples
            .windows(2)
            .position(|w| w[1].timestamp < w[0].timestamp)
        {
            return Err(SloError::MalformedPayload(format!(
                "series timestamps go backwards at sample {}: {} after {}",
                i + 1,
                samples[i + 1].timestamp,
                samples[i].timestamp
            )));
        }
        Ok(Self(samples))
    }

    /// Convenience constructor from numeric pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self, SloError> {
        Self::new(pairs.iter().map(|&(t, v)| Sample::new(t, v)).collect())
    }

    pub fn samples(&self) -> &[Sample] {
        &self.0
    }

    /// Reference point of the series: the first sample's timestamp.
    pub fn start(&self) -> f64 {
        self.0[0].timestamp
    }
}

impl TryFrom<Vec<Sample>> for Series {
    type Error = SloError;

    fn try_from(samples: Vec<Sample>) -> Result<Self, Self::Error> {
        Self::new(samples)
    }
}

impl From<Series> for Vec<Sample> {
    fn from(series: Series) -> Self {
        series.0
    }
}

/// Discriminator of a [`LogSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    Raw,
    PreAggregated,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::PreAggregated => "pre_aggregated",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workload telemetry of one stage of one repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum LogSeries {
    /// One entry per discrete event. May be empty: zero events is a count.
    Raw(Vec<Sample>),
    /// Already summarized values (e.g. a counter scraped at intervals).
    PreAggregated(Series),
}

impl LogSeries {
    pub fn kind(&self) -> WorkloadKind {
        match self {
            Self::Raw(_) => WorkloadKind::Raw,
            Self::PreAggregated(_) => WorkloadKind::PreAggregated,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        match self {
            Self::Raw(entries) => entries,
            Self::PreAggregated(series) => series.samples(),
        }
    }
}

/// Experiment stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Baseline,
    Idle,
    Load,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Baseline, Stage::Idle, Stage::Load];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Idle => "idle",
            Self::Load => "load",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data captured for one stage of one repetition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumption: Option<Series>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<LogSeries>,
}

/// One repetition of a staged run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageGroup {
    #[serde(default)]
    pub baseline: StageData,
    #[serde(default)]
    pub idle: StageData,
    #[serde(default)]
    pub load: StageData,
}

impl StageGroup {
    pub fn stage(&self, stage: Stage) -> &StageData {
        match stage {
            Stage::Baseline => &self.baseline,
            Stage::Idle => &self.idle,
            Stage::Load => &self.load,
        }
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageData {
        match stage {
            Stage::Baseline => &mut self.baseline,
            Stage::Idle => &mut self.idle,
            Stage::Load => &mut self.load,
        }
    }
}

/// Telemetry of a whole benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topology", rename_all = "snake_case")]
pub enum RunResult {
    /// One stage triple per repetition.
    Staged { repetitions: Vec<StageGroup> },
    /// Load-stage data only, as parallel per-repetition sequences.
    Unstaged {
        consumption: Vec<Series>,
        #[serde(default)]
        workload: Vec<LogSeries>,
    },
}

impl RunResult {
    pub fn topology(&self) -> &'static str {
        match self {
            Self::Staged { .. } => "staged",
            Self::Unstaged { .. } => "unstaged",
        }
    }

    /// Consumption series of `stage`, one per repetition.
    pub fn consumption(&self, stage: Stage) -> Result<Vec<&Series>, SloError> {
        match self {
            Self::Staged { repetitions } => repetitions
                .iter()
                .enumerate()
                .map(|(i, rep)| {
                    rep.stage(stage).consumption.as_ref().ok_or_else(|| {
                        SloError::MissingRequiredField(format!(
                            "results.repetitions[{i}].{stage}.consumption"
                        ))
                    })
                })
                .collect(),
            Self::Unstaged { consumption, .. } => {
                self.require_load(stage)?;
                Ok(consumption.iter().collect())
            }
        }
    }

    /// Workload logs of `stage`, one per repetition.
    pub fn workload(&self, stage: Stage) -> Result<Vec<&LogSeries>, SloError> {
        match self {
            Self::Staged { repetitions } => repetitions
                .iter()
                .enumerate()
                .map(|(i, rep)| {
                    rep.stage(stage).workload.as_ref().ok_or_else(|| {
                        SloError::MissingRequiredField(format!(
                            "results.repetitions[{i}].{stage}.workload"
                        ))
                    })
                })
                .collect(),
            Self::Unstaged {
                consumption,
                workload,
            } => {
                self.require_load(stage)?;
                if workload.is_empty() {
                    return Err(SloError::MissingRequiredField("results.workload".to_string()));
                }
                // Parallel sequences: entry i of both belongs to repetition i.
                if consumption.len() != workload.len() {
                    return Err(SloError::RepetitionCountMismatch {
                        left: consumption.len(),
                        right: workload.len(),
                    });
                }
                Ok(workload.iter().collect())
            }
        }
    }

    fn require_load(&self, stage: Stage) -> Result<(), SloError> {
        if stage == Stage::Load {
            Ok(())
        } else {
            Err(SloError::TopologyMismatch {
                expected: "staged",
                found: self.topology(),
            })
        }
    }
}

/// Threshold comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Operator {
    Lt,
    Lte,
    Gt,
    Gte,
    /// Always passes. Used by test fixtures.
    True,
    /// Always fails. Used by test fixtures.
    False,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::True => "true",
            Self::False => "false",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = SloError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "true" => Ok(Self::True),
            "false" => Ok(Self::False),
            other => Err(SloError::InvalidOperator(other.to_string())),
        }
    }
}

impl TryFrom<String> for Operator {
    type Error = SloError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Join policy of the timestamp-join engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Sum events per matched consumption timestamp, one ratio per timestamp.
    #[default]
    EventCount,
    /// One ratio per event.
    PerEvent,
}

/// Evaluation parameters sent alongside the telemetry.
///
/// Aggregation names stay unresolved strings here; the evaluator resolves
/// them once per call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Value")]
pub struct Metadata {
    #[serde(serialize_with = "serialize_warmup")]
    pub warmup: Duration,
    pub query_aggregation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_aggregation: Option<String>,
    pub repetition_aggregation: String,
    pub operator: Operator,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_mode: Option<JoinMode>,
}

impl Metadata {
    /// Parse metadata from a JSON object.
    ///
    /// Values may be JSON numbers or strings, since upstream producers
    /// stringify everything. Absent keys fail with
    /// [`SloError::MissingRequiredField`].
    pub fn from_json(value: &Value) -> Result<Self, SloError> {
        let map = value
            .as_object()
            .ok_or_else(|| SloError::MissingRequiredField("metadata".to_string()))?;

        let warmup = parse_warmup(required(map, "warmup")?)?;
        let query_aggregation = string_field(map, "queryAggregation")?;
        let workload_aggregation = match map.get("workloadAggregation") {
            Some(Value::Null) | None => None,
            Some(_) => Some(string_field(map, "workloadAggregation")?),
        };
        let repetition_aggregation = string_field(map, "repetitionAggregation")?;
        let operator = string_field(map, "operator")?.parse()?;
        let threshold = number_field(map, "threshold")?;
        let join_mode = match map.get("joinMode") {
            Some(Value::Null) | None => None,
            Some(v) => Some(
                serde_json::from_value(v.clone()).map_err(|_| {
                    SloError::MalformedPayload(format!(
                        "metadata.joinMode: expected \"event_count\" or \"per_event\", got {v}"
                    ))
                })?,
            ),
        };

        Ok(Self {
            warmup,
            query_aggregation,
            workload_aggregation,
            repetition_aggregation,
            operator,
            threshold,
            join_mode,
        })
    }

    /// Aggregation applied to workload metrics; falls back to the query
    /// aggregation when not given.
    pub fn workload_aggregation(&self) -> &str {
        self.workload_aggregation
            .as_deref()
            .unwrap_or(&self.query_aggregation)
    }
}

impl TryFrom<Value> for Metadata {
    type Error = SloError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

fn required<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a Value, SloError> {
    match map.get(key) {
        Some(Value::Null) | None => Err(SloError::MissingRequiredField(format!("metadata.{key}"))),
        Some(v) => Ok(v),
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Result<String, SloError> {
    match required(map, key)? {
        Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

fn number_field(map: &Map<String, Value>, key: &str) -> Result<f64, SloError> {
    let value = match required(map, key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(SloError::NonNumericValue(format!(
            "metadata.{key}={}",
            map[key]
        ))),
    }
}

/// Parse a warmup given as seconds (number or numeric string) or as a
/// humantime duration string.
pub fn parse_warmup(value: &Value) -> Result<Duration, SloError> {
    let invalid = || SloError::InvalidWarmup(value.to_string());
    let secs = match value {
        Value::Number(n) => n.as_f64().ok_or_else(invalid)?,
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(v) => v,
            Err(_) => return humantime::parse_duration(s.trim()).map_err(|_| invalid()),
        },
        _ => return Err(invalid()),
    };
    if !secs.is_finite() || secs < 0.0 {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}

fn serialize_warmup<S: serde::Serializer>(warmup: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(warmup.as_secs_f64())
}
