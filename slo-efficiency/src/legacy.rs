//! Adapter for the benchmark-operator wire format.
//!
//! The operator posts `results.first` as a list of stage triples per
//! repetition (baseline, idle, load), each stage carrying its stage name,
//! the consumption query results and the workload query results:
//!
//! ```text
//! { "first":  { "first": "baseline", "second": [PromResult], "third": [...] },
//!   "second": { "first": "idle", ... },
//!   "third":  { "first": "load", ... } }
//! ```
//!
//! `results.second` optionally carries a workload scalar measured by the
//! load generator. Which workload representation the third list holds is
//! decided by the SLO type, never by inspecting the data.

use serde::Deserialize;
use serde_json::Value;
use slo_common::{
    LogSeries, Metadata, RunResult, Sample, Series, SloError, Stage, StageData, StageGroup,
    WorkloadKind,
};
use tracing::trace;

use crate::evaluate::{EvaluationRequest, optional_number};
use crate::join::normalize_to_seconds;
use crate::slo_type::SloType;

/// One query result: a Prometheus range vector or a Loki stream.
#[derive(Debug, Clone, Deserialize)]
struct QueryResult {
    #[serde(default)]
    values: Vec<Sample>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StageEntry {
    #[serde(default)]
    first: Value,
    #[serde(default)]
    second: Vec<QueryResult>,
    #[serde(default)]
    third: Vec<QueryResult>,
}

#[derive(Debug, Clone, Deserialize)]
struct StageTriple {
    #[serde(default)]
    first: StageEntry,
    #[serde(default)]
    second: StageEntry,
    #[serde(default)]
    third: StageEntry,
}

impl StageTriple {
    fn entries(&self) -> [(Stage, &StageEntry); 3] {
        [
            (Stage::Baseline, &self.first),
            (Stage::Idle, &self.second),
            (Stage::Load, &self.third),
        ]
    }
}

fn field<'a>(value: &'a Value, key: &str, path: &str) -> Result<&'a Value, SloError> {
    match value.get(key) {
        Some(Value::Null) | None => Err(SloError::MissingRequiredField(path.to_string())),
        Some(v) => Ok(v),
    }
}

fn consumption_series(results: &[QueryResult]) -> Result<Option<Series>, SloError> {
    match results.first() {
        None => Ok(None),
        Some(result) => Series::new(result.values.clone()).map(Some),
    }
}

/// All streams merged, normalized to seconds and ordered by time.
fn raw_log(results: &[QueryResult]) -> LogSeries {
    let mut entries: Vec<Sample> = results
        .iter()
        .flat_map(|r| r.values.iter().cloned())
        .map(|mut s| {
            s.timestamp = normalize_to_seconds(s.timestamp);
            s
        })
        .collect();
    entries.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    LogSeries::Raw(entries)
}

fn stage_data(
    entry: &StageEntry,
    kind: Option<WorkloadKind>,
) -> Result<StageData, SloError> {
    let workload = match kind {
        Some(WorkloadKind::Raw) => Some(raw_log(&entry.third)),
        Some(WorkloadKind::PreAggregated) => {
            consumption_series(&entry.third)?.map(LogSeries::PreAggregated)
        }
        None => None,
    };
    Ok(StageData {
        consumption: consumption_series(&entry.second)?,
        workload,
    })
}

/// Convert the `results` object into a staged run.
pub fn run_result(results: &Value, slo_type: SloType) -> Result<RunResult, SloError> {
    let first = field(results, "first", "results.first")?;
    let triples: Vec<StageTriple> = serde_json::from_value(first.clone())
        .map_err(|e| SloError::MalformedPayload(format!("results.first: {e}")))?;

    let kind = slo_type.expected_workload_kind();
    let repetitions = triples
        .iter()
        .map(|triple| {
            let mut group = StageGroup::default();
            for (stage, entry) in triple.entries() {
                trace!(stage = %stage, name = %entry.first, "converting legacy stage");
                *group.stage_mut(stage) = stage_data(entry, kind)?;
            }
            Ok(group)
        })
        .collect::<Result<Vec<_>, SloError>>()?;

    Ok(RunResult::Staged { repetitions })
}

/// Convert a complete legacy request body.
pub fn into_request(body: &Value, slo_type: SloType) -> Result<EvaluationRequest, SloError> {
    let metadata = Metadata::from_json(field(body, "metadata", "metadata")?)?;
    let results = field(body, "results", "results")?;
    Ok(EvaluationRequest {
        slo_type,
        metadata,
        results: run_result(results, slo_type)?,
        workload_value: optional_number(results.get("second"))?,
    })
}
