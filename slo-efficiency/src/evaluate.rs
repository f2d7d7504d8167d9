//! Evaluation of one efficiency SLO request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use slo_common::{LogSeries, Metadata, RunResult, SloError, Stage, WorkloadKind};
use tracing::debug;

use crate::aggregate::resolve;
use crate::compare;
use crate::consumption::{Computed, ReduceParams, compute, compute_staged};
use crate::diagnostics::Diagnostics;
use crate::join::join_efficiency;
use crate::logcount::{compute_logs, compute_logs_staged};
use crate::slo_type::{EvaluationPlan, Quantity, SloType};

/// A complete evaluation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    pub slo_type: SloType,
    pub metadata: Metadata,
    pub results: RunResult,
    /// Workload scalar for types that do not derive it from telemetry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_value: Option<f64>,
}

impl EvaluationRequest {
    /// Parse a request object, keeping typed errors for every field.
    pub fn from_json(value: &Value) -> Result<Self, SloError> {
        let slo_type = match value.get("sloType") {
            None | Some(Value::Null) => {
                return Err(SloError::MissingRequiredField("sloType".to_string()));
            }
            Some(Value::String(s)) => s.parse()?,
            Some(other) => other
                .as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .and_then(SloType::from_number)
                .ok_or_else(|| SloError::UnknownSloType(other.to_string()))?,
        };
        Self::from_json_as(value, slo_type)
    }

    /// Parse a request object, taking the SLO type from the caller.
    pub fn from_json_as(value: &Value, slo_type: SloType) -> Result<Self, SloError> {
        let metadata = match value.get("metadata") {
            None | Some(Value::Null) => {
                return Err(SloError::MissingRequiredField("metadata".to_string()));
            }
            Some(m) => Metadata::from_json(m)?,
        };
        let results = match value.get("results") {
            None | Some(Value::Null) => {
                return Err(SloError::MissingRequiredField("results".to_string()));
            }
            Some(r) => serde_json::from_value(r.clone())
                .map_err(|e| SloError::MalformedPayload(format!("results: {e}")))?,
        };
        Ok(Self {
            slo_type,
            metadata,
            results,
            workload_value: optional_number(value.get("workloadValue"))?,
        })
    }
}

/// A JSON number or numeric string; absent and `null` map to `None`.
pub(crate) fn optional_number(value: Option<&Value>) -> Result<Option<f64>, SloError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| SloError::NonNumericValue(s.clone())),
        Some(other) => Err(SloError::NonNumericValue(other.to_string())),
    }
}

/// Outcome of a successful evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub slo_type: SloType,
    /// `true` when the SLO is met.
    pub verdict: bool,
    /// Value compared against the threshold.
    pub result: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numerator: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denominator: Option<f64>,
    pub diagnostics: Diagnostics,
}

/// Aggregations resolved once from the request metadata.
struct Settings {
    query: ReduceParams,
    workload: ReduceParams,
}

impl Settings {
    fn from_metadata(metadata: &Metadata) -> Result<Self, SloError> {
        let sample = resolve(&metadata.query_aggregation)?;
        let workload_sample = resolve(metadata.workload_aggregation())?;
        let repetition = resolve(&metadata.repetition_aggregation)?;
        Ok(Self {
            query: ReduceParams {
                warmup: metadata.warmup,
                sample,
                repetition,
            },
            workload: ReduceParams {
                warmup: metadata.warmup,
                sample: workload_sample,
                repetition,
            },
        })
    }
}

struct Evaluator<'a> {
    slo_type: SloType,
    results: &'a RunResult,
    workload_value: Option<f64>,
    settings: Settings,
    diagnostics: Diagnostics,
}

impl<'a> Evaluator<'a> {
    fn workload(&self, stage: Stage) -> Result<Vec<&'a LogSeries>, SloError> {
        let logs = self.results.workload(stage)?;
        if let Some(expected) = self.slo_type.expected_workload_kind()
            && let Some(other) = logs.iter().find(|l| l.kind() != expected)
        {
            return Err(SloError::WorkloadKindMismatch {
                expected: expected.as_str(),
                found: other.kind().as_str(),
            });
        }
        Ok(logs)
    }

    fn record(&mut self, prefix: &str, base_stage: Stage, load_stage: Stage, computed: &Computed) {
        self.diagnostics
            .computed(prefix, base_stage.as_str(), load_stage.as_str(), computed);
    }

    fn quantity(&mut self, quantity: Quantity) -> Result<f64, SloError> {
        match quantity {
            Quantity::Consumption { of, base } => {
                let load = self.results.consumption(of)?;
                let computed = match base {
                    Some(base_stage) => {
                        let base = self.results.consumption(base_stage)?;
                        compute_staged(&base, &load, &self.settings.query)?
                    }
                    None => compute(&load, &self.settings.query)?,
                };
                self.record("consumption", base.unwrap_or(Stage::Baseline), of, &computed);
                Ok(computed.value)
            }
            Quantity::Workload { staged } => {
                let load = self.workload(Stage::Load)?;
                let computed = if staged {
                    let idle = self.workload(Stage::Idle)?;
                    compute_logs_staged(&idle, &load, &self.settings.workload)?
                } else {
                    compute_logs(&load, &self.settings.workload)?
                };
                let prefix = match self.slo_type.expected_workload_kind() {
                    Some(WorkloadKind::PreAggregated) => "workload_metric",
                    _ => "workload_log",
                };
                self.record(prefix, Stage::Idle, Stage::Load, &computed);
                Ok(computed.value)
            }
            Quantity::Supplied => {
                let value = self
                    .workload_value
                    .ok_or_else(|| SloError::MissingRequiredField("workloadValue".to_string()))?;
                self.diagnostics.scalar("workload_supplied", value);
                Ok(value)
            }
        }
    }
}

fn require_finite(quantity: &str, value: f64) -> Result<f64, SloError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SloError::NonFiniteResult {
            quantity: quantity.to_string(),
            value,
        })
    }
}

/// Evaluate `request` and compare the result against its threshold.
pub fn evaluate(request: &EvaluationRequest) -> Result<Evaluation, SloError> {
    let metadata = &request.metadata;
    let mut evaluator = Evaluator {
        slo_type: request.slo_type,
        results: &request.results,
        workload_value: request.workload_value,
        settings: Settings::from_metadata(metadata)?,
        diagnostics: Diagnostics::new(),
    };

    let (result, numerator, denominator) = match request.slo_type.plan() {
        EvaluationPlan::Ratio {
            numerator,
            denominator,
        } => {
            let num = evaluator.quantity(numerator)?;
            let den = evaluator.quantity(denominator)?;
            evaluator.diagnostics.scalar("numerator", num);
            evaluator.diagnostics.scalar("denominator", den);
            let ratio = require_finite("efficiency ratio", num / den)?;
            (ratio, Some(num), Some(den))
        }
        EvaluationPlan::Join(default_mode) => {
            let mode = metadata.join_mode.unwrap_or(default_mode);
            let consumption = request.results.consumption(Stage::Load)?;
            let logs = evaluator.workload(Stage::Load)?;
            let outcome = join_efficiency(
                &consumption,
                &logs,
                mode,
                evaluator.settings.query.repetition,
            )?;
            evaluator
                .diagnostics
                .series("efficiency_ratios", outcome.ratios.concat());
            evaluator
                .diagnostics
                .series("efficiency_per_repetition", outcome.per_repetition.clone());
            let value = require_finite("joined efficiency", outcome.value)?;
            (value, None, None)
        }
    };

    let verdict = compare::evaluate(result, metadata.operator, metadata.threshold);
    evaluator.diagnostics.scalar("result", result);
    debug!(
        slo_type = %request.slo_type,
        result,
        operator = %metadata.operator,
        threshold = metadata.threshold,
        verdict,
        "evaluated SLO"
    );

    Ok(Evaluation {
        slo_type: request.slo_type,
        verdict,
        result,
        numerator,
        denominator,
        diagnostics: evaluator.diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticValue;
    use serde_json::json;
    use slo_common::{Sample, Series, StageData, StageGroup};
    use std::time::Duration;

    fn metadata(operator: &str, threshold: f64) -> Metadata {
        Metadata::from_json(&json!({
            "warmup": 0,
            "queryAggregation": "mean",
            "repetitionAggregation": "mean",
            "operator": operator,
            "threshold": threshold
        }))
        .unwrap()
    }

    fn cons(values: &[f64]) -> Option<Series> {
        let pairs: Vec<(f64, f64)> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (i as f64 * 10.0, *v))
            .collect();
        Some(Series::from_pairs(&pairs).unwrap())
    }

    fn raw(n: usize) -> Option<LogSeries> {
        Some(LogSeries::Raw(
            (0..n).map(|i| Sample::new(i as f64, 1.0)).collect(),
        ))
    }

    fn staged_run() -> RunResult {
        let rep = StageGroup {
            baseline: StageData {
                consumption: cons(&[2.0, 2.0]),
                workload: None,
            },
            idle: StageData {
                consumption: cons(&[3.0, 3.0]),
                workload: raw(10),
            },
            load: StageData {
                consumption: cons(&[6.0, 6.0]),
                workload: raw(50),
            },
        };
        RunResult::Staged {
            repetitions: vec![rep.clone(), rep],
        }
    }

    fn request(slo_type: SloType, results: RunResult) -> EvaluationRequest {
        EvaluationRequest {
            slo_type,
            metadata: metadata("gte", 5.0),
            results,
            workload_value: None,
        }
    }

    #[test]
    fn test_type1_staged_ratio() {
        let eval = evaluate(&request(SloType::Type1, staged_run())).unwrap();
        assert_eq!(eval.numerator, Some(40.0));
        assert_eq!(eval.denominator, Some(4.0));
        assert_eq!(eval.result, 10.0);
        assert!(eval.verdict);
        assert_eq!(
            eval.diagnostics.get("workload_log_idle"),
            Some(&DiagnosticValue::Scalar(10.0))
        );
        assert_eq!(
            eval.diagnostics.get("consumption_load_per_repetition"),
            Some(&DiagnosticValue::Series(vec![6.0, 6.0]))
        );
    }

    #[test]
    fn test_type4_and_type12() {
        let eval = evaluate(&request(SloType::Type4, staged_run())).unwrap();
        assert!((eval.result - 50.0 / 6.0).abs() < 1e-12);

        let eval = evaluate(&request(SloType::Type12, staged_run())).unwrap();
        assert_eq!(eval.result, 0.5);
        assert!(!eval.verdict);
    }

    #[test]
    fn test_type9_requires_supplied_workload() {
        let mut req = request(SloType::Type9, staged_run());
        assert_eq!(
            evaluate(&req),
            Err(SloError::MissingRequiredField("workloadValue".to_string()))
        );
        req.workload_value = Some(100.0);
        assert_eq!(evaluate(&req).unwrap().result, 25.0);
    }

    #[test]
    fn test_zero_denominator_is_error() {
        let rep = StageGroup {
            baseline: StageData {
                consumption: cons(&[6.0]),
                workload: None,
            },
            idle: StageData::default(),
            load: StageData {
                consumption: cons(&[6.0]),
                workload: raw(3),
            },
        };
        let err = evaluate(&request(
            SloType::Type3,
            RunResult::Staged {
                repetitions: vec![rep],
            },
        ))
        .unwrap_err();
        assert!(matches!(err, SloError::NonFiniteResult { .. }));
    }

    #[test]
    fn test_workload_kind_checked_against_type() {
        let err = evaluate(&request(SloType::Type7, staged_run())).unwrap_err();
        assert_eq!(
            err,
            SloError::WorkloadKindMismatch {
                expected: "pre_aggregated",
                found: "raw"
            }
        );
    }

    #[test]
    fn test_unstaged_topology_for_staged_type() {
        let results = RunResult::Unstaged {
            consumption: vec![cons(&[1.0]).unwrap()],
            workload: vec![raw(1).unwrap()],
        };
        assert!(evaluate(&request(SloType::Type4, results.clone())).is_ok());
        assert_eq!(
            evaluate(&request(SloType::Type3, results)),
            Err(SloError::TopologyMismatch {
                expected: "staged",
                found: "unstaged"
            })
        );
    }

    #[test]
    fn test_invalid_aggregation_fails_before_computing() {
        let mut req = request(SloType::Type11, staged_run());
        req.metadata.repetition_aggregation = "p999".to_string();
        assert_eq!(
            evaluate(&req),
            Err(SloError::InvalidAggregationName("p999".to_string()))
        );
    }

    #[test]
    fn test_request_from_json() {
        let value = json!({
            "sloType": "type2",
            "metadata": {
                "warmup": "30s",
                "queryAggregation": "p95",
                "repetitionAggregation": "median",
                "operator": "lt",
                "threshold": 3
            },
            "results": {
                "topology": "unstaged",
                "consumption": [[[0, "1"]]],
                "workload": [{ "kind": "raw", "values": [] }]
            },
            "workloadValue": "12"
        });
        let req = EvaluationRequest::from_json(&value).unwrap();
        assert_eq!(req.slo_type, SloType::Type2);
        assert_eq!(req.metadata.warmup, Duration::from_secs(30));
        assert_eq!(req.workload_value, Some(12.0));

        let mut numeric = value.clone();
        numeric["sloType"] = json!(14);
        assert_eq!(
            EvaluationRequest::from_json(&numeric).unwrap().slo_type,
            SloType::Type14
        );

        let mut missing = value;
        missing["metadata"].as_object_mut().unwrap().remove("threshold");
        assert_eq!(
            EvaluationRequest::from_json(&missing),
            Err(SloError::MissingRequiredField("metadata.threshold".to_string()))
        );
    }

    #[test]
    fn test_join_type() {
        let rep = StageGroup {
            load: StageData {
                consumption: cons(&[5.0, 5.0, 5.0]),
                workload: Some(LogSeries::Raw(vec![Sample::new(9.0, 20.0)])),
            },
            ..StageGroup::default()
        };
        let mut req = request(
            SloType::Type13,
            RunResult::Staged {
                repetitions: vec![rep],
            },
        );
        req.metadata.warmup = Duration::ZERO;
        let eval = evaluate(&req).unwrap();
        assert_eq!(eval.result, 4.0);
        assert_eq!(eval.numerator, None);
        assert_eq!(
            eval.diagnostics.get("efficiency_ratios"),
            Some(&DiagnosticValue::Series(vec![4.0]))
        );
    }
}
