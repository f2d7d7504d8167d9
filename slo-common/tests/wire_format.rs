mod common;

use common::init_test_logging;
use serde_json::json;
use slo_common::{
    JoinMode, LogSeries, Metadata, Operator, RunResult, SampleValue, SloError, Stage, WorkloadKind,
};
use std::time::Duration;
use tracing::info;

#[test]
fn test_staged_run_from_json() {
    init_test_logging();
    info!(test = "test_staged_run_from_json", phase = "setup");

    let payload = json!({
        "topology": "staged",
        "repetitions": [{
            "baseline": { "consumption": [[0, "10"], [10, "11"]] },
            "idle": {
                "consumption": [[0, "12"], [10, "12"]],
                "workload": { "kind": "raw", "values": [] }
            },
            "load": {
                "consumption": [[0, "20"], [10, "30"]],
                "workload": { "kind": "raw", "values": [[1, "GET /"], [2, "GET /a"]] }
            }
        }]
    });

    info!(test = "test_staged_run_from_json", phase = "execute");
    let run: RunResult = serde_json::from_value(payload).unwrap();

    info!(test = "test_staged_run_from_json", phase = "assert");
    assert_eq!(run.topology(), "staged");
    let load = run.consumption(Stage::Load).unwrap();
    assert_eq!(load.len(), 1);
    assert_eq!(load[0].samples()[1].value.as_f64().unwrap(), 30.0);

    let idle = run.workload(Stage::Idle).unwrap();
    assert_eq!(idle[0].kind(), WorkloadKind::Raw);
    assert!(idle[0].samples().is_empty());

    let load_logs = run.workload(Stage::Load).unwrap();
    assert_eq!(
        load_logs[0].samples()[0].value,
        SampleValue::Text("GET /".into())
    );

    // Baseline carries no workload in this payload.
    assert!(matches!(
        run.workload(Stage::Baseline),
        Err(SloError::MissingRequiredField(ref path)) if path == "results.repetitions[0].baseline.workload"
    ));
}

#[test]
fn test_unstaged_run_rejects_other_stages() {
    init_test_logging();

    let run: RunResult = serde_json::from_value(json!({
        "topology": "unstaged",
        "consumption": [[[0, 1.0], [5, 2.0]], [[0, 3.0]]],
        "workload": [
            { "kind": "pre_aggregated", "values": [[0, "4"]] },
            { "kind": "pre_aggregated", "values": [[0, "6"]] }
        ]
    }))
    .unwrap();

    assert_eq!(run.consumption(Stage::Load).unwrap().len(), 2);
    assert!(matches!(
        run.workload(Stage::Load).unwrap()[1],
        LogSeries::PreAggregated(_)
    ));
    assert_eq!(
        run.consumption(Stage::Baseline).unwrap_err(),
        SloError::TopologyMismatch {
            expected: "staged",
            found: "unstaged"
        }
    );
}

#[test]
fn test_empty_consumption_series_rejected() {
    init_test_logging();

    let err = serde_json::from_value::<RunResult>(json!({
        "topology": "unstaged",
        "consumption": [[]]
    }))
    .unwrap_err();
    assert!(err.to_string().contains("series contains no samples"));
}

#[test]
fn test_metadata_with_stringified_values() {
    init_test_logging();

    let metadata: Metadata = serde_json::from_value(json!({
        "warmup": "60",
        "queryAggregation": "mean",
        "repetitionAggregation": "median",
        "operator": "lte",
        "threshold": "0.5",
        "joinMode": "per_event"
    }))
    .unwrap();

    assert_eq!(metadata.warmup, Duration::from_secs(60));
    assert_eq!(metadata.operator, Operator::Lte);
    assert_eq!(metadata.threshold, 0.5);
    assert_eq!(metadata.workload_aggregation(), "mean");
    assert_eq!(metadata.join_mode, Some(JoinMode::PerEvent));

    let round = serde_json::to_value(&metadata).unwrap();
    assert_eq!(round["warmup"], json!(60.0));
    assert_eq!(round["queryAggregation"], json!("mean"));
}

#[test]
fn test_metadata_missing_operator() {
    init_test_logging();

    let err = Metadata::from_json(&json!({
        "warmup": 0,
        "queryAggregation": "mean",
        "repetitionAggregation": "mean",
        "threshold": 1
    }))
    .unwrap_err();
    assert_eq!(
        err,
        SloError::MissingRequiredField("metadata.operator".to_string())
    );
    assert!(err.is_input_error());
}
