//! HTTP API for SLO evaluation.
//!
//! Provides:
//! - `POST /` and `POST /type1` .. `POST /type14` - benchmark-operator
//!   requests, answered with a bare JSON boolean (`/` evaluates as type 4).
//!   Loki lines are text, so `/type13` counts each line as one event while
//!   `/type14` needs numeric line values and fails with `SLO-E020` otherwise.
//! - `POST /evaluate` - native requests, answered with the full evaluation
//! - `/metrics` - Prometheus metrics export
//! - `/health` - Basic daemon health check
//!
//! Every failure is answered with 422 and `{"code", "error", "request_id"}`.
//! A `false` body always means the SLO was evaluated and not met.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::{Value, json};
use slo_efficiency::{Evaluation, EvaluationRequest, SloError, SloType, evaluate, legacy};
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::{Metrics, Outcome};
use crate::sink::{DiagnosticsRecord, DiagnosticsSink};

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    /// Daemon version.
    pub version: &'static str,
    /// Daemon start time.
    pub started_at: Instant,
    /// Daemon PID.
    pub pid: u32,
    pub metrics: Metrics,
    pub sink: DiagnosticsSink,
}

/// How a request body is interpreted and how the answer is shaped.
#[derive(Debug, Clone, Copy)]
enum Route {
    /// Operator format with the SLO type taken from the path.
    Legacy(SloType),
    /// Native format with `sloType` in the body.
    Native,
}

impl Route {
    fn parse(&self, body: &Value) -> Result<EvaluationRequest, SloError> {
        match self {
            Self::Legacy(slo_type) => legacy::into_request(body, *slo_type),
            Self::Native => EvaluationRequest::from_json(body),
        }
    }

    fn respond(&self, evaluation: &Evaluation) -> Response {
        match self {
            Self::Legacy(_) => Json(evaluation.verdict).into_response(),
            Self::Native => Json(evaluation).into_response(),
        }
    }
}

/// Create the HTTP router.
pub fn create_router(state: HttpState) -> Router {
    let mut router = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/evaluate", post(native_handler))
        .route(
            "/",
            post(|State(state): State<Arc<HttpState>>, body: Bytes| async move {
                handle(state, "/", Route::Legacy(SloType::Type4), body).await
            }),
        );

    for slo_type in SloType::ALL {
        let path = format!("/{}", slo_type.route());
        let label = path.clone();
        router = router.route(
            &path,
            post(move |State(state): State<Arc<HttpState>>, body: Bytes| async move {
                handle(state, &label, Route::Legacy(slo_type), body).await
            }),
        );
    }

    router.with_state(Arc::new(state))
}

/// Handler for `/metrics` - Prometheus metrics export.
async fn metrics_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            output,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Handler for `/health` - Basic daemon health check.
async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let uptime_secs = state.started_at.elapsed().as_secs();

    Json(json!({
        "status": "healthy",
        "version": state.version,
        "pid": state.pid,
        "uptime_seconds": uptime_secs,
        "diagnostics_enabled": state.sink.is_enabled(),
    }))
}

async fn native_handler(State(state): State<Arc<HttpState>>, body: Bytes) -> Response {
    handle(state, "/evaluate", Route::Native, body).await
}

/// Parse, evaluate, record and answer one request.
async fn handle(state: Arc<HttpState>, path: &str, route: Route, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();
    let started = Instant::now();

    let payload: Result<Value, SloError> = serde_json::from_slice(&body)
        .map_err(|e| SloError::MalformedPayload(format!("request body is not JSON: {e}")));
    let request = payload.as_ref().map_err(Clone::clone).and_then(|v| route.parse(v));

    let slo_type = match (&request, route) {
        (Ok(request), _) => Some(request.slo_type),
        (Err(_), Route::Legacy(slo_type)) => Some(slo_type),
        (Err(_), Route::Native) => None,
    };
    let outcome = request.and_then(|request| evaluate(&request));
    let elapsed = started.elapsed();

    let type_label = slo_type.map_or_else(|| "unknown".to_string(), |t| t.route());
    let (metric_outcome, response) = match &outcome {
        Ok(evaluation) => {
            info!(
                %request_id,
                path,
                slo_type = %evaluation.slo_type,
                result = evaluation.result,
                verdict = evaluation.verdict,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "evaluated"
            );
            let metric_outcome = if evaluation.verdict {
                Outcome::Met
            } else {
                Outcome::Violated
            };
            (metric_outcome, route.respond(evaluation))
        }
        Err(e) => {
            warn!(%request_id, path, code = %e.code(), error = %e, "evaluation failed");
            let body = json!({
                "code": e.code(),
                "error": e.to_string(),
                "request_id": request_id,
            });
            (
                Outcome::Failed,
                (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response(),
            )
        }
    };
    state
        .metrics
        .record_evaluation(&type_label, metric_outcome, elapsed);

    let request_value = payload.unwrap_or(Value::Null);
    let record = DiagnosticsRecord {
        request_id,
        recorded_at: Utc::now(),
        route: path,
        slo_type: slo_type.map(u8::from),
        outcome: metric_outcome.as_str(),
        result: outcome.as_ref().ok().map(|e| e.result),
        error: outcome.as_ref().err().map(ToString::to_string),
        diagnostics: outcome.as_ref().ok().map(|e| &e.diagnostics),
        request: &request_value,
    };
    if let Err(e) = state.sink.write(&record).await {
        state.metrics.record_diagnostics_failure();
        warn!(%request_id, error = %e, "could not persist diagnostics");
    }

    ([(REQUEST_ID_HEADER, request_id.to_string())], response).into_response()
}

/// Start the HTTP server.
///
/// # Arguments
/// * `address` - `host:port` to listen on.
/// * `state` - Shared state for handlers.
///
/// # Returns
/// A handle to the spawned server task. The server stops on Ctrl-C.
pub fn start_server(
    address: String,
    state: HttpState,
) -> tokio::task::JoinHandle<Result<(), std::io::Error>> {
    let router = create_router(state);

    tracing::info!("Starting HTTP server on {}", address);

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&address).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use slo_common::config::DiagnosticsConfig;
    use tower::ServiceExt;

    fn make_test_state() -> HttpState {
        HttpState {
            version: "0.1.0-test",
            started_at: Instant::now(),
            pid: 12345,
            metrics: Metrics::new().unwrap(),
            sink: DiagnosticsSink::disabled(),
        }
    }

    fn operator_body() -> Value {
        let prom = |v: f64| json!([{ "metric": {}, "values": [[0, v.to_string()], [10, v.to_string()]] }]);
        json!({
            "metadata": {
                "warmup": "0",
                "queryAggregation": "mean",
                "repetitionAggregation": "mean",
                "operator": "gt",
                "threshold": "0.1"
            },
            "results": {
                "first": [{
                    "first": { "first": "baseline", "second": prom(10.0), "third": [] },
                    "second": { "first": "idle", "second": prom(12.0), "third": [] },
                    "third": {
                        "first": "load",
                        "second": prom(40.0),
                        "third": [{ "stream": {}, "values": [
                            ["1700000001000000000", "GET /"],
                            ["1700000002000000000", "GET /"],
                            ["1700000003000000000", "GET /"],
                            ["1700000004000000000", "GET /"]
                        ] }]
                    }
                }],
                "second": 20
            }
        })
    }

    async fn post_json(router: Router, uri: &str, body: Vec<u8>) -> (StatusCode, Value, Option<String>) {
        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let request_id = response
            .headers()
            .get("x-request-id")
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap(), request_id)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = make_test_state();
        let router = create_router(state);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], "0.1.0-test");
        assert_eq!(json["pid"], 12345);
        assert_eq!(json["diagnostics_enabled"], false);
    }

    #[tokio::test]
    async fn test_legacy_route_returns_bare_verdict() {
        let router = create_router(make_test_state());
        let body = serde_json::to_vec(&operator_body()).unwrap();

        // Type 9: supplied workload 20 over load minus baseline consumption 30.
        let (status, json, request_id) = post_json(router, "/type9", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, Value::Bool(true));
        assert!(Uuid::parse_str(&request_id.unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_legacy_route_violated_is_false() {
        let mut payload = operator_body();
        payload["metadata"]["threshold"] = json!("1000");
        let router = create_router(make_test_state());

        let (status, json, _) =
            post_json(router, "/type12", serde_json::to_vec(&payload).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, Value::Bool(false));
    }

    #[tokio::test]
    async fn test_root_route_evaluates_as_type4() {
        let router = create_router(make_test_state());
        let body = serde_json::to_vec(&operator_body()).unwrap();

        let (status, json, _) = post_json(router, "/", body).await;
        assert_eq!(status, StatusCode::OK);
        // 4 events over 40 load consumption = 0.1, not greater than 0.1.
        assert_eq!(json, Value::Bool(false));
    }

    #[tokio::test]
    async fn test_failure_is_unprocessable_with_code() {
        let mut payload = operator_body();
        payload["metadata"]["operator"] = json!("ne");
        let router = create_router(make_test_state());

        let (status, json, request_id) =
            post_json(router, "/type1", serde_json::to_vec(&payload).unwrap()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["code"], "SLO-E002");
        assert_eq!(json["request_id"], json!(request_id.unwrap()));
    }

    #[tokio::test]
    async fn test_invalid_json_body() {
        let router = create_router(make_test_state());
        let (status, json, _) = post_json(router, "/evaluate", b"{not json".to_vec()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["code"], "SLO-E008");
    }

    #[tokio::test]
    async fn test_native_route_returns_evaluation() {
        let payload = json!({
            "sloType": "type11",
            "metadata": {
                "warmup": 0,
                "queryAggregation": "mean",
                "repetitionAggregation": "mean",
                "operator": "lte",
                "threshold": 0.5
            },
            "results": {
                "topology": "staged",
                "repetitions": [{
                    "baseline": { "consumption": [[0, "10"]] },
                    "load": { "consumption": [[0, "40"]] }
                }]
            }
        });
        let router = create_router(make_test_state());

        let (status, json, _) =
            post_json(router, "/evaluate", serde_json::to_vec(&payload).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sloType"], 11);
        assert_eq!(json["verdict"], true);
        assert_eq!(json["result"], 0.25);
        assert_eq!(json["diagnostics"]["consumption_baseline"], 10.0);
    }

    #[tokio::test]
    async fn test_metrics_count_outcomes() {
        let state = make_test_state();
        let metrics = state.metrics.clone();
        let router = create_router(state);
        let body = serde_json::to_vec(&operator_body()).unwrap();

        let _ = post_json(router.clone(), "/type9", body).await;
        let _ = post_json(router.clone(), "/evaluate", b"[]".to_vec()).await;

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("# HELP"));
        assert!(text.contains(r#"slo_evaluations_total{outcome="met",slo_type="type9"} 1"#));
        assert!(text.contains(r#"slo_evaluations_total{outcome="failed",slo_type="unknown"} 1"#));
        assert_eq!(text, metrics.encode().unwrap());
    }

    #[tokio::test]
    async fn test_diagnostics_written_per_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = make_test_state();
        state.sink = DiagnosticsSink::new(&DiagnosticsConfig {
            enabled: true,
            directory: dir.path().to_path_buf(),
        });
        let router = create_router(state);
        let body = serde_json::to_vec(&operator_body()).unwrap();

        let (_, _, request_id) = post_json(router, "/type2", body).await;
        let path = dir.path().join(format!("{}.json", request_id.unwrap()));
        let record: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();

        assert_eq!(record["route"], "/type2");
        // (4 - 0) events over 40 is not greater than 0.1.
        assert_eq!(record["outcome"], "violated");
        assert_eq!(record["slo_type"], 2);
        assert!(record["diagnostics"]["workload_log_load"].is_number());
        assert_eq!(record["request"]["results"]["second"], 20);
    }
}
