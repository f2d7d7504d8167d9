//! Prometheus metrics for the evaluation daemon.

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Outcome label of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Met,
    Violated,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Met => "met",
            Self::Violated => "violated",
            Self::Failed => "failed",
        }
    }
}

/// Daemon metrics with their own registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    evaluations: IntCounterVec,
    duration: HistogramVec,
    diagnostics_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let evaluations = IntCounterVec::new(
            Opts::new("slo_evaluations_total", "Evaluations by SLO type and outcome"),
            &["slo_type", "outcome"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "slo_evaluation_duration_seconds",
                "Time spent parsing and evaluating one request",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["slo_type"],
        )?;
        let diagnostics_failures = IntCounter::new(
            "slo_diagnostics_write_failures_total",
            "Diagnostics records that could not be persisted",
        )?;

        registry.register(Box::new(evaluations.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(diagnostics_failures.clone()))?;

        Ok(Self {
            registry,
            evaluations,
            duration,
            diagnostics_failures,
        })
    }

    pub fn record_evaluation(&self, slo_type: &str, outcome: Outcome, elapsed: Duration) {
        self.evaluations
            .with_label_values(&[slo_type, outcome.as_str()])
            .inc();
        self.duration
            .with_label_values(&[slo_type])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_diagnostics_failure(&self) {
        self.diagnostics_failures.inc();
    }

    /// Render all metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
