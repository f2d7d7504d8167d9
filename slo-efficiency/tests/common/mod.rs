use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .with(filter)
            .init();
    });
}

/// Metadata object with the given aggregations and comparison.
#[allow(dead_code)]
pub fn metadata(query: &str, repetition: &str, operator: &str, threshold: f64) -> serde_json::Value {
    serde_json::json!({
        "warmup": 0,
        "queryAggregation": query,
        "repetitionAggregation": repetition,
        "operator": operator,
        "threshold": threshold
    })
}
