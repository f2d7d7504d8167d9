//! Reduction of one series and of per-repetition scalars.

use std::time::Duration;

use slo_common::{Sample, Series, SloError};
use tracing::trace;

use crate::aggregate::Aggregation;

/// Numeric values of the samples at or after `start + warmup`.
///
/// The reference point is the first sample's timestamp, not the minimum.
pub fn values_after_warmup(samples: &[Sample], warmup: Duration) -> Result<Vec<f64>, SloError> {
    let Some(first) = samples.first() else {
        return Err(SloError::EmptySeries);
    };
    let warmup_secs = warmup.as_secs_f64();
    let cutoff = first.timestamp + warmup_secs;

    let values = samples
        .iter()
        .filter(|s| s.timestamp >= cutoff)
        .map(|s| s.value.as_f64())
        .collect::<Result<Vec<_>, _>>()?;

    if values.is_empty() {
        let span = samples
            .iter()
            .map(|s| s.timestamp)
            .fold(first.timestamp, f64::max)
            - first.timestamp;
        return Err(SloError::EmptyAfterWarmup {
            warmup_secs,
            span_secs: span,
        });
    }
    Ok(values)
}

/// Reduce one series to a scalar after dropping the warmup window.
pub fn reduce_sample(series: &Series, warmup: Duration, agg: Aggregation) -> Result<f64, SloError> {
    let values = values_after_warmup(series.samples(), warmup)?;
    let result = agg.apply(&values);
    trace!(samples = values.len(), aggregation = %agg, result, "reduced series");
    Ok(result)
}

/// Reduce one scalar per repetition to a single value.
pub fn reduce_repetitions(values: &[f64], agg: Aggregation) -> Result<f64, SloError> {
    if values.is_empty() {
        return Err(SloError::NoRepetitions);
    }
    Ok(agg.apply(values))
}
