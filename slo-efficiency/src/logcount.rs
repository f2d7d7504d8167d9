//! Workload quantities derived from log series.
//!
//! A raw log contributes its event count per repetition; a pre-aggregated
//! log is reduced like a consumption series with the workload aggregation.

use slo_common::{LogSeries, SloError, WorkloadKind};
use tracing::debug;

use crate::consumption::{Computed, ReduceParams, Reduced, check_repetitions};
use crate::reduce::reduce_sample;

/// Kind shared by all `logs`, or `None` for an empty slice.
fn common_kind(logs: &[&LogSeries]) -> Result<Option<WorkloadKind>, SloError> {
    let Some(first) = logs.first() else {
        return Ok(None);
    };
    let kind = first.kind();
    if let Some(other) = logs.iter().find(|l| l.kind() != kind) {
        return Err(SloError::WorkloadKindMismatch {
            expected: kind.as_str(),
            found: other.kind().as_str(),
        });
    }
    Ok(Some(kind))
}

/// Per-repetition value of one log series.
pub fn repetition_value(log: &LogSeries, params: &ReduceParams) -> Result<f64, SloError> {
    match log {
        LogSeries::Raw(entries) => Ok(entries.len() as f64),
        LogSeries::PreAggregated(series) => reduce_sample(series, params.warmup, params.sample),
    }
}

fn reduce_logs(logs: &[&LogSeries], params: &ReduceParams) -> Result<Reduced, SloError> {
    common_kind(logs)?;
    let per_repetition = logs
        .iter()
        .map(|log| repetition_value(log, params))
        .collect::<Result<Vec<_>, _>>()?;
    Reduced::from_repetitions(per_repetition, params.repetition)
}

/// Reduce the load-stage logs of every repetition.
pub fn compute_logs(load: &[&LogSeries], params: &ReduceParams) -> Result<Computed, SloError> {
    let load = reduce_logs(load, params)?;
    debug!(
        repetitions = load.per_repetition.len(),
        load = load.value,
        "computed workload"
    );
    Ok(Computed::unstaged(load))
}

/// Load-stage workload minus idle-stage workload.
pub fn compute_logs_staged(
    idle: &[&LogSeries],
    load: &[&LogSeries],
    params: &ReduceParams,
) -> Result<Computed, SloError> {
    check_repetitions(idle.len(), load.len())?;
    if let (Some(idle_kind), Some(load_kind)) = (common_kind(idle)?, common_kind(load)?)
        && idle_kind != load_kind
    {
        return Err(SloError::WorkloadKindMismatch {
            expected: load_kind.as_str(),
            found: idle_kind.as_str(),
        });
    }

    let idle = reduce_logs(idle, params)?;
    let load = reduce_logs(load, params)?;
    debug!(
        repetitions = load.per_repetition.len(),
        idle = idle.value,
        load = load.value,
        "computed staged workload"
    );
    Ok(Computed::staged(idle, load))
}
