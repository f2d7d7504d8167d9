//! Resource consumption (and workload metric) computation over repetitions.
//!
//! A quantity is computed by reducing every repetition's series to one
//! scalar, then reducing the per-repetition scalars. Staged quantities are
//! the difference of two such computations.

use std::time::Duration;

use slo_common::{Series, SloError};
use tracing::debug;

use crate::aggregate::Aggregation;
use crate::reduce::{reduce_repetitions, reduce_sample};

/// Aggregations and warmup applied to one kind of series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReduceParams {
    pub warmup: Duration,
    /// Applied to the samples of one series.
    pub sample: Aggregation,
    /// Applied across repetitions.
    pub repetition: Aggregation,
}

/// One side of a computation with its per-repetition inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduced {
    pub value: f64,
    pub per_repetition: Vec<f64>,
}

impl Reduced {
    pub(crate) fn from_repetitions(
        per_repetition: Vec<f64>,
        agg: Aggregation,
    ) -> Result<Self, SloError> {
        let value = reduce_repetitions(&per_repetition, agg)?;
        Ok(Self {
            value,
            per_repetition,
        })
    }
}

/// Result of an unstaged or staged computation.
#[derive(Debug, Clone, PartialEq)]
pub struct Computed {
    /// `load.value`, minus `base.value` when staged.
    pub value: f64,
    pub load: Reduced,
    pub base: Option<Reduced>,
}

impl Computed {
    pub(crate) fn unstaged(load: Reduced) -> Self {
        Self {
            value: load.value,
            load,
            base: None,
        }
    }

    pub(crate) fn staged(base: Reduced, load: Reduced) -> Self {
        Self {
            value: load.value - base.value,
            load,
            base: Some(base),
        }
    }
}

pub(crate) fn check_repetitions(left: usize, right: usize) -> Result<(), SloError> {
    if left != right {
        return Err(SloError::RepetitionCountMismatch { left, right });
    }
    Ok(())
}

fn reduce_all(series: &[&Series], params: &ReduceParams) -> Result<Reduced, SloError> {
    let per_repetition = series
        .iter()
        .map(|s| reduce_sample(s, params.warmup, params.sample))
        .collect::<Result<Vec<_>, _>>()?;
    Reduced::from_repetitions(per_repetition, params.repetition)
}

/// Reduce the load-stage series of every repetition.
pub fn compute(load: &[&Series], params: &ReduceParams) -> Result<Computed, SloError> {
    let load = reduce_all(load, params)?;
    debug!(
        repetitions = load.per_repetition.len(),
        load = load.value,
        "computed unstaged quantity"
    );
    Ok(Computed::unstaged(load))
}

/// `compute(load) - compute(base)`; both sides need the same number of
/// repetitions.
pub fn compute_staged(
    base: &[&Series],
    load: &[&Series],
    params: &ReduceParams,
) -> Result<Computed, SloError> {
    check_repetitions(base.len(), load.len())?;
    let base = reduce_all(base, params)?;
    let load = reduce_all(load, params)?;
    debug!(
        repetitions = load.per_repetition.len(),
        base = base.value,
        load = load.value,
        "computed staged quantity"
    );
    Ok(Computed::staged(base, load))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ReduceParams {
        ReduceParams {
            warmup: Duration::ZERO,
            sample: Aggregation::Mean,
            repetition: Aggregation::Mean,
        }
    }

    fn series(values: &[f64]) -> Series {
        let pairs: Vec<(f64, f64)> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (i as f64 * 15.0, *v))
            .collect();
        Series::from_pairs(&pairs).unwrap()
    }

    #[test]
    fn test_unstaged_two_repetitions() {
        let a = series(&[10.0, 20.0]);
        let b = series(&[30.0, 30.0]);
        let result = compute(&[&a, &b], &params()).unwrap();
        assert_eq!(result.load.per_repetition, vec![15.0, 30.0]);
        assert_eq!(result.value, 22.5);
        assert!(result.base.is_none());
    }

    #[test]
    fn test_staged_is_exact_difference() {
        let base = [series(&[1.0, 3.0]), series(&[2.0, 2.0])];
        let load = [series(&[10.0, 14.0]), series(&[8.0, 8.0])];
        let base_refs: Vec<&Series> = base.iter().collect();
        let load_refs: Vec<&Series> = load.iter().collect();

        let staged = compute_staged(&base_refs, &load_refs, &params()).unwrap();
        let only_load = compute(&load_refs, &params()).unwrap();
        let only_base = compute(&base_refs, &params()).unwrap();

        assert_eq!(staged.value, only_load.value - only_base.value);
        assert_eq!(staged.value, 8.0);
    }

    #[test]
    fn test_staged_length_mismatch() {
        let a = series(&[1.0]);
        let b = series(&[2.0]);
        let err = compute_staged(&[&a], &[&a, &b], &params()).unwrap_err();
        assert_eq!(err, SloError::RepetitionCountMismatch { left: 1, right: 2 });
    }

    #[test]
    fn test_no_repetitions() {
        assert_eq!(compute(&[], &params()), Err(SloError::NoRepetitions));
    }

    #[test]
    fn test_warmup_applied_per_series() {
        let s = series(&[100.0, 4.0, 6.0]);
        let p = ReduceParams {
            warmup: Duration::from_secs(15),
            ..params()
        };
        assert_eq!(compute(&[&s], &p).unwrap().value, 5.0);
    }
}
