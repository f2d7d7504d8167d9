//! Timestamp join between workload events and consumption samples.
//!
//! Each event is attributed to the consumption sample closest in time. The
//! resulting per-sample (or per-event) efficiency ratios are summarized with
//! a geometric mean per repetition, then reduced across repetitions.
//!
//! In event-count mode a log line whose value is not a number (a plain Loki
//! line) counts as one event. Per-event mode needs a numeric value per event.

use std::collections::BTreeMap;
use std::fmt;

use slo_common::{JoinMode, LogSeries, Sample, Series, SloError};
use tracing::{debug, trace};

use crate::aggregate::Aggregation;
use crate::consumption::check_repetitions;
use crate::reduce::reduce_repetitions;

/// Clock unit of an epoch timestamp, inferred from its magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl TimeUnit {
    /// Classify by magnitude. Second-resolution epochs stay below 1e11 until
    /// the year 5138.
    pub fn classify(timestamp: f64) -> Self {
        let magnitude = timestamp.abs();
        if magnitude < 1e11 {
            Self::Seconds
        } else if magnitude < 1e14 {
            Self::Milliseconds
        } else if magnitude < 1e17 {
            Self::Microseconds
        } else {
            Self::Nanoseconds
        }
    }

    pub fn per_second(&self) -> f64 {
        match self {
            Self::Seconds => 1.0,
            Self::Milliseconds => 1e3,
            Self::Microseconds => 1e6,
            Self::Nanoseconds => 1e9,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seconds => "seconds",
            Self::Milliseconds => "milliseconds",
            Self::Microseconds => "microseconds",
            Self::Nanoseconds => "nanoseconds",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert an epoch timestamp of any supported unit to seconds.
pub fn normalize_to_seconds(timestamp: f64) -> f64 {
    timestamp / TimeUnit::classify(timestamp).per_second()
}

/// Result of the join over all repetitions.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    /// Per-repetition geometric means reduced with the repetition aggregation.
    pub value: f64,
    /// Geometric mean of the positive ratios of each repetition.
    pub per_repetition: Vec<f64>,
    /// Positive ratios of each repetition.
    pub ratios: Vec<Vec<f64>>,
}

/// Consumption samples keyed by timestamp, ascending. A repeated timestamp
/// keeps the later value.
fn consumption_points(series: &Series) -> Result<Vec<(f64, f64)>, SloError> {
    let mut points = series
        .samples()
        .iter()
        .map(|s| Ok((s.timestamp, s.value.as_f64()?)))
        .collect::<Result<Vec<_>, SloError>>()?;
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    points.dedup_by(|later, kept| {
        if later.0 == kept.0 {
            kept.1 = later.1;
            true
        } else {
            false
        }
    });
    Ok(points)
}

/// Index of the point nearest to `timestamp`; the earliest wins on ties.
fn nearest(points: &[(f64, f64)], timestamp: f64) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, (t, _)) in points.iter().enumerate() {
        let distance = (t - timestamp).abs();
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

/// Contribution of one event to its consumption sample in event-count mode.
fn event_count(event: &Sample) -> f64 {
    event.value.as_f64().unwrap_or(1.0)
}

fn check_clock_units(consumption: &Series, events: &[Sample]) -> Result<(), SloError> {
    let Some(event) = events.first() else {
        return Ok(());
    };
    let consumption_unit = TimeUnit::classify(consumption.start());
    let workload_unit = TimeUnit::classify(event.timestamp);
    if consumption_unit != workload_unit {
        return Err(SloError::ClockUnitMismatch {
            consumption: consumption_unit.as_str(),
            workload: workload_unit.as_str(),
        });
    }
    Ok(())
}

/// Positive efficiency ratios of one repetition.
pub fn repetition_ratios(
    consumption: &Series,
    events: &[Sample],
    mode: JoinMode,
) -> Result<Vec<f64>, SloError> {
    check_clock_units(consumption, events)?;
    let points = consumption_points(consumption)?;

    let mut ratios = Vec::new();
    match mode {
        JoinMode::EventCount => {
            let mut accumulated: BTreeMap<usize, f64> = BTreeMap::new();
            for event in events {
                let value = event_count(event);
                *accumulated
                    .entry(nearest(&points, event.timestamp))
                    .or_insert(0.0) += value;
            }
            for (index, total) in accumulated {
                let consumed = points[index].1;
                if consumed > 0.0 {
                    ratios.push(total / consumed);
                }
            }
        }
        JoinMode::PerEvent => {
            for event in events {
                let value = event.value.as_f64()?;
                let consumed = points[nearest(&points, event.timestamp)].1;
                if consumed > 0.0 {
                    ratios.push(value / consumed);
                }
            }
        }
    }

    ratios.retain(|r| *r > 0.0);
    Ok(ratios)
}

/// Join consumption and workload logs repetition by repetition.
pub fn join_efficiency(
    consumption: &[&Series],
    logs: &[&LogSeries],
    mode: JoinMode,
    repetition: Aggregation,
) -> Result<JoinOutcome, SloError> {
    check_repetitions(consumption.len(), logs.len())?;

    let mut per_repetition = Vec::with_capacity(consumption.len());
    let mut ratios = Vec::with_capacity(consumption.len());
    for (i, (series, log)) in consumption.iter().zip(logs).enumerate() {
        let positive = repetition_ratios(series, log.samples(), mode)?;
        if positive.is_empty() {
            return Err(SloError::NoPositiveRatios { repetition: i });
        }
        let summary = Aggregation::GeoMean.apply(&positive);
        trace!(repetition = i, ratios = positive.len(), geomean = summary, "joined repetition");
        per_repetition.push(summary);
        ratios.push(positive);
    }

    let value = reduce_repetitions(&per_repetition, repetition)?;
    debug!(
        mode = ?mode,
        repetitions = per_repetition.len(),
        value,
        "computed joined efficiency"
    );
    Ok(JoinOutcome {
        value,
        per_repetition,
        ratios,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumption(pairs: &[(f64, f64)]) -> Series {
        Series::from_pairs(pairs).unwrap()
    }

    fn events(pairs: &[(f64, f64)]) -> Vec<Sample> {
        pairs.iter().map(|&(t, v)| Sample::new(t, v)).collect()
    }

    #[test]
    fn test_event_matches_nearest_timestamp() {
        let cons = consumption(&[(0.0, 5.0), (10.0, 5.0), (20.0, 5.0)]);
        let ratios = repetition_ratios(&cons, &events(&[(9.0, 20.0)]), JoinMode::EventCount).unwrap();
        assert_eq!(ratios, vec![4.0]);
    }

    #[test]
    fn test_tie_goes_to_earlier_timestamp() {
        let cons = consumption(&[(0.0, 2.0), (10.0, 4.0)]);
        let ratios = repetition_ratios(&cons, &events(&[(5.0, 8.0)]), JoinMode::PerEvent).unwrap();
        assert_eq!(ratios, vec![4.0]);
    }

    #[test]
    fn test_event_count_accumulates_per_timestamp() {
        let cons = consumption(&[(0.0, 2.0), (10.0, 4.0)]);
        let evs = events(&[(1.0, 1.0), (2.0, 3.0), (9.0, 8.0)]);

        let mode_a = repetition_ratios(&cons, &evs, JoinMode::EventCount).unwrap();
        assert_eq!(mode_a, vec![2.0, 2.0]);

        let mode_b = repetition_ratios(&cons, &evs, JoinMode::PerEvent).unwrap();
        assert_eq!(mode_b, vec![0.5, 1.5, 2.0]);
    }

    #[test]
    fn test_repeated_timestamp_keeps_later_value() {
        let cons = consumption(&[(0.0, 1.0), (0.0, 4.0)]);
        let ratios = repetition_ratios(&cons, &events(&[(0.0, 8.0)]), JoinMode::EventCount).unwrap();
        assert_eq!(ratios, vec![2.0]);
    }

    #[test]
    fn test_non_positive_consumption_skipped() {
        let cons = consumption(&[(0.0, 0.0), (10.0, -3.0), (20.0, 2.0)]);
        let evs = events(&[(0.0, 5.0), (10.0, 5.0), (20.0, 5.0), (21.0, -9.0)]);
        let ratios = repetition_ratios(&cons, &evs, JoinMode::PerEvent).unwrap();
        assert_eq!(ratios, vec![2.5]);
    }

    #[test]
    fn test_no_positive_ratios() {
        let cons = consumption(&[(0.0, 5.0)]);
        let ok = LogSeries::Raw(events(&[(0.0, 5.0)]));
        let bad = LogSeries::Raw(events(&[(0.0, 0.0)]));
        let err = join_efficiency(&[&cons, &cons], &[&ok, &bad], JoinMode::EventCount, Aggregation::Mean)
            .unwrap_err();
        assert_eq!(err, SloError::NoPositiveRatios { repetition: 1 });
    }

    #[test]
    fn test_geomean_then_repetition_aggregation() {
        let cons = consumption(&[(0.0, 1.0), (10.0, 1.0), (20.0, 1.0)]);
        let first = LogSeries::Raw(events(&[(0.0, 1.0), (10.0, 10.0), (20.0, 100.0)]));
        let second = LogSeries::Raw(events(&[(0.0, 30.0)]));
        let outcome = join_efficiency(
            &[&cons, &cons],
            &[&first, &second],
            JoinMode::EventCount,
            Aggregation::Mean,
        )
        .unwrap();
        assert!((outcome.per_repetition[0] - 10.0).abs() < 1e-9);
        assert!((outcome.value - 20.0).abs() < 1e-9);
        assert_eq!(outcome.ratios[1], vec![30.0]);
    }

    #[test]
    fn test_clock_unit_mismatch() {
        let cons = consumption(&[(1_700_000_000.0, 5.0)]);
        let evs = events(&[(1_700_000_000_000_000_000.0, 1.0)]);
        assert_eq!(
            repetition_ratios(&cons, &evs, JoinMode::EventCount),
            Err(SloError::ClockUnitMismatch {
                consumption: "seconds",
                workload: "nanoseconds"
            })
        );
    }

    #[test]
    fn test_text_event_value_rejected() {
        let cons = consumption(&[(0.0, 5.0)]);
        let evs = vec![Sample::new(0.0, "GET /index.html")];
        assert!(matches!(
            repetition_ratios(&cons, &evs, JoinMode::PerEvent),
            Err(SloError::NonNumericValue(_))
        ));
    }

    #[test]
    fn test_text_event_counts_as_one() {
        let cons = consumption(&[(0.0, 5.0), (10.0, 5.0), (20.0, 5.0)]);
        let evs = vec![
            Sample::new(9.0, "GET /index.html"),
            Sample::new(11.0, "GET /about.html"),
            Sample::new(19.0, "GET /index.html"),
        ];
        let ratios = repetition_ratios(&cons, &evs, JoinMode::EventCount).unwrap();
        assert_eq!(ratios, vec![0.4, 0.2]);
    }

    #[test]
    fn test_normalize_to_seconds() {
        assert_eq!(normalize_to_seconds(1_700_000_000.0), 1_700_000_000.0);
        assert_eq!(normalize_to_seconds(1_700_000_000_000.0), 1_700_000_000.0);
        assert_eq!(normalize_to_seconds(1_700_000_000_000_000.0), 1_700_000_000.0);
        assert_eq!(TimeUnit::classify(1.7e18), TimeUnit::Nanoseconds);
    }

    #[test]
    fn test_repetition_count_mismatch() {
        let cons = consumption(&[(0.0, 5.0)]);
        let log = LogSeries::Raw(Vec::new());
        assert_eq!(
            join_efficiency(&[&cons], &[&log, &log], JoinMode::PerEvent, Aggregation::Mean),
            Err(SloError::RepetitionCountMismatch { left: 1, right: 2 })
        );
    }
}
