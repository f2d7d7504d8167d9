//! Named reductions over a sequence of numbers.
//!
//! Aggregation names arrive as strings in request metadata (`"mean"`,
//! `"p99.9"`, ...) and are resolved once into an [`Aggregation`]. Reductions
//! follow the conventions of common dataframe libraries: NaN is skipped by
//! the statistical reducers, `std`/`var` use the sample denominator and
//! percentiles interpolate linearly between order statistics.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use slo_common::SloError;

/// A resolved aggregation function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Mean,
    Median,
    Mode,
    Sum,
    Count,
    Max,
    Min,
    Std,
    Var,
    Skew,
    Kurt,
    First,
    Last,
    GeoMean,
    Len,
    /// Percentile in percent, `0 <= p < 100`.
    Percentile(f64),
}

fn percentile_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^p\d\d?(\.\d+)?$").ok())
        .as_ref()
}

/// Resolve an aggregation name.
pub fn resolve(name: &str) -> Result<Aggregation, SloError> {
    name.parse()
}

impl FromStr for Aggregation {
    type Err = SloError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let agg = match name {
            "mean" => Self::Mean,
            "median" => Self::Median,
            "mode" => Self::Mode,
            "sum" => Self::Sum,
            "count" => Self::Count,
            "max" => Self::Max,
            "min" => Self::Min,
            "std" => Self::Std,
            "var" => Self::Var,
            "skew" => Self::Skew,
            "kurt" => Self::Kurt,
            "first" => Self::First,
            "last" => Self::Last,
            "geomean" => Self::GeoMean,
            "len" => Self::Len,
            _ => {
                let invalid = || SloError::InvalidAggregationName(name.to_string());
                let pattern = percentile_pattern().ok_or_else(invalid)?;
                if !pattern.is_match(name) {
                    return Err(invalid());
                }
                let percent = name[1..].parse::<f64>().map_err(|_| invalid())?;
                Self::Percentile(percent)
            }
        };
        Ok(agg)
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Mode => "mode",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Max => "max",
            Self::Min => "min",
            Self::Std => "std",
            Self::Var => "var",
            Self::Skew => "skew",
            Self::Kurt => "kurt",
            Self::First => "first",
            Self::Last => "last",
            Self::GeoMean => "geomean",
            Self::Len => "len",
            Self::Percentile(p) => return write!(f, "p{p}"),
        };
        f.write_str(name)
    }
}

impl Aggregation {
    /// Reduce `values` to one number.
    ///
    /// Reductions that are undefined for the input (mean of nothing, skew of
    /// two values, ...) yield NaN; callers decide whether that is an error.
    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Self::First => values.first().copied().unwrap_or(f64::NAN),
            Self::Last => values.last().copied().unwrap_or(f64::NAN),
            Self::Len => values.len() as f64,
            Self::GeoMean => geomean(values),
            _ => {
                let clean: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
                self.apply_skipna(&clean)
            }
        }
    }

    fn apply_skipna(&self, values: &[f64]) -> f64 {
        match self {
            Self::Mean => mean(values),
            Self::Median => percentile(values, 0.5),
            Self::Mode => mode(values),
            Self::Sum => values.iter().sum(),
            Self::Count => values.len() as f64,
            Self::Max => values.iter().copied().reduce(f64::max).unwrap_or(f64::NAN),
            Self::Min => values.iter().copied().reduce(f64::min).unwrap_or(f64::NAN),
            Self::Std => variance(values).sqrt(),
            Self::Var => variance(values),
            Self::Skew => skew(values),
            Self::Kurt => kurt(values),
            Self::Percentile(p) => percentile(values, p / 100.0),
            Self::First | Self::Last | Self::Len | Self::GeoMean => self.apply(values),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator).
fn variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Sums of squared and higher powers of deviations from the mean.
fn central_sums(values: &[f64], power: i32) -> (f64, f64) {
    let m = mean(values);
    values.iter().fold((0.0, 0.0), |(m2, mk), v| {
        let d = v - m;
        (m2 + d * d, mk + d.powi(power))
    })
}

/// Adjusted Fisher-Pearson skewness.
fn skew(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 3 {
        return f64::NAN;
    }
    let (m2, m3) = central_sums(values, 3);
    if m2 == 0.0 {
        return 0.0;
    }
    (n * (n - 1.0).sqrt() / (n - 2.0)) * (m3 / m2.powf(1.5))
}

/// Bias-corrected excess kurtosis.
fn kurt(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 4 {
        return f64::NAN;
    }
    let (m2, m4) = central_sums(values, 4);
    let denom = (n - 2.0) * (n - 3.0) * m2 * m2;
    if denom == 0.0 {
        return 0.0;
    }
    let numer = n * (n + 1.0) * (n - 1.0) * m4;
    let adj = 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0));
    numer / denom - adj
}

/// Most frequent value; ties go to the smallest.
fn mode(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut best = f64::NAN;
    let mut best_count = 0usize;
    let mut i = 0;
    while i < sorted.len() {
        let run = sorted[i..].iter().take_while(|v| **v == sorted[i]).count();
        if run > best_count {
            best = sorted[i];
            best_count = run;
        }
        i += run;
    }
    best
}

/// Quantile `q` in `[0, 1]` with linear interpolation.
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Geometric mean over the strictly positive elements.
fn geomean(values: &[f64]) -> f64 {
    let logs: Vec<f64> = values.iter().filter(|v| **v > 0.0).map(|v| v.ln()).collect();
    if logs.is_empty() {
        return f64::NAN;
    }
    mean(&logs).exp()
}
