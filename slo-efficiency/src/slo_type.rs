//! Supported efficiency SLO types and the evaluation plan of each.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use slo_common::{JoinMode, SloError, Stage, WorkloadKind};

/// A numerator or denominator of an efficiency ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    /// Consumption of stage `of`, minus stage `base` when given.
    Consumption { of: Stage, base: Option<Stage> },
    /// Workload of the load stage, minus the idle stage when `staged`.
    Workload { staged: bool },
    /// Workload scalar supplied with the request.
    Supplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationPlan {
    Ratio {
        numerator: Quantity,
        denominator: Quantity,
    },
    Join(JoinMode),
}

/// Efficiency SLO types, numbered as exposed on the HTTP routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SloType {
    /// Log count (load - idle) per consumption (load - baseline).
    Type1,
    /// Log count (load - idle) per consumption (load).
    Type2,
    /// Log count (load) per consumption (load - baseline).
    Type3,
    /// Log count (load) per consumption (load).
    Type4,
    /// Workload metric (load - idle) per consumption (load - baseline).
    Type5,
    /// Workload metric (load - idle) per consumption (load).
    Type6,
    /// Workload metric (load) per consumption (load - baseline).
    Type7,
    /// Workload metric (load) per consumption (load).
    Type8,
    /// Supplied workload per consumption (load - baseline).
    Type9,
    /// Supplied workload per consumption (load).
    Type10,
    /// Baseline consumption per load consumption.
    Type11,
    /// Idle consumption per load consumption.
    Type12,
    /// Timestamp join, events summed per consumption sample.
    Type13,
    /// Timestamp join, one ratio per event.
    Type14,
}

const LOAD_MINUS_BASELINE: Quantity = Quantity::Consumption {
    of: Stage::Load,
    base: Some(Stage::Baseline),
};
const LOAD: Quantity = Quantity::Consumption {
    of: Stage::Load,
    base: None,
};

impl SloType {
    pub const ALL: [SloType; 14] = [
        Self::Type1,
        Self::Type2,
        Self::Type3,
        Self::Type4,
        Self::Type5,
        Self::Type6,
        Self::Type7,
        Self::Type8,
        Self::Type9,
        Self::Type10,
        Self::Type11,
        Self::Type12,
        Self::Type13,
        Self::Type14,
    ];

    pub fn number(&self) -> u8 {
        match self {
            Self::Type1 => 1,
            Self::Type2 => 2,
            Self::Type3 => 3,
            Self::Type4 => 4,
            Self::Type5 => 5,
            Self::Type6 => 6,
            Self::Type7 => 7,
            Self::Type8 => 8,
            Self::Type9 => 9,
            Self::Type10 => 10,
            Self::Type11 => 11,
            Self::Type12 => 12,
            Self::Type13 => 13,
            Self::Type14 => 14,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    /// HTTP route name, e.g. `type3`.
    pub fn route(&self) -> String {
        format!("type{}", self.number())
    }

    pub fn plan(&self) -> EvaluationPlan {
        use Quantity::*;

        let ratio = |numerator, denominator| EvaluationPlan::Ratio {
            numerator,
            denominator,
        };
        match self {
            Self::Type1 | Self::Type5 => ratio(Workload { staged: true }, LOAD_MINUS_BASELINE),
            Self::Type2 | Self::Type6 => ratio(Workload { staged: true }, LOAD),
            Self::Type3 | Self::Type7 => ratio(Workload { staged: false }, LOAD_MINUS_BASELINE),
            Self::Type4 | Self::Type8 => ratio(Workload { staged: false }, LOAD),
            Self::Type9 => ratio(Supplied, LOAD_MINUS_BASELINE),
            Self::Type10 => ratio(Supplied, LOAD),
            Self::Type11 => ratio(
                Consumption {
                    of: Stage::Baseline,
                    base: None,
                },
                LOAD,
            ),
            Self::Type12 => ratio(
                Consumption {
                    of: Stage::Idle,
                    base: None,
                },
                LOAD,
            ),
            Self::Type13 => EvaluationPlan::Join(JoinMode::EventCount),
            Self::Type14 => EvaluationPlan::Join(JoinMode::PerEvent),
        }
    }

    /// Workload log kind this type consumes, if it reads workload logs.
    pub fn expected_workload_kind(&self) -> Option<WorkloadKind> {
        match self.number() {
            1..=4 | 13 | 14 => Some(WorkloadKind::Raw),
            5..=8 => Some(WorkloadKind::PreAggregated),
            _ => None,
        }
    }
}

impl fmt::Display for SloType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type{}", self.number())
    }
}

impl FromStr for SloType {
    type Err = SloError;

    /// Accepts `3`, `type3` and `/type3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.trim_start_matches('/');
        let digits = digits.strip_prefix("type").unwrap_or(digits);
        digits
            .parse::<u8>()
            .ok()
            .and_then(Self::from_number)
            .ok_or_else(|| SloError::UnknownSloType(trimmed.to_string()))
    }
}

impl TryFrom<u8> for SloType {
    type Error = SloError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::from_number(n).ok_or_else(|| SloError::UnknownSloType(n.to_string()))
    }
}

impl From<SloType> for u8 {
    fn from(t: SloType) -> Self {
        t.number()
    }
}
