//! Efficiency SLO evaluation for benchmark telemetry.
//!
//! The pipeline reduces per-stage consumption and workload telemetry of
//! every repetition, forms the efficiency ratio selected by the
//! [`SloType`](slo_type::SloType) and compares it against the threshold in
//! the request metadata.

pub mod aggregate;
pub mod compare;
pub mod consumption;
pub mod diagnostics;
pub mod evaluate;
pub mod join;
pub mod legacy;
pub mod logcount;
pub mod reduce;
pub mod slo_type;

pub use aggregate::{Aggregation, resolve};
pub use diagnostics::{DiagnosticValue, Diagnostics};
pub use evaluate::{Evaluation, EvaluationRequest, evaluate};
pub use slo_type::{EvaluationPlan, Quantity, SloType};

pub use slo_common::{LogConfig, SloError, init_logging};
