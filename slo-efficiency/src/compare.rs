//! Threshold comparison.

use slo_common::Operator;

/// Compare `result` against `threshold`.
pub fn evaluate(result: f64, operator: Operator, threshold: f64) -> bool {
    match operator {
        Operator::Lt => result < threshold,
        Operator::Lte => result <= threshold,
        Operator::Gt => result > threshold,
        Operator::Gte => result >= threshold,
        Operator::True => true,
        Operator::False => false,
    }
}
