//! Intermediate values recorded during one evaluation.
//!
//! Diagnostics are owned by the evaluation that produced them and returned
//! with its result; persisting them is up to the caller.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::consumption::Computed;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DiagnosticValue {
    Scalar(f64),
    Series(Vec<f64>),
}

/// Named diagnostic values, serialized as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    values: BTreeMap<String, DiagnosticValue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), DiagnosticValue::Scalar(value));
    }

    pub fn series(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.values.insert(name.into(), DiagnosticValue::Series(values));
    }

    /// Record both sides of a computation under `prefix`, e.g.
    /// `consumption_load`, `consumption_load_per_repetition` and
    /// `consumption_baseline`.
    pub fn computed(&mut self, prefix: &str, base_stage: &str, load_stage: &str, computed: &Computed) {
        self.scalar(format!("{prefix}_{load_stage}"), computed.load.value);
        self.series(
            format!("{prefix}_{load_stage}_per_repetition"),
            computed.load.per_repetition.clone(),
        );
        if let Some(base) = &computed.base {
            self.scalar(format!("{prefix}_{base_stage}"), base.value);
            self.series(
                format!("{prefix}_{base_stage}_per_repetition"),
                base.per_repetition.clone(),
            );
        }
    }

    pub fn get(&self, name: &str) -> Option<&DiagnosticValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
