use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named axis of the parameter space.
///
/// A degree of freedom maps one scalar input to a weighted vector of
/// underlying coefficients. With a single relation at weight 1.0 this is the
/// plain single-parameter case; several relations describe a tied group that
/// always varies together at a fixed ratio. Weights are fixed at
/// construction; only the anchor and bounds may be adjusted afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegreeOfFreedom {
    name: String,
    relations: Vec<(String, f64)>,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    low: f64,
    #[serde(default)]
    high: f64,
}

impl DegreeOfFreedom {
    /// A new axis with no anchor or bounds set.
    pub fn new(name: impl Into<String>, relations: Vec<(String, f64)>) -> Self {
        Self {
            name: name.into(),
            relations,
            start: 0.0,
            low: 0.0,
            high: 0.0,
        }
    }

    /// Shorthand for the degenerate case: one coefficient, weight 1.0.
    pub fn simple(name: impl Into<String>) -> Self {
        let name = name.into();
        let relations = vec![(name.clone(), 1.0)];
        Self::new(name, relations)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relations(&self) -> &[(String, f64)] {
        &self.relations
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    /// Bounds are considered unset until `low < high`.
    pub fn has_bounds(&self) -> bool {
        self.low < self.high
    }

    pub fn set_limits(&mut self, start: f64, low: f64, high: f64) {
        self.start = start;
        self.low = low;
        self.high = high;
    }

    pub fn with_limits(mut self, start: f64, low: f64, high: f64) -> Self {
        self.set_limits(start, low, high);
        self
    }

    /// Evaluate the axis at `scalar`: a pure linear map from the scalar to
    /// every underlying coefficient.
    pub fn eval(&self, scalar: f64) -> BTreeMap<String, f64> {
        self.relations
            .iter()
            .map(|(coeff, weight)| (coeff.clone(), scalar * weight))
            .collect()
    }
}
