use std::collections::BTreeMap;

/// Canonical precision for coefficient values: equality and persistence both
/// work on 6-decimal rounded values.
pub const CANONICAL_DECIMALS: i32 = 6;

/// Round `value` to `decimals` decimal places (clamped to 0..=15).
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals.clamp(0, 15));
    (value * factor).round() / factor
}

/// One concrete assignment of values to coefficient axes, a candidate unit of
/// work. Values are canonicalized to [`CANONICAL_DECIMALS`] on insert, so two
/// points that agree to 6 decimals compare equal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPoint {
    values: BTreeMap<String, f64>,
}

impl ScanPoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one coefficient, rounding to the canonical precision.
    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.values
            .insert(name.into(), round_to(value, CANONICAL_DECIMALS));
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// A coefficient absent from a point is implicitly at the origin.
    pub fn value_or_zero(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Coefficient-wise equality at canonical precision. A name missing from
    /// either side is treated as 0.0; neither point is modified.
    pub fn matches(&self, other: &ScanPoint) -> bool {
        self.values
            .keys()
            .chain(other.values.keys())
            .all(|name| self.value_or_zero(name) == other.value_or_zero(name))
    }
}

impl FromIterator<(String, f64)> for ScanPoint {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut point = ScanPoint::new();
        for (name, value) in iter {
            point.set(name, value);
        }
        point
    }
}

impl std::fmt::Display for ScanPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (idx, (name, value)) in self.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}
