use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};
use crate::scan::dof::DegreeOfFreedom;
use crate::scan::point::{round_to, ScanPoint, CANONICAL_DECIMALS};

/// Rejection-sampling retry ceiling for [`calculate_start_point`].
const START_POINT_MAX_ATTEMPTS: u32 = 999;

/// Default distance factor for anchor selection. Values closer to 1.0 push
/// the anchor further from the origin.
pub const DEFAULT_RAND_FACTOR: f64 = 1.25;

/// How sample points are distributed over the declared axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Per-axis linspace, Cartesian product across axes (an `N^D` mesh).
    FullGrid,
    /// `N` draws, each assigning every axis an independent uniform value.
    FullRandom,
    /// Per-axis linspace with all other axes held at 0.0, concatenated.
    AxisGrid,
    /// Per-axis uniform draws with all other axes held at 0.0, concatenated.
    AxisRandom,
}

impl Strategy {
    pub fn is_axis(self) -> bool {
        matches!(self, Strategy::AxisGrid | Strategy::AxisRandom)
    }

    pub fn is_random(self) -> bool {
        matches!(self, Strategy::FullRandom | Strategy::AxisRandom)
    }
}

/// `num` evenly spaced samples between `start` and `stop`, endpoints
/// included, rounded to 7 decimals.
pub fn linspace(start: f64, stop: f64, num: i64) -> Result<Vec<f64>> {
    linspace_with(start, stop, num, true, 7)
}

/// Evenly spaced sequence generator.
///
/// `num == 0` yields an empty sequence and `num == 1` yields `[start]`.
/// When `endpoint` is set and `num > 1` the final element is forced to
/// exactly `stop`, so step-multiplication drift never reaches the caller.
pub fn linspace_with(
    start: f64,
    stop: f64,
    num: i64,
    endpoint: bool,
    precision: i32,
) -> Result<Vec<f64>> {
    if num < 0 {
        return Err(SweepError::Config(format!(
            "number of samples must be non-negative, got {num}"
        )));
    }
    if num == 0 {
        return Ok(Vec::new());
    }
    if num == 1 {
        return Ok(vec![start]);
    }
    let precision = precision.clamp(0, 15);
    let div = if endpoint { num - 1 } else { num };
    let step = (stop - start) / div as f64;
    let mut samples: Vec<f64> = (0..num)
        .map(|idx| round_to(start + step * idx as f64, precision))
        .collect();
    if endpoint {
        let last = samples.len() - 1;
        samples[last] = stop;
    }
    Ok(samples)
}

/// Pick a random anchor in `[low, high]` that is sufficiently far from the
/// origin for a scan built around it to cover both sides meaningfully: the
/// sample is accepted once `|v| * rand_factor` exceeds the bound on the side
/// it fell on.
///
/// Fails with [`SweepError::ExhaustedAttempts`] after 999 retries; an
/// unreachable anchor indicates a misconfigured bound and is a hard error.
pub fn calculate_start_point(
    low: f64,
    high: f64,
    rand_factor: f64,
    rng: &mut impl Rng,
) -> Result<f64> {
    if !(low < high) {
        return Err(SweepError::Config(format!(
            "starting point bounds must satisfy low < high, got [{low}, {high}]"
        )));
    }
    let mut attempts = 0u32;
    loop {
        let sample = round_to(rng.gen_range(low..=high), CANONICAL_DECIMALS);
        let side = if sample < 0.0 { low } else { high };
        if sample.abs() * rand_factor > side.abs() {
            return Ok(sample);
        }
        attempts += 1;
        if attempts > START_POINT_MAX_ATTEMPTS {
            return Err(SweepError::ExhaustedAttempts {
                low,
                high,
                attempts,
            });
        }
    }
}

/// Heuristic lower bound on the sample count needed to resolve a quadratic
/// model over `dims` axes: `ceil(1.2 * (1 + 2D + D(D-1)/2))`.
pub fn recommended_random_samples(dims: usize) -> usize {
    let d = dims as f64;
    (1.2 * (1.0 + 2.0 * d + d * (d - 1.0) / 2.0)).ceil() as usize
}

/// Produce the ordered sample sequence for one job.
///
/// Every strategy shares the same bookkeeping: a candidate equal to the
/// reference point (all axes at 0.0) marks it observed, a candidate equal to
/// the `start` anchor is never emitted as a sample, and if no candidate
/// observed the reference point it is appended once at the end.
pub fn generate(
    dofs: &[DegreeOfFreedom],
    strategy: Strategy,
    num_points: i64,
    start: &ScanPoint,
    rng: &mut impl Rng,
) -> Result<Vec<ScanPoint>> {
    if dofs.is_empty() {
        return Err(SweepError::Config(
            "at least one degree of freedom is required".to_string(),
        ));
    }
    if num_points < 0 {
        return Err(SweepError::Config(format!(
            "number of scan points must be non-negative, got {num_points}"
        )));
    }
    for dof in dofs {
        if !dof.has_bounds() {
            return Err(SweepError::Config(format!(
                "degree of freedom {} has invalid bounds [{}, {}]",
                dof.name(),
                dof.low(),
                dof.high()
            )));
        }
    }

    let raw = match strategy {
        Strategy::FullGrid => full_grid(dofs, num_points)?,
        Strategy::FullRandom => full_random(dofs, num_points, rng),
        Strategy::AxisGrid => axis_grid(dofs, num_points)?,
        Strategy::AxisRandom => axis_random(dofs, num_points, rng),
    };
    Ok(filter_anchors(dofs, raw, start))
}

/// The all-zero point over the declared axes.
fn reference_point(dofs: &[DegreeOfFreedom]) -> ScanPoint {
    dofs.iter()
        .map(|dof| (dof.name().to_string(), 0.0))
        .collect()
}

fn filter_anchors(
    dofs: &[DegreeOfFreedom],
    raw: Vec<ScanPoint>,
    start: &ScanPoint,
) -> Vec<ScanPoint> {
    let reference = reference_point(dofs);
    let mut reference_seen = reference.matches(start);
    let mut out = Vec::with_capacity(raw.len());
    for point in raw {
        if point.matches(&reference) {
            reference_seen = true;
        } else if point.matches(start) {
            // The anchor is never emitted as a sample.
        } else {
            out.push(point);
        }
    }
    if !reference_seen {
        out.push(reference);
    }
    out
}

fn full_grid(dofs: &[DegreeOfFreedom], per_axis: i64) -> Result<Vec<ScanPoint>> {
    let mut axes = Vec::with_capacity(dofs.len());
    for dof in dofs {
        axes.push(linspace(dof.low(), dof.high(), per_axis)?);
    }
    let total: usize = axes.iter().map(|axis| axis.len()).product();
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut points = Vec::with_capacity(total);
    let mut cursor = vec![0usize; axes.len()];
    for _ in 0..total {
        points.push(
            dofs.iter()
                .zip(&axes)
                .zip(&cursor)
                .map(|((dof, axis), &idx)| (dof.name().to_string(), axis[idx]))
                .collect(),
        );
        for pos in (0..axes.len()).rev() {
            cursor[pos] += 1;
            if cursor[pos] < axes[pos].len() {
                break;
            }
            cursor[pos] = 0;
        }
    }
    Ok(points)
}

fn full_random(dofs: &[DegreeOfFreedom], samples: i64, rng: &mut impl Rng) -> Vec<ScanPoint> {
    (0..samples)
        .map(|_| {
            dofs.iter()
                .map(|dof| {
                    let value = rng.gen_range(dof.low()..=dof.high());
                    (dof.name().to_string(), value)
                })
                .collect()
        })
        .collect()
}

fn axis_grid(dofs: &[DegreeOfFreedom], per_axis: i64) -> Result<Vec<ScanPoint>> {
    let mut points = Vec::new();
    for (active, dof) in dofs.iter().enumerate() {
        for value in linspace(dof.low(), dof.high(), per_axis)? {
            points.push(single_axis_point(dofs, active, value));
        }
    }
    Ok(points)
}

fn axis_random(dofs: &[DegreeOfFreedom], per_axis: i64, rng: &mut impl Rng) -> Vec<ScanPoint> {
    let mut points = Vec::new();
    for (active, dof) in dofs.iter().enumerate() {
        for _ in 0..per_axis {
            let value = rng.gen_range(dof.low()..=dof.high());
            points.push(single_axis_point(dofs, active, value));
        }
    }
    points
}

/// A point varying exactly one axis, all others held at exactly 0.0.
fn single_axis_point(dofs: &[DegreeOfFreedom], active: usize, value: f64) -> ScanPoint {
    dofs.iter()
        .enumerate()
        .map(|(idx, dof)| {
            let v = if idx == active { value } else { 0.0 };
            (dof.name().to_string(), v)
        })
        .collect()
}
