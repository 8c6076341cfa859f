//! Resolving a sweep request into concrete candidate jobs.
//!
//! A [`SweepRequest`] declares what to scan; this module expands it against a
//! [`ProcessRegistry`] into the ordered [`CandidateJob`] list the scheduler
//! works through. Axis strategies fan out into one job per (process, axis,
//! anchor); full strategies produce one job per (process, run index) over all
//! axes at once. Points are generated eagerly so a candidate is fully
//! determined before the first poll cycle.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{ProcessRegistry, ProcessSpec};
use crate::error::{Result, SweepError};
use crate::scan::{
    calculate_start_point, generate, linspace, recommended_random_samples, DegreeOfFreedom,
    ScanPoint, Strategy, DEFAULT_RAND_FACTOR,
};
use crate::tracker::JobKey;

/// Declarative description of one sweep, usually loaded from a JSON file.
///
/// ```json
/// {
///   "processes": ["ttH"],
///   "tag": "AxisScan",
///   "dofs": [
///     {"name": "ctW", "relations": [["ctW", 1.0]]},
///     {"name": "ctli", "relations": [["ctl1", 1.0], ["ctl2", 1.0], ["ctl3", 1.0]]}
///   ],
///   "strategy": "axis_grid",
///   "points": 10,
///   "runs": 7,
///   "bounds": [-25.0, 25.0]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRequest {
    pub processes: Vec<String>,
    /// Tag postfix for axis strategies, full tag for full strategies.
    pub tag: String,
    pub dofs: Vec<DegreeOfFreedom>,
    pub strategy: Strategy,
    /// Samples per job. For `full_random`, 0 selects the quadratic-fit
    /// heuristic based on the number of axes.
    #[serde(default)]
    pub points: i64,
    /// Anchors per axis (axis strategies) or replica jobs (full strategies).
    pub runs: i64,
    /// Fallback bounds for axes that declare none of their own.
    #[serde(default = "default_bounds")]
    pub bounds: [f64; 2],
    /// Explicit anchor values per run index for full strategies; runs beyond
    /// this list get a random anchor per axis.
    #[serde(default)]
    pub start_values: Vec<HashMap<String, f64>>,
}

fn default_bounds() -> [f64; 2] {
    [-20.0, 20.0]
}

impl SweepRequest {
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// One configured-but-not-yet-submitted unit of work.
#[derive(Debug, Clone)]
pub struct CandidateJob {
    pub key: JobKey,
    pub spec: ProcessSpec,
    pub dofs: Vec<DegreeOfFreedom>,
    /// The anchor the scan is built around; never one of `points`.
    pub start: ScanPoint,
    pub points: Vec<ScanPoint>,
}

/// Expand a request into candidates, in a fixed deterministic order.
///
/// Processes missing from the registry are logged and skipped; the rest of
/// the sweep proceeds. Invalid bounds, negative counts, or key parts that
/// would not round-trip through artifact names are configuration errors.
pub fn build_candidates(
    registry: &ProcessRegistry,
    request: &SweepRequest,
    rng: &mut impl Rng,
) -> Result<Vec<CandidateJob>> {
    if request.runs < 1 {
        return Err(SweepError::Config(format!(
            "runs must be at least 1, got {}",
            request.runs
        )));
    }
    if request.dofs.is_empty() {
        return Err(SweepError::Config(
            "at least one degree of freedom is required".to_string(),
        ));
    }
    for dof in &request.dofs {
        ensure_key_part(dof.name(), "degree of freedom name")?;
    }

    let mut candidates = Vec::new();
    for process in &request.processes {
        let Some(spec) = registry.get(process) else {
            tracing::warn!(process, "Unknown process, skipping");
            continue;
        };
        ensure_key_part(process, "process name")?;
        if request.strategy.is_axis() {
            plan_axis_jobs(process, spec, request, rng, &mut candidates)?;
        } else {
            plan_full_jobs(process, spec, request, rng, &mut candidates)?;
        }
    }
    Ok(candidates)
}

/// One job per (axis, anchor): the anchors are linspaced over the axis
/// bounds, and each job scans that single axis around its anchor.
fn plan_axis_jobs(
    process: &str,
    spec: &ProcessSpec,
    request: &SweepRequest,
    rng: &mut impl Rng,
    out: &mut Vec<CandidateJob>,
) -> Result<()> {
    if request.points < 1 {
        return Err(SweepError::Config(format!(
            "axis strategies need at least 1 point per job, got {}",
            request.points
        )));
    }
    for dof in &request.dofs {
        let (low, high) = bounds_for(dof, request);
        let tag = format!("{}{}", dof.name(), request.tag);
        ensure_key_part(&tag, "job tag")?;
        for (idx, anchor) in linspace(low, high, request.runs)?.into_iter().enumerate() {
            let axis = dof.clone().with_limits(anchor, low, high);
            let mut start = ScanPoint::new();
            start.set(axis.name(), anchor);
            let points = generate(
                std::slice::from_ref(&axis),
                request.strategy,
                request.points,
                &start,
                rng,
            )?;
            out.push(CandidateJob {
                key: JobKey::new(process, &tag, format!("run{idx}")),
                spec: spec.clone(),
                dofs: vec![axis],
                start,
                points,
            });
        }
    }
    Ok(())
}

/// One job per run index over the full axis set. Anchors come from the
/// request's `start_values` when provided, otherwise each axis gets a random
/// anchor sufficiently far from the origin.
fn plan_full_jobs(
    process: &str,
    spec: &ProcessSpec,
    request: &SweepRequest,
    rng: &mut impl Rng,
    out: &mut Vec<CandidateJob>,
) -> Result<()> {
    ensure_key_part(&request.tag, "job tag")?;
    let num_points = match (request.points, request.strategy) {
        (n, _) if n >= 1 => n,
        (_, Strategy::FullRandom) => recommended_random_samples(request.dofs.len()) as i64,
        (n, _) => {
            return Err(SweepError::Config(format!(
                "full grid needs at least 1 point per axis, got {n}"
            )));
        }
    };

    for run in 0..request.runs {
        let given = request.start_values.get(run as usize);
        let mut dofs = Vec::with_capacity(request.dofs.len());
        let mut start = ScanPoint::new();
        for dof in &request.dofs {
            let (low, high) = bounds_for(dof, request);
            let anchor = match given.and_then(|values| values.get(dof.name())) {
                Some(value) => *value,
                None => calculate_start_point(low, high, DEFAULT_RAND_FACTOR, rng)?,
            };
            start.set(dof.name(), anchor);
            dofs.push(dof.clone().with_limits(anchor, low, high));
        }
        let points = generate(&dofs, request.strategy, num_points, &start, rng)?;
        out.push(CandidateJob {
            key: JobKey::new(process, &request.tag, format!("run{run}")),
            spec: spec.clone(),
            dofs,
            start,
            points,
        });
    }
    Ok(())
}

fn bounds_for(dof: &DegreeOfFreedom, request: &SweepRequest) -> (f64, f64) {
    if dof.has_bounds() {
        (dof.low(), dof.high())
    } else {
        (request.bounds[0], request.bounds[1])
    }
}

/// Key parts are joined with underscores in artifact names, so they must be
/// non-empty and underscore-free to round-trip.
fn ensure_key_part(value: &str, what: &str) -> Result<()> {
    if value.is_empty() || value.contains('_') {
        return Err(SweepError::Config(format!(
            "{what} must be non-empty and must not contain '_': {value:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn registry() -> ProcessRegistry {
        let mut registry = ProcessRegistry::new();
        registry.insert(
            "ttH",
            ProcessSpec {
                name: "ttH".to_string(),
                process_card: "ttH.dat".to_string(),
                template_dir: "template_cards/defaultPDFs_template".to_string(),
            },
        );
        registry
    }

    fn axis_request() -> SweepRequest {
        SweepRequest {
            processes: vec!["ttH".to_string()],
            tag: "AxisScan".to_string(),
            dofs: vec![
                DegreeOfFreedom::simple("ctW"),
                DegreeOfFreedom::simple("ctZ"),
            ],
            strategy: Strategy::AxisGrid,
            points: 5,
            runs: 3,
            bounds: [-25.0, 25.0],
            start_values: Vec::new(),
        }
    }

    #[test]
    fn axis_plan_fans_out_per_axis_and_anchor() {
        let mut rng = StdRng::seed_from_u64(7);
        let candidates = build_candidates(&registry(), &axis_request(), &mut rng).unwrap();

        // 1 process x 2 axes x 3 anchors.
        assert_eq!(candidates.len(), 6);
        assert_eq!(candidates[0].key.to_string(), "ttH_ctWAxisScan_run0");
        assert_eq!(candidates[2].key.to_string(), "ttH_ctWAxisScan_run2");
        assert_eq!(candidates[3].key.to_string(), "ttH_ctZAxisScan_run0");

        // Anchors follow linspace(-25, 25, 3).
        assert_eq!(candidates[0].start.get("ctW"), Some(-25.0));
        assert_eq!(candidates[1].start.get("ctW"), Some(0.0));
        assert_eq!(candidates[2].start.get("ctW"), Some(25.0));
    }

    #[test]
    fn candidate_points_never_contain_the_anchor() {
        let mut rng = StdRng::seed_from_u64(7);
        let candidates = build_candidates(&registry(), &axis_request(), &mut rng).unwrap();
        for candidate in &candidates {
            for point in &candidate.points {
                assert!(!point.matches(&candidate.start));
            }
        }
    }

    #[derive(Clone, Default)]
    struct CaptureWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn unknown_process_skip_emits_a_warning() {
        let writer = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer.clone())
            .finish();

        let mut request = axis_request();
        request.processes = vec!["nope".to_string()];
        let mut rng = StdRng::seed_from_u64(1);
        let candidates = tracing::subscriber::with_default(subscriber, || {
            build_candidates(&registry(), &request, &mut rng).unwrap()
        });

        assert!(candidates.is_empty());
        let logs = String::from_utf8(writer.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Unknown process"), "missing warning in {logs:?}");
        assert!(logs.contains("nope"));
    }

    #[test]
    fn unknown_process_is_skipped_and_planning_continues() {
        let mut request = axis_request();
        request.processes = vec!["nope".to_string(), "ttH".to_string()];
        let mut rng = StdRng::seed_from_u64(7);
        let candidates = build_candidates(&registry(), &request, &mut rng).unwrap();
        assert_eq!(candidates.len(), 6);
        assert!(candidates.iter().all(|c| c.key.process() == "ttH"));
    }

    #[test]
    fn full_random_uses_given_anchors_then_random_ones() {
        let mut request = axis_request();
        request.strategy = Strategy::FullRandom;
        request.tag = "FullScan".to_string();
        request.points = 4;
        request.runs = 2;
        request.start_values = vec![HashMap::from([
            ("ctW".to_string(), 4.0),
            ("ctZ".to_string(), 4.0),
        ])];

        let mut rng = StdRng::seed_from_u64(11);
        let candidates = build_candidates(&registry(), &request, &mut rng).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].start.get("ctW"), Some(4.0));
        assert_eq!(candidates[0].start.get("ctZ"), Some(4.0));

        // The second run has no declared anchor: each axis gets a random one
        // far enough from the origin (|v| * 1.25 > 25).
        for name in ["ctW", "ctZ"] {
            let anchor = candidates[1].start.get(name).unwrap();
            assert!(anchor.abs() > 20.0, "anchor {anchor} too close to origin");
        }
    }

    #[test]
    fn zero_points_selects_heuristic_for_full_random() {
        let mut request = axis_request();
        request.strategy = Strategy::FullRandom;
        request.tag = "FullScan".to_string();
        request.points = 0;
        request.runs = 1;

        let mut rng = StdRng::seed_from_u64(3);
        let candidates = build_candidates(&registry(), &request, &mut rng).unwrap();
        // D = 2 -> ceil(1.2 * (1 + 4 + 1)) = 8, plus possibly the reference.
        assert!(candidates[0].points.len() >= 8);
    }

    #[test]
    fn underscored_names_are_configuration_errors() {
        let mut request = axis_request();
        request.tag = "Axis_Scan".to_string();
        let mut rng = StdRng::seed_from_u64(1);
        let result = build_candidates(&registry(), &request, &mut rng);
        assert!(matches!(result, Err(SweepError::Config(_))));
    }

    #[test]
    fn runs_below_one_are_rejected() {
        let mut request = axis_request();
        request.runs = 0;
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            build_candidates(&registry(), &request, &mut rng),
            Err(SweepError::Config(_))
        ));
    }

    #[test]
    fn deterministic_for_a_fixed_seed() {
        let mut request = axis_request();
        request.strategy = Strategy::AxisRandom;
        let first = build_candidates(&registry(), &request, &mut StdRng::seed_from_u64(5)).unwrap();
        let second =
            build_candidates(&registry(), &request, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.key, b.key);
            assert_eq!(a.points.len(), b.points.len());
            for (pa, pb) in a.points.iter().zip(&b.points) {
                assert!(pa.matches(pb));
            }
        }
    }
}
