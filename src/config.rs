use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};

/// Admission-control caps and pacing for one scheduler run. Immutable once
/// the loop starts.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Max jobs allowed in the codegen phase at once.
    pub max_codegen: usize,
    /// Max jobs counted in the integrate phase at once (cutoff applies).
    pub max_integrate: usize,
    /// Max running (not finished) jobs overall.
    pub max_total_running: usize,
    /// Integrate-phase age beyond which a job stops counting toward
    /// `max_integrate` (it still counts as running).
    pub integrate_cutoff: Duration,
    /// Delay between polls when no capacity is available.
    pub poll_interval: Duration,
    /// Delay after each successful submission.
    pub submit_delay: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_codegen: 5,
            max_integrate: 5,
            max_total_running: 50,
            integrate_cutoff: Duration::from_secs(45 * 60),
            poll_interval: Duration::from_secs(5 * 60),
            submit_delay: Duration::from_secs(10),
        }
    }
}

impl QuotaConfig {
    /// Reject configurations that could never admit work. Checked before any
    /// submission is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.max_codegen == 0 || self.max_integrate == 0 || self.max_total_running == 0 {
            return Err(SweepError::Config(
                "quotas must all be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(SweepError::Config(
                "poll interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// External-tool configuration for one process; opaque to the core, which
/// only checks artifact existence, never card content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub name: String,
    pub process_card: String,
    pub template_dir: String,
}

/// Immutable map from process name to its configuration, passed explicitly
/// into the planner rather than living in ambient process-wide state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessRegistry {
    processes: HashMap<String, ProcessSpec>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, process: impl Into<String>, spec: ProcessSpec) {
        self.processes.insert(process.into(), spec);
    }

    pub fn get(&self, process: &str) -> Option<&ProcessSpec> {
        self.processes.get(process)
    }

    pub fn contains(&self, process: &str) -> bool {
        self.processes.contains_key(process)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
