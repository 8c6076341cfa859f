//! Job-state inference from filesystem artifacts.
//!
//! The external tool leaves no process handle or API behind; the only way to
//! observe a job is to look at the files it writes into the shared working
//! directory. [`JobTracker`] re-derives every job's lifecycle phase from
//! artifact existence and modification times on each query; there is no
//! persistent index, and a [`TrackerSnapshot`] is a pure projection of the
//! directory at one instant.

pub mod artifacts;

pub use artifacts::{JobKey, DEFAULT_PLATFORM, MANIFEST_SUFFIX};

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A job's lifecycle stage. Transitions are monotonic:
/// CodeGen -> Integrate -> Finished; no job regresses.
///
/// "Running" is not a phase but the set {CodeGen, Integrate}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    CodeGen,
    Integrate,
    Finished,
}

impl Phase {
    pub fn is_running(self) -> bool {
        !matches!(self, Phase::Finished)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::CodeGen => write!(f, "codegen"),
            Phase::Integrate => write!(f, "integrate"),
            Phase::Finished => write!(f, "finished"),
        }
    }
}

/// One job as observed at a single poll instant. Recomputed fresh on every
/// poll and discarded once the scheduler has consumed it.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub key: JobKey,
    pub phase: Phase,
    /// Time spent in the current phase; only estimated for Integrate, zero
    /// otherwise.
    pub phase_elapsed: Duration,
    pub discovered_at: DateTime<Utc>,
}

/// Independent derived views of one poll. A job can appear in several sets at
/// once (e.g. `integrate_full` but not `integrate` once past the cutoff).
#[derive(Debug, Clone)]
pub struct TrackerSnapshot {
    pub taken_at: DateTime<Utc>,
    pub all: Vec<JobSnapshot>,
    /// Jobs not yet finished.
    pub running: Vec<JobKey>,
    pub codegen: Vec<JobKey>,
    /// Integrating jobs young enough to still count toward the quota.
    pub integrate: Vec<JobKey>,
    /// All integrating jobs regardless of cutoff, for display.
    pub integrate_full: Vec<JobKey>,
    pub finished: Vec<JobKey>,
}

/// Read-only adapter from a working directory to phase/elapsed-time facts.
///
/// Every query hits the filesystem; nothing is cached between calls, so two
/// classifications with no filesystem change in between always agree.
#[derive(Debug, Clone)]
pub struct JobTracker {
    dir: PathBuf,
    platform: String,
}

impl JobTracker {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_platform(dir, DEFAULT_PLATFORM)
    }

    pub fn with_platform(dir: impl Into<PathBuf>, platform: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            platform: platform.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every job ever configured in the directory, discovered through its
    /// manifest file. A missing or unreadable directory is treated as empty;
    /// manifest names that do not decompose into a key are skipped.
    pub fn list_jobs(&self) -> Vec<JobKey> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    %error,
                    "Working directory is not readable, treating as empty"
                );
                return Vec::new();
            }
        };

        let mut jobs = Vec::new();
        for entry in entries.flatten() {
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.ends_with(MANIFEST_SUFFIX) {
                continue;
            }
            match JobKey::from_manifest_name(name) {
                Some(key) => jobs.push(key),
                None => tracing::debug!(file = name, "Skipping malformed manifest name"),
            }
        }
        jobs.sort();
        jobs
    }

    /// True once the terminal output bundle exists.
    pub fn is_finished(&self, key: &JobKey) -> bool {
        key.tarball(&self.dir, &self.platform).exists()
    }

    /// Codegen produces no execution log until it completes, so an absent log
    /// means codegen; leftover pre-execution markers mean the same.
    fn is_codegen(&self, key: &JobKey) -> bool {
        if !key.run_log(&self.dir).exists() {
            return true;
        }
        key.pre_execution_markers(&self.dir)
            .iter()
            .any(|marker| marker.exists())
    }

    pub fn classify(&self, key: &JobKey) -> Phase {
        if self.is_finished(key) {
            Phase::Finished
        } else if self.is_codegen(key) {
            Phase::CodeGen
        } else {
            Phase::Integrate
        }
    }

    /// Estimated time spent integrating: `mtime(run log) - mtime(codegen
    /// log)`, clamped at zero. Zero when either artifact is missing or the
    /// key was never configured here. This is a proxy, not a monotonic clock:
    /// a copy that rewrites mtimes can move it backward (known limitation).
    pub fn integrate_elapsed(&self, key: &JobKey) -> Duration {
        if !key.manifest(&self.dir).exists() {
            return Duration::ZERO;
        }
        let Some(run_mtime) = mtime(&key.run_log(&self.dir)) else {
            return Duration::ZERO;
        };
        let Some(codegen_mtime) = mtime(&key.codegen_log(&self.dir)) else {
            return Duration::ZERO;
        };
        run_mtime
            .duration_since(codegen_mtime)
            .unwrap_or(Duration::ZERO)
    }

    /// One full poll of the directory. `integrate_cutoff` bounds how long an
    /// integrating job keeps counting toward the quota; `None` counts all of
    /// them.
    pub fn snapshot(&self, integrate_cutoff: Option<Duration>) -> TrackerSnapshot {
        let taken_at = Utc::now();
        let mut all = Vec::new();
        let mut running = Vec::new();
        let mut codegen = Vec::new();
        let mut integrate = Vec::new();
        let mut integrate_full = Vec::new();
        let mut finished = Vec::new();

        for key in self.list_jobs() {
            let phase = self.classify(&key);
            let phase_elapsed = match phase {
                Phase::Integrate => self.integrate_elapsed(&key),
                _ => Duration::ZERO,
            };
            all.push(JobSnapshot {
                key: key.clone(),
                phase,
                phase_elapsed,
                discovered_at: taken_at,
            });
            match phase {
                Phase::Finished => finished.push(key),
                Phase::CodeGen => {
                    codegen.push(key.clone());
                    running.push(key);
                }
                Phase::Integrate => {
                    integrate_full.push(key.clone());
                    if integrate_cutoff.map_or(true, |cutoff| phase_elapsed <= cutoff) {
                        integrate.push(key.clone());
                    }
                    running.push(key);
                }
            }
        }

        TrackerSnapshot {
            taken_at,
            all,
            running,
            codegen,
            integrate,
            integrate_full,
            finished,
        }
    }

    /// Last `lines` lines of the job's execution log, for progress display.
    /// A missing log yields an empty list rather than an error.
    pub fn tail_log(&self, key: &JobKey, lines: usize) -> Result<Vec<String>> {
        let path = key.run_log(&self.dir);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path)?;
        let all: Vec<&str> = contents.lines().collect();
        let skip = all.len().saturating_sub(lines);
        Ok(all[skip..].iter().map(|line| line.to_string()).collect())
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Render an elapsed duration as zero-padded `hh:mm:ss`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
