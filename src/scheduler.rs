//! Quota-based submission scheduling.
//!
//! A single cooperative polling loop: each cycle re-derives the directory
//! state through the [`JobTracker`], computes remaining capacity from the
//! quotas, and admits unsubmitted candidates in their fixed order until
//! capacity runs out. There is no notification channel; the only feedback
//! signal is the artifacts jobs leave behind, observed one poll interval at a
//! time, so every timing decision here is approximate by one interval.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cards;
use crate::config::QuotaConfig;
use crate::error::Result;
use crate::launcher::Launcher;
use crate::plan::CandidateJob;
use crate::tracker::{format_elapsed, JobTracker, Phase, TrackerSnapshot};

/// Outcome of one scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitStats {
    /// Candidates successfully handed to the launcher.
    pub submitted: usize,
    /// Candidates never launched by this run (already on disk, or the run
    /// was cancelled first).
    pub skipped: usize,
    /// Poll cycles performed.
    pub cycles: usize,
}

/// Polling admission-control loop over one working directory.
///
/// Assumes a single scheduler instance per directory: the only coordination
/// substrate is the filesystem itself, and admission is made idempotent by
/// probing for a candidate's artifacts before every launch.
/// Killing and restarting the process therefore never double-submits,
/// although artifacts from a partially-written launch will make the job look
/// submitted on restart (known limitation).
pub struct SubmissionScheduler<L> {
    tracker: JobTracker,
    quotas: QuotaConfig,
    launcher: L,
    shutdown: CancellationToken,
}

impl<L: Launcher> SubmissionScheduler<L> {
    pub fn new(tracker: JobTracker, quotas: QuotaConfig, launcher: L) -> Result<Self> {
        quotas.validate()?;
        Ok(Self {
            tracker,
            quotas,
            launcher,
            shutdown: CancellationToken::new(),
        })
    }

    /// Replace the shutdown token; the loop finishes its current step and
    /// exits once the token is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Submission slots still open under the quotas, given one poll's view.
    pub fn capacity(quotas: &QuotaConfig, snapshot: &TrackerSnapshot) -> usize {
        let codegen = quotas.max_codegen.saturating_sub(snapshot.codegen.len());
        let integrate = quotas.max_integrate.saturating_sub(snapshot.integrate.len());
        let running = quotas
            .max_total_running
            .saturating_sub(snapshot.running.len());
        codegen.min(integrate).min(running)
    }

    /// A candidate already on disk must not be submitted again: the manifest,
    /// the terminal bundle, or an execution log each mean some launch already
    /// got this far.
    fn exists_on_disk(&self, job: &CandidateJob) -> bool {
        let dir = self.tracker.dir();
        job.key.manifest(dir).exists()
            || self.tracker.is_finished(&job.key)
            || job.key.run_log(dir).exists()
    }

    /// Drive the loop until no work remains: the run ends when a submission
    /// pass launches nothing and every candidate either already exists on
    /// disk or carries no points to submit.
    /// Jobs still running at that point are left to finish on their own;
    /// this loop does admission control, not lifecycle supervision.
    pub async fn run(&self, candidates: &[CandidateJob]) -> Result<SubmitStats> {
        let mut stats = SubmitStats::default();
        loop {
            stats.cycles += 1;
            let snapshot = self.tracker.snapshot(Some(self.quotas.integrate_cutoff));
            self.log_snapshot(&snapshot);

            let available = Self::capacity(&self.quotas, &snapshot);
            if available == 0 {
                tracing::info!(
                    poll_secs = self.quotas.poll_interval.as_secs(),
                    "Quota exhausted, waiting for running jobs to progress"
                );
                if self.pause(self.quotas.poll_interval).await {
                    break;
                }
                continue;
            }

            let mut launched_this_cycle = 0usize;
            for job in candidates {
                if launched_this_cycle == available || self.shutdown.is_cancelled() {
                    break;
                }
                if job.points.is_empty() {
                    tracing::warn!(job = %job.key, "No scan points, nothing to submit");
                    continue;
                }
                if self.exists_on_disk(job) {
                    tracing::debug!(job = %job.key, "Already on disk, skipping");
                    continue;
                }

                cards::materialize(job, self.tracker.dir())?;
                match self.launcher.launch(job, self.tracker.dir()).await {
                    Ok(0) => {
                        launched_this_cycle += 1;
                        stats.submitted += 1;
                        tracing::info!(job = %job.key, "Submitted");
                        if self.pause(self.quotas.submit_delay).await {
                            break;
                        }
                    }
                    Ok(code) => {
                        tracing::error!(
                            job = %job.key,
                            code,
                            "Launcher exited nonzero; artifacts left on disk, job will not be retried"
                        );
                    }
                    Err(error) => {
                        tracing::error!(job = %job.key, %error, "Launch invocation failed");
                    }
                }
            }

            if self.shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, stopping submission loop");
                break;
            }
            if launched_this_cycle == 0
                && candidates
                    .iter()
                    .all(|job| job.points.is_empty() || self.exists_on_disk(job))
            {
                tracing::info!(
                    submitted = stats.submitted,
                    cycles = stats.cycles,
                    "Nothing left to submit; still-running jobs will complete on their own"
                );
                break;
            }
        }
        stats.skipped = candidates.len().saturating_sub(stats.submitted);
        Ok(stats)
    }

    /// Sleep unless cancelled first; returns true when shutting down.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = self.shutdown.cancelled() => true,
        }
    }

    fn log_snapshot(&self, snapshot: &TrackerSnapshot) {
        tracing::info!(
            total = snapshot.all.len(),
            codegen = snapshot.codegen.len(),
            integrate = snapshot.integrate_full.len(),
            integrate_counted = snapshot.integrate.len(),
            finished = snapshot.finished.len(),
            "Poll"
        );
        for job in &snapshot.all {
            if job.phase == Phase::Integrate {
                tracing::debug!(
                    job = %job.key,
                    elapsed = %format_elapsed(job.phase_elapsed),
                    "Integrating"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{JobKey, JobSnapshot};
    use chrono::Utc;

    fn keys(n: usize) -> Vec<JobKey> {
        (0..n)
            .map(|i| JobKey::new("p", "t", format!("run{i}")))
            .collect()
    }

    fn snapshot(codegen: usize, integrate: usize, running: usize) -> TrackerSnapshot {
        TrackerSnapshot {
            taken_at: Utc::now(),
            all: Vec::<JobSnapshot>::new(),
            running: keys(running),
            codegen: keys(codegen),
            integrate: keys(integrate),
            integrate_full: keys(integrate),
            finished: Vec::new(),
        }
    }

    fn quotas(max_codegen: usize, max_integrate: usize, max_total: usize) -> QuotaConfig {
        QuotaConfig {
            max_codegen,
            max_integrate,
            max_total_running: max_total,
            ..QuotaConfig::default()
        }
    }

    type TestScheduler = SubmissionScheduler<crate::launcher::ScriptLauncher>;

    #[test]
    fn capacity_is_the_tightest_quota() {
        // codegen=2, integrate=1, running=3 against 2/2/3 -> min(0, 1, 0).
        let available = TestScheduler::capacity(&quotas(2, 2, 3), &snapshot(2, 1, 3));
        assert_eq!(available, 0);
    }

    #[test]
    fn capacity_never_goes_negative() {
        let available = TestScheduler::capacity(&quotas(1, 1, 1), &snapshot(4, 4, 8));
        assert_eq!(available, 0);
    }

    #[test]
    fn capacity_with_idle_directory_is_the_smallest_cap() {
        let available = TestScheduler::capacity(&quotas(5, 3, 50), &snapshot(0, 0, 0));
        assert_eq!(available, 3);
    }
}
