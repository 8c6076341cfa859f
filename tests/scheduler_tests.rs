use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use gridsweep::config::{ProcessSpec, QuotaConfig};
use gridsweep::error::Result;
use gridsweep::launcher::Launcher;
use gridsweep::plan::CandidateJob;
use gridsweep::scheduler::SubmissionScheduler;
use gridsweep::scan::{DegreeOfFreedom, ScanPoint};
use gridsweep::tracker::{JobKey, JobTracker, DEFAULT_PLATFORM};

/// Launcher that records invocations and optionally finishes the job on the
/// spot by dropping its tarball, so the next poll sees it terminal.
#[derive(Clone)]
struct RecordingLauncher {
    launched: Arc<Mutex<Vec<String>>>,
    exit_code: i32,
    finish: bool,
}

impl RecordingLauncher {
    fn new(exit_code: i32, finish: bool) -> Self {
        Self {
            launched: Arc::new(Mutex::new(Vec::new())),
            exit_code,
            finish,
        }
    }

    fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }
}

impl Launcher for RecordingLauncher {
    async fn launch(&self, job: &CandidateJob, dir: &Path) -> Result<i32> {
        self.launched.lock().unwrap().push(job.key.to_string());
        if self.finish {
            fs::write(job.key.tarball(dir, DEFAULT_PLATFORM), b"x")?;
        }
        Ok(self.exit_code)
    }
}

fn candidate(run: usize) -> CandidateJob {
    let dof = DegreeOfFreedom::simple("ctW").with_limits(5.0, -10.0, 10.0);
    let start: ScanPoint = [("ctW".to_string(), 5.0)].into_iter().collect();
    let points = vec![[("ctW".to_string(), -10.0)].into_iter().collect()];
    CandidateJob {
        key: JobKey::new("ttH", "scan", format!("run{run}")),
        spec: ProcessSpec {
            name: "ttH".to_string(),
            process_card: "ttH.dat".to_string(),
            template_dir: "templates".to_string(),
        },
        dofs: vec![dof],
        start,
        points,
    }
}

fn fast_quotas(max_codegen: usize) -> QuotaConfig {
    QuotaConfig {
        max_codegen,
        max_integrate: 5,
        max_total_running: 50,
        integrate_cutoff: Duration::from_secs(45 * 60),
        poll_interval: Duration::from_millis(5),
        submit_delay: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn test_every_candidate_is_submitted_once() {
    let dir = tempdir().unwrap();
    let launcher = RecordingLauncher::new(0, false);
    let scheduler = SubmissionScheduler::new(
        JobTracker::new(dir.path()),
        fast_quotas(5),
        launcher.clone(),
    )
    .unwrap();

    let candidates = vec![candidate(0), candidate(1), candidate(2)];
    let stats = scheduler.run(&candidates).await.unwrap();

    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.skipped, 0);
    assert_eq!(
        launcher.launched(),
        vec!["ttH_scan_run0", "ttH_scan_run1", "ttH_scan_run2"]
    );
    for job in &candidates {
        assert!(job.key.manifest(dir.path()).exists());
        assert!(job.key.reweight_card(dir.path()).exists());
    }
}

#[tokio::test]
async fn test_quota_paces_submissions_across_cycles() {
    let dir = tempdir().unwrap();
    // Finishing launches keep capacity opening back up one job at a time.
    let launcher = RecordingLauncher::new(0, true);
    let scheduler = SubmissionScheduler::new(
        JobTracker::new(dir.path()),
        fast_quotas(1),
        launcher.clone(),
    )
    .unwrap();

    let candidates = vec![candidate(0), candidate(1), candidate(2)];
    let stats = scheduler.run(&candidates).await.unwrap();

    assert_eq!(stats.submitted, 3);
    // One submission per cycle plus the final empty pass.
    assert_eq!(stats.cycles, 4);
}

#[tokio::test]
async fn test_existing_artifacts_are_never_resubmitted() {
    let dir = tempdir().unwrap();
    let candidates = vec![candidate(0), candidate(1)];
    fs::write(candidates[0].key.manifest(dir.path()), b"x").unwrap();
    fs::write(candidates[1].key.run_log(dir.path()), b"x").unwrap();

    let launcher = RecordingLauncher::new(0, false);
    let scheduler = SubmissionScheduler::new(
        JobTracker::new(dir.path()),
        fast_quotas(5),
        launcher.clone(),
    )
    .unwrap();

    let stats = scheduler.run(&candidates).await.unwrap();
    assert_eq!(stats.submitted, 0);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.cycles, 1);
    assert!(launcher.launched().is_empty());
}

#[tokio::test]
async fn test_failed_launches_are_not_counted_or_retried() {
    let dir = tempdir().unwrap();
    let launcher = RecordingLauncher::new(1, false);
    let scheduler = SubmissionScheduler::new(
        JobTracker::new(dir.path()),
        fast_quotas(5),
        launcher.clone(),
    )
    .unwrap();

    let candidates = vec![candidate(0), candidate(1)];
    let stats = scheduler.run(&candidates).await.unwrap();

    // The cards were materialized before the failed launch, so the jobs look
    // submitted on the next pass and are not retried.
    assert_eq!(stats.submitted, 0);
    assert_eq!(stats.skipped, 2);
    assert_eq!(launcher.launched().len(), 2);
}

#[tokio::test]
async fn test_cancellation_stops_the_loop_without_launching() {
    let dir = tempdir().unwrap();
    let launcher = RecordingLauncher::new(0, false);
    let token = CancellationToken::new();
    token.cancel();
    let scheduler = SubmissionScheduler::new(
        JobTracker::new(dir.path()),
        fast_quotas(5),
        launcher.clone(),
    )
    .unwrap()
    .with_shutdown(token);

    let candidates = vec![candidate(0)];
    let stats = scheduler.run(&candidates).await.unwrap();
    assert_eq!(stats.submitted, 0);
    assert_eq!(stats.skipped, 1);
    assert!(launcher.launched().is_empty());
    assert!(!candidates[0].key.manifest(dir.path()).exists());
}

#[tokio::test]
async fn test_pointless_candidates_are_skipped_not_launched() {
    let dir = tempdir().unwrap();
    let launcher = RecordingLauncher::new(0, false);
    let scheduler = SubmissionScheduler::new(
        JobTracker::new(dir.path()),
        fast_quotas(5),
        launcher.clone(),
    )
    .unwrap();

    let mut empty = candidate(0);
    empty.points.clear();
    let candidates = vec![empty, candidate(1)];
    let stats = scheduler.run(&candidates).await.unwrap();

    // The pointless job never launches and leaves no artifacts behind; the
    // loop still terminates once the real job is on disk.
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(launcher.launched(), vec!["ttH_scan_run1"]);
    assert!(!candidates[0].key.manifest(dir.path()).exists());
    assert!(!candidates[0].key.reweight_card(dir.path()).exists());
}

#[tokio::test]
async fn test_empty_candidate_list_finishes_immediately() {
    let dir = tempdir().unwrap();
    let launcher = RecordingLauncher::new(0, false);
    let scheduler =
        SubmissionScheduler::new(JobTracker::new(dir.path()), fast_quotas(5), launcher).unwrap();

    let stats = scheduler.run(&[]).await.unwrap();
    assert_eq!(stats.submitted, 0);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.cycles, 1);
}
