use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use gridsweep::config::{ProcessRegistry, QuotaConfig};
use gridsweep::launcher::ScriptLauncher;
use gridsweep::plan::{build_candidates, SweepRequest};
use gridsweep::scheduler::SubmissionScheduler;
use gridsweep::shutdown::install_shutdown_handler;
use gridsweep::tracker::{format_elapsed, JobTracker, DEFAULT_PLATFORM};

#[derive(Parser, Debug)]
#[command(name = "gridsweep")]
#[command(version)]
#[command(about = "Plan, submit and track gridpack scan-point sweeps")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Show the phase of every job found in a working directory
    Status(StatusArgs),

    /// Expand a sweep request into candidate jobs without submitting
    Plan(PlanArgs),

    /// Run the polling submission loop until all candidates are on disk
    Run(RunArgs),
}

// =============================================================================
// Status Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct StatusArgs {
    /// Working directory to inspect
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Integrate age (minutes) beyond which a job stops counting toward quota
    #[arg(long, default_value = "45")]
    cutoff_mins: u64,

    /// Platform string in terminal tarball names
    #[arg(long, default_value = DEFAULT_PLATFORM)]
    platform: String,

    /// Also print the last N lines of each integrating job's log
    #[arg(long)]
    tail: Option<usize>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

// =============================================================================
// Plan Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Path to the sweep request JSON
    #[arg(long)]
    request: PathBuf,

    /// Path to the process registry JSON
    #[arg(long)]
    registry: PathBuf,

    /// Seed for reproducible anchor and point generation
    #[arg(long)]
    seed: Option<u64>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

// =============================================================================
// Run Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the sweep request JSON
    #[arg(long)]
    request: PathBuf,

    /// Path to the process registry JSON
    #[arg(long)]
    registry: PathBuf,

    /// Working directory jobs are configured and tracked in
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Submit command invoked as `<cmd> <process> <tag> <run> <workdir>`
    #[arg(long)]
    launch_cmd: String,

    /// Platform string in terminal tarball names
    #[arg(long, default_value = DEFAULT_PLATFORM)]
    platform: String,

    /// Seed for reproducible anchor and point generation
    #[arg(long)]
    seed: Option<u64>,

    /// Max jobs in the codegen phase at once
    #[arg(long, default_value = "5")]
    max_codegen: usize,

    /// Max jobs counted in the integrate phase at once
    #[arg(long, default_value = "5")]
    max_integrate: usize,

    /// Max running jobs overall
    #[arg(long, default_value = "50")]
    max_running: usize,

    /// Integrate age (minutes) beyond which a job stops counting toward quota
    #[arg(long, default_value = "45")]
    cutoff_mins: u64,

    /// Seconds to wait between polls when no capacity is available
    #[arg(long, default_value = "300")]
    poll_secs: u64,

    /// Seconds to wait after each successful submission
    #[arg(long, default_value = "10")]
    submit_delay_secs: u64,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JobStatusOutput {
    job: String,
    phase: String,
    elapsed_secs: u64,
}

#[derive(Serialize)]
struct StatusOutput {
    jobs: Vec<JobStatusOutput>,
    running: usize,
    codegen: usize,
    integrate: usize,
    integrate_counted: usize,
    finished: usize,
}

#[derive(Serialize)]
struct PlanItemOutput {
    job: String,
    axes: Vec<String>,
    start: Vec<(String, f64)>,
    points: usize,
}

#[derive(Serialize)]
struct PlanOutput {
    candidates: Vec<PlanItemOutput>,
}

// =============================================================================
// Command Handlers
// =============================================================================

fn handle_status(args: StatusArgs) -> Result<(), Box<dyn std::error::Error>> {
    let tracker = JobTracker::with_platform(&args.dir, &args.platform);
    let cutoff = Duration::from_secs(args.cutoff_mins * 60);
    let snapshot = tracker.snapshot(Some(cutoff));

    match args.output {
        OutputFormat::Json => {
            let output = StatusOutput {
                jobs: snapshot
                    .all
                    .iter()
                    .map(|job| JobStatusOutput {
                        job: job.key.to_string(),
                        phase: job.phase.to_string(),
                        elapsed_secs: job.phase_elapsed.as_secs(),
                    })
                    .collect(),
                running: snapshot.running.len(),
                codegen: snapshot.codegen.len(),
                integrate: snapshot.integrate_full.len(),
                integrate_counted: snapshot.integrate.len(),
                finished: snapshot.finished.len(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if snapshot.all.is_empty() {
                println!("No jobs found in {}.", args.dir.display());
                return Ok(());
            }
            println!("{:<40} {:<12} ELAPSED", "JOB", "PHASE");
            println!("{}", "-".repeat(64));
            for job in &snapshot.all {
                println!(
                    "{:<40} {:<12} {}",
                    job.key.to_string(),
                    job.phase.to_string(),
                    format_elapsed(job.phase_elapsed)
                );
            }
            println!();
            println!(
                "Running: {} (codegen {}, integrating {}, {} within cutoff)  Finished: {}",
                snapshot.running.len(),
                snapshot.codegen.len(),
                snapshot.integrate_full.len(),
                snapshot.integrate.len(),
                snapshot.finished.len()
            );
            if let Some(lines) = args.tail {
                for key in &snapshot.integrate_full {
                    let tail = tracker.tail_log(key, lines)?;
                    if tail.is_empty() {
                        continue;
                    }
                    println!();
                    println!("{} (last {} lines):", key, lines);
                    for line in tail {
                        println!("  {}", line);
                    }
                }
            }
        }
    }
    Ok(())
}

fn handle_plan(args: PlanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ProcessRegistry::from_json_file(&args.registry)?;
    let request = SweepRequest::from_json_file(&args.request)?;
    let mut rng = make_rng(args.seed);
    let candidates = build_candidates(&registry, &request, &mut rng)?;

    match args.output {
        OutputFormat::Json => {
            let output = PlanOutput {
                candidates: candidates
                    .iter()
                    .map(|c| PlanItemOutput {
                        job: c.key.to_string(),
                        axes: c.dofs.iter().map(|d| d.name().to_string()).collect(),
                        start: c.start.iter().map(|(n, v)| (n.to_string(), v)).collect(),
                        points: c.points.len(),
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if candidates.is_empty() {
                println!("No candidates (check the process registry).");
                return Ok(());
            }
            println!("{:<40} {:<8} {:<24} START", "JOB", "POINTS", "AXES");
            println!("{}", "-".repeat(100));
            for candidate in &candidates {
                let axes = candidate
                    .dofs
                    .iter()
                    .map(|d| d.name())
                    .collect::<Vec<_>>()
                    .join(",");
                println!(
                    "{:<40} {:<8} {:<24} {}",
                    candidate.key.to_string(),
                    candidate.points.len(),
                    axes,
                    candidate.start
                );
            }
            println!();
            println!("{} candidate jobs", candidates.len());
        }
    }
    Ok(())
}

async fn handle_run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ProcessRegistry::from_json_file(&args.registry)?;
    let request = SweepRequest::from_json_file(&args.request)?;
    let mut rng = make_rng(args.seed);
    let candidates = build_candidates(&registry, &request, &mut rng)?;

    let quotas = QuotaConfig {
        max_codegen: args.max_codegen,
        max_integrate: args.max_integrate,
        max_total_running: args.max_running,
        integrate_cutoff: Duration::from_secs(args.cutoff_mins * 60),
        poll_interval: Duration::from_secs(args.poll_secs),
        submit_delay: Duration::from_secs(args.submit_delay_secs),
    };

    tracing::info!(
        dir = %args.dir.display(),
        candidates = candidates.len(),
        max_codegen = quotas.max_codegen,
        max_integrate = quotas.max_integrate,
        max_running = quotas.max_total_running,
        "Starting submission loop"
    );

    let tracker = JobTracker::with_platform(&args.dir, &args.platform);
    let launcher = ScriptLauncher::new(args.launch_cmd);
    let shutdown = install_shutdown_handler();
    let scheduler = SubmissionScheduler::new(tracker, quotas, launcher)?.with_shutdown(shutdown);

    let stats = scheduler.run(&candidates).await?;
    tracing::info!(
        submitted = stats.submitted,
        skipped = stats.skipped,
        cycles = stats.cycles,
        "Submission loop finished"
    );
    Ok(())
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging before dispatch: plan and status emit warnings too
    // (unknown processes, unreadable directories). Logs go to stderr so table
    // and JSON output on stdout stay parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Status(status_args) => handle_status(status_args)?,
        Commands::Plan(plan_args) => handle_plan(plan_args)?,
        Commands::Run(run_args) => handle_run(run_args).await?,
    }

    Ok(())
}
