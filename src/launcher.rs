use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Result, SweepError};
use crate::plan::CandidateJob;

/// External launch collaborator.
///
/// The scheduler blocks only on the invocation returning, never on job
/// completion: batch backends submit and return immediately, and progress is
/// observed afterwards through filesystem artifacts alone.
pub trait Launcher {
    /// Start one configured job; returns the submission exit code.
    fn launch(
        &self,
        job: &CandidateJob,
        dir: &Path,
    ) -> impl std::future::Future<Output = Result<i32>>;
}

/// Launches jobs by invoking a submit command with the job key parts and
/// working directory as arguments:
/// `<program> <process> <tag> <run> <workdir>`.
#[derive(Debug, Clone)]
pub struct ScriptLauncher {
    program: String,
}

impl ScriptLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Launcher for ScriptLauncher {
    async fn launch(&self, job: &CandidateJob, dir: &Path) -> Result<i32> {
        tracing::info!(job = %job.key, program = %self.program, "Invoking launcher");

        let output = Command::new(&self.program)
            .arg(job.key.process())
            .arg(job.key.tag())
            .arg(job.key.run())
            .arg(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SweepError::Launch {
                job: job.key.to_string(),
                reason: e.to_string(),
            })?;

        let code = output.status.code().unwrap_or(-1);
        if output.status.success() {
            tracing::info!(job = %job.key, "Launcher invocation returned");
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(
                job = %job.key,
                code,
                stderr = %stderr.trim(),
                "Launcher reported failure"
            );
        }
        Ok(code)
    }
}
