use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Suffix of the manifest file written at configuration time. Its presence is
/// what makes a job discoverable at all.
pub const MANIFEST_SUFFIX: &str = "_scanpoints.txt";

/// Platform string baked into the terminal tarball name by the external tool.
pub const DEFAULT_PLATFORM: &str = "slc6_amd64_gcc630_CMSSW_9_3_0";

/// Identifier of one job within a working directory, composed of
/// (process, tag, run). Rendered as `{process}_{tag}_{run}`, which is why the
/// individual parts must not contain underscores.
///
/// A key is the join point between a candidate configuration and the
/// artifacts the external tool leaves behind; it is never reused once the job
/// has been observed finished.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    process: String,
    tag: String,
    run: String,
}

impl JobKey {
    pub fn new(process: impl Into<String>, tag: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            tag: tag.into(),
            run: run.into(),
        }
    }

    pub fn process(&self) -> &str {
        &self.process
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn run(&self) -> &str {
        &self.run
    }

    /// Recover a key from a manifest filename. Returns `None` when the stem
    /// does not decompose into exactly three parts; such files are not jobs.
    pub fn from_manifest_name(file_name: &str) -> Option<JobKey> {
        let stem = file_name.strip_suffix(MANIFEST_SUFFIX)?;
        let mut parts = stem.split('_');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(process), Some(tag), Some(run), None)
                if !process.is_empty() && !tag.is_empty() && !run.is_empty() =>
            {
                Some(JobKey::new(process, tag, run))
            }
            _ => None,
        }
    }

    /// Manifest written at configuration time; marks the job as existing.
    pub fn manifest(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{self}{MANIFEST_SUFFIX}"))
    }

    /// Terminal artifact: the packaged output bundle.
    pub fn tarball(&self, dir: &Path, platform: &str) -> PathBuf {
        dir.join(format!("{self}_{platform}_tarball.tar.xz"))
    }

    /// Execution log; absent while code generation is still running.
    pub fn run_log(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{self}.log"))
    }

    /// Codegen timing log; its mtime anchors the integrate-elapsed estimate.
    pub fn codegen_log(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{self}_codegen.log"))
    }

    /// Pre-execution markers; any of these present means the job is still in
    /// the codegen phase.
    pub fn pre_execution_markers(&self, dir: &Path) -> [PathBuf; 3] {
        [
            dir.join(format!("input_{self}.tar.gz")),
            dir.join(format!("codegen_{self}.sh")),
            dir.join(format!("codegen_{self}.jdl")),
        ]
    }

    /// Reweight card emitted next to the manifest at configuration time.
    pub fn reweight_card(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{self}_reweight_card.dat"))
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.process, self.tag, self.run)
    }
}
