//! Durable result artifacts: `{jobId}.sout` and `{jobId}.eout`.

use std::path::{Path, PathBuf};

use tokio::fs;

use super::outcome::ExecutionResult;

/// Extension of the output artifact.
pub const OUTPUT_EXTENSION: &str = "sout";
/// Extension of the error artifact.
pub const ERROR_EXTENSION: &str = "eout";

/// Locations of the two artifacts of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultArtifacts {
    pub output_path: PathBuf,
    pub error_path: PathBuf,
}

impl ResultArtifacts {
    /// Artifact paths for `job_id` inside `dir`.
    ///
    /// An empty `dir` yields bare file names relative to the current
    /// directory.
    pub fn for_job(dir: &Path, job_id: &str) -> Self {
        Self {
            output_path: dir.join(format!("{job_id}.{OUTPUT_EXTENSION}")),
            error_path: dir.join(format!("{job_id}.{ERROR_EXTENSION}")),
        }
    }

    /// Write both artifacts. Streams without content become empty files.
    pub async fn write(&self, result: &ExecutionResult) -> std::io::Result<()> {
        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&self.output_path, result.stdout.as_bytes()).await?;
        fs::write(&self.error_path, result.stderr.as_bytes()).await?;
        Ok(())
    }

    /// Location reported as the job's result value.
    pub fn location(&self) -> String {
        self.output_path.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
