//! Sandboxed script execution.
//!
//! [`SandboxExecutor::execute`] writes the script into a fresh temporary
//! directory, runs the interpreter there with a cleared environment and a
//! hard deadline, removes the directory on every path, and finally writes
//! the job's two artifacts into the persistent artifact directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use super::artifacts::ResultArtifacts;
use super::executor::ScriptInput;
use super::outcome::ExecutionResult;
use super::subprocess;
use crate::error::{CoreError, CoreResult};
use crate::types::JobId;

/// Default wall-clock limit for one script.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Prefix of every ephemeral sandbox directory.
const SANDBOX_PREFIX: &str = "offload-sandbox-";

/// How scripts are run and where their artifacts land.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Interpreter program, resolved through the passed-through `PATH`.
    pub interpreter: String,
    /// Flags placed before the script path.
    pub interpreter_args: Vec<String>,
    /// Extension of the script file written into the sandbox.
    pub script_extension: String,
    pub timeout: Duration,
    /// Names of variables copied from this process into the child.
    pub env_passthrough: Vec<String>,
    /// Persistent directory receiving `{jobId}.sout` / `{jobId}.eout`.
    /// Empty means the current directory.
    pub artifact_dir: PathBuf,
    /// Parent of the sandbox directories, the system temp dir if `None`.
    pub sandbox_root: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".into(),
            // Isolated mode, no `site` import.
            interpreter_args: vec!["-I".into(), "-S".into()],
            script_extension: "py".into(),
            timeout: DEFAULT_TIMEOUT,
            env_passthrough: vec!["PATH".into()],
            artifact_dir: PathBuf::new(),
            sandbox_root: None,
        }
    }
}

/// Everything known about one finished execution.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub job_id: JobId,
    pub result: ExecutionResult,
    pub artifacts: ResultArtifacts,
    /// Sandbox the script ran in. Already removed when the report exists.
    pub sandbox_dir: Option<PathBuf>,
}

impl ExecutionReport {
    /// Output artifact location, the value a job's promise completes with.
    pub fn location(&self) -> String {
        self.artifacts.location()
    }
}

/// A script run that has not been written out yet.
#[derive(Debug)]
pub struct SandboxRun {
    pub result: ExecutionResult,
    pub sandbox_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct SandboxExecutor {
    config: SandboxConfig,
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `script_content` and persist its artifacts.
    ///
    /// Only a failure to write the artifacts (or an id that cannot name
    /// them) is returned as an error; anything that goes wrong with the
    /// script itself is recorded in the error artifact.
    pub async fn execute(&self, script_content: &str, job_id: &JobId) -> CoreResult<ExecutionReport> {
        if !job_id.is_file_safe() {
            return Err(CoreError::InvalidJobId(job_id.to_string()));
        }

        tracing::info!(job_id = %job_id, "Executing script");
        let run = self.run(script_content, job_id).await;
        tracing::info!(
            job_id = %job_id,
            outcome = run.result.outcome.label(),
            duration_ms = run.result.duration_ms,
            "Done executing",
        );

        let artifacts = ResultArtifacts::for_job(&self.config.artifact_dir, job_id.as_str());
        artifacts.write(&run.result).await?;
        tracing::info!(
            job_id = %job_id,
            output = %artifacts.output_path.display(),
            error = %artifacts.error_path.display(),
            "Results written",
        );

        Ok(ExecutionReport {
            job_id: job_id.clone(),
            result: run.result,
            artifacts,
            sandbox_dir: run.sandbox_dir,
        })
    }

    /// Run the script inside a throwaway directory without writing artifacts.
    pub async fn run(&self, script_content: &str, job_id: &JobId) -> SandboxRun {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SANDBOX_PREFIX);
        let created = match &self.config.sandbox_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        let sandbox = match created {
            Ok(dir) => dir,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to create sandbox");
                return SandboxRun {
                    result: ExecutionResult::unexpected(format!("failed to create sandbox: {e}")),
                    sandbox_dir: None,
                };
            }
        };
        let sandbox_dir = sandbox.path().to_path_buf();

        let result = self.run_in(sandbox.path(), script_content, job_id).await;

        // Best-effort removal; a leftover directory does not fail the job.
        if let Err(e) = sandbox.close() {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to remove sandbox");
        }

        SandboxRun {
            result,
            sandbox_dir: Some(sandbox_dir),
        }
    }

    async fn run_in(&self, sandbox: &Path, script_content: &str, job_id: &JobId) -> ExecutionResult {
        let script_name = format!("sandboxed_script-{job_id}.{}", self.config.script_extension);
        if let Err(e) = tokio::fs::write(sandbox.join(&script_name), script_content).await {
            return ExecutionResult::unexpected(format!("failed to write script: {e}"));
        }

        let input = ScriptInput {
            env_vars: self.passthrough_env(),
            working_directory: sandbox.to_path_buf(),
            timeout: self.config.timeout,
        };

        let mut cmd = Command::new(&self.config.interpreter);
        // Relative to the sandbox, which is the child's working directory.
        cmd.args(&self.config.interpreter_args).arg(&script_name);

        let result = subprocess::run_command(&mut cmd, &input).await;
        ExecutionResult::classify(result, self.config.timeout)
    }

    fn passthrough_env(&self) -> Vec<(String, String)> {
        self.config
            .env_passthrough
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|value| (name.clone(), value)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
