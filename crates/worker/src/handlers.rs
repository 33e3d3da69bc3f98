//! Capabilities this worker can run.

use std::sync::Arc;

use async_trait::async_trait;
use offload_core::registry::{Handler, HandlerError, RetryPolicy, WorkerRegistry};
use offload_core::scripting::SandboxExecutor;
use offload_core::{CoreResult, JobId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capability name of the sandboxed script run.
pub const EXECUTE: &str = "execute";

/// Arguments of the [`EXECUTE`] capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteArgs {
    pub script_content: String,
    /// Names the artifacts. May differ from the promise id (detached runs
    /// keep the parent's artifact names).
    pub job_id: JobId,
}

/// Runs a script in the sandbox and returns the output artifact location.
pub struct ExecuteHandler {
    executor: SandboxExecutor,
}

impl ExecuteHandler {
    pub fn new(executor: SandboxExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Handler for ExecuteHandler {
    async fn call(&self, args: Value) -> Result<Value, HandlerError> {
        let args: ExecuteArgs = serde_json::from_value(args)?;
        let report = self
            .executor
            .execute(&args.script_content, &args.job_id)
            .await
            .map_err(|e| HandlerError::Failed(e.to_string()))?;
        Ok(Value::String(report.location()))
    }
}

/// Registry with every capability served by a worker.
pub fn default_registry(executor: SandboxExecutor) -> CoreResult<WorkerRegistry> {
    WorkerRegistry::new().with(
        EXECUTE,
        Arc::new(ExecuteHandler::new(executor)),
        RetryPolicy::Never,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use offload_core::scripting::SandboxConfig;
    use serde_json::json;

    use super::*;

    fn shell_executor(dir: &std::path::Path) -> SandboxExecutor {
        SandboxExecutor::new(SandboxConfig {
            interpreter: "sh".into(),
            interpreter_args: vec![],
            script_extension: "sh".into(),
            timeout: Duration::from_secs(5),
            artifact_dir: dir.to_path_buf(),
            ..SandboxConfig::default()
        })
    }

    #[tokio::test]
    async fn execute_returns_output_location() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let handler = ExecuteHandler::new(shell_executor(dir.path()));

        let value = handler
            .call(json!({"script_content": "echo hi\n", "job_id": "h1"}))
            .await
            .expect("call");

        assert_eq!(value, json!(dir.path().join("h1.sout").display().to_string()));
    }

    #[tokio::test]
    async fn malformed_args_are_rejected() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let handler = ExecuteHandler::new(shell_executor(dir.path()));
        assert_matches!(
            handler.call(json!({"script": 1})).await,
            Err(HandlerError::InvalidArgs(_))
        );
    }

    #[tokio::test]
    async fn unwritable_artifacts_fail_the_call() {
        let dir = tempfile::tempdir().expect("create temp dir");
        // A regular file where the artifact directory should be.
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, "").expect("write file");
        let handler = ExecuteHandler::new(shell_executor(&blocked));

        assert_matches!(
            handler
                .call(json!({"script_content": "echo hi\n", "job_id": "h2"}))
                .await,
            Err(HandlerError::Failed(_))
        );
    }

    #[test]
    fn default_registry_serves_execute() {
        let registry = default_registry(SandboxExecutor::default()).expect("registry");
        let registration = registry.get(EXECUTE).expect("execute registered");
        assert_eq!(registration.retry_policy, RetryPolicy::Never);
    }
}
