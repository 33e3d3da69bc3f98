//! Submission coordinator.
//!
//! Reads the script, settles on a job id and sends the work to a machine
//! pool, either blocking on the result ([`Coordinator::submit_sync`]) or
//! fanning out a detached job ([`Coordinator::submit_async`]). Holds no
//! state between calls.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use offload_core::invoke::{Invocation, Invoker, JobHandle};
use offload_core::routing::poll;
use offload_core::{CoreError, JobId};
use offload_worker::{ExecuteArgs, EXECUTE};
use serde_json::Value;
use tokio_util::task::TaskTracker;

use crate::detached::DetachedFanout;
use crate::error::{ClientError, ClientResult};

/// Where a job's output artifact lives.
pub type ResultLocation = String;

/// One logical submission.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub script_path: PathBuf,
    /// Generated when `None`.
    pub job_id: Option<JobId>,
    pub machine_type: String,
    /// Block until the result is available.
    pub wait: bool,
}

#[derive(Clone)]
pub struct Coordinator {
    invoker: Invoker,
    detached: DetachedFanout,
}

impl Coordinator {
    /// Detached watchers are spawned on `watchers`.
    pub fn new(invoker: Invoker, watchers: TaskTracker) -> Self {
        let detached = DetachedFanout::new(invoker.clone(), watchers);
        Self { invoker, detached }
    }

    /// Submit in the mode selected by `request.wait`.
    ///
    /// Returns the output location in wait mode, `None` in detached mode.
    pub async fn submit(&self, request: SubmitRequest) -> ClientResult<Option<ResultLocation>> {
        let job_id = resolve_job_id(request.job_id)?;
        if request.wait {
            let location = self
                .submit_sync(&request.script_path, &job_id, &request.machine_type)
                .await?;
            Ok(Some(location))
        } else {
            self.submit_async(&request.script_path, &job_id, &request.machine_type)
                .await?;
            Ok(None)
        }
    }

    /// Run the script under `job_id` and wait for its output location.
    ///
    /// Any failure (missing script, routing, failed promise) is returned
    /// directly; nothing is retried.
    pub async fn submit_sync(
        &self,
        script_path: &Path,
        job_id: &JobId,
        machine_type: &str,
    ) -> ClientResult<ResultLocation> {
        check_job_id(job_id)?;
        let script_content = read_script(script_path).await?;
        let args = execute_args(script_content, job_id)?;

        tracing::info!(job_id = %job_id, machine_type, "Sending script for execution");
        let value = self
            .invoker
            .invoke_sync(Invocation::new(job_id.clone(), poll(machine_type), EXECUTE, args))
            .await?;
        Ok(into_location(value))
    }

    /// Fan out a detached run of the script and return at once.
    ///
    /// The script runs under `job_id`; the handle observes
    /// `detached_<job_id>`.
    pub async fn submit_async(
        &self,
        script_path: &Path,
        job_id: &JobId,
        machine_type: &str,
    ) -> ClientResult<JobHandle> {
        check_job_id(job_id)?;
        let script_content = read_script(script_path).await?;
        self.detached
            .invoke_detached(script_content, job_id, machine_type)
            .await
    }
}

/// Use the caller's id after validating it, or generate one.
pub fn resolve_job_id(job_id: Option<JobId>) -> ClientResult<JobId> {
    match job_id {
        Some(job_id) => {
            check_job_id(&job_id)?;
            Ok(job_id)
        }
        None => Ok(JobId::generate()),
    }
}

fn check_job_id(job_id: &JobId) -> ClientResult<()> {
    if job_id.is_detached() {
        return Err(ClientError::ReservedJobId(job_id.to_string()));
    }
    if !job_id.is_submittable() {
        return Err(ClientError::InvalidJobId(job_id.to_string()));
    }
    Ok(())
}

/// Read script content, mapping a missing file to [`ClientError::ScriptNotFound`].
pub async fn read_script(path: &Path) -> ClientResult<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            tracing::error!(path = %path.display(), "Script not found");
            ClientError::ScriptNotFound(path.to_path_buf())
        } else {
            ClientError::ScriptUnreadable {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}

fn execute_args(script_content: String, job_id: &JobId) -> ClientResult<Value> {
    let args = ExecuteArgs {
        script_content,
        job_id: job_id.clone(),
    };
    serde_json::to_value(args).map_err(|e| ClientError::Core(CoreError::from(e)))
}

/// Render a completion value as a location string.
pub fn into_location(value: Value) -> ResultLocation {
    match value {
        Value::String(location) => location,
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
