//! Detached (fire-and-forget) fan-out.
//!
//! The script runs as an ordinary `execute` invocation under the parent job
//! id, so an id that already ran is never run again. A second promise,
//! `detached_<parent>`, is settled with the parent's outcome by a watcher
//! task. The caller gets control back as soon as the parent is routed.

use std::sync::Arc;

use offload_core::invoke::{Invocation, Invoker, JobHandle};
use offload_core::promise::PromiseStore;
use offload_core::routing::poll;
use offload_core::{CoreError, CoreResult, JobId};
use offload_worker::{ExecuteArgs, EXECUTE};
use serde_json::Value;
use tokio_util::task::TaskTracker;

use crate::error::ClientResult;

#[derive(Clone)]
pub struct DetachedFanout {
    invoker: Invoker,
    watchers: TaskTracker,
}

impl DetachedFanout {
    /// Watcher tasks are spawned on `watchers`; wait on it before exiting.
    pub fn new(invoker: Invoker, watchers: TaskTracker) -> Self {
        Self { invoker, watchers }
    }

    /// Dispatch `script_content` to `machine_type` under `parent_job_id` and
    /// return a handle on `detached_<parent>`.
    ///
    /// Artifacts are the parent's (`{parent}.sout`). Routing and store
    /// failures fail the detached promise and are not returned here.
    pub async fn invoke_detached(
        &self,
        script_content: String,
        parent_job_id: &JobId,
        machine_type: &str,
    ) -> ClientResult<JobHandle> {
        let detached_id = parent_job_id.detached();
        let store = Arc::clone(self.invoker.store());

        let created = store.create(&detached_id).await?;
        let handle = self.invoker.handle(detached_id.clone());
        if !created.fresh {
            tracing::info!(
                job_id = %detached_id,
                state = ?created.record.state,
                "Detached promise already exists, joining",
            );
            return Ok(handle);
        }

        tracing::info!(
            job_id = %detached_id,
            parent_job_id = %parent_job_id,
            machine_type,
            "Submitting detached execution",
        );

        let parent = match self
            .dispatch_parent(script_content, parent_job_id, machine_type)
            .await
        {
            Ok(parent) => parent,
            Err(e) => {
                settle(store.as_ref(), &detached_id, Err(e.to_string())).await;
                return Ok(handle);
            }
        };

        match parent.try_result().await {
            Ok(Some(value)) => settle(store.as_ref(), &detached_id, Ok(value)).await,
            Err(e) => settle(store.as_ref(), &detached_id, Err(failure_message(e))).await,
            Ok(None) => {
                self.watchers.spawn(async move {
                    let outcome = parent.result().await.map_err(failure_message);
                    settle(store.as_ref(), &detached_id, outcome).await;
                });
            }
        }
        Ok(handle)
    }

    async fn dispatch_parent(
        &self,
        script_content: String,
        parent_job_id: &JobId,
        machine_type: &str,
    ) -> CoreResult<JobHandle> {
        let args = serde_json::to_value(ExecuteArgs {
            script_content,
            job_id: parent_job_id.clone(),
        })?;
        self.invoker
            .invoke_async(Invocation::new(
                parent_job_id.clone(),
                poll(machine_type),
                EXECUTE,
                args,
            ))
            .await
    }
}

fn failure_message(error: CoreError) -> String {
    match error {
        CoreError::InvocationFailed { message, .. } => message,
        other => other.to_string(),
    }
}

async fn settle(store: &dyn PromiseStore, id: &JobId, outcome: Result<Value, String>) {
    let settled = match outcome {
        Ok(value) => store.resolve(id, value).await,
        Err(message) => store.reject(id, message).await,
    };
    match settled {
        Ok(record) => tracing::info!(job_id = %id, state = ?record.state, "Detached promise settled"),
        Err(e) => tracing::warn!(job_id = %id, error = %e, "Failed to settle detached promise"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
