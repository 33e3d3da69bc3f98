//! Worker pool loop.
//!
//! A pool is `size` long-lived Tokio tasks draining the same group queue.
//! Each worker handles one task at a time: look up the capability, run the
//! handler, settle the promise. Handlers are never re-run on failure.

use std::sync::Arc;

use offload_core::promise::PromiseStore;
use offload_core::registry::WorkerRegistry;
use offload_core::routing::{Task, TaskQueue};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct WorkerPool {
    group: String,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `size` workers polling `queue`.
    ///
    /// Workers stop when `cancel` fires (after finishing their current
    /// task) or when the queue closes and is drained.
    pub fn spawn(
        queue: TaskQueue,
        size: usize,
        registry: Arc<WorkerRegistry>,
        store: Arc<dyn PromiseStore>,
        cancel: CancellationToken,
    ) -> Self {
        let group = queue.group().to_string();
        let handles = (0..size.max(1))
            .map(|worker| {
                let queue = queue.clone();
                let registry = Arc::clone(&registry);
                let store = Arc::clone(&store);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    run_worker(worker, queue, registry, store, cancel).await;
                })
            })
            .collect::<Vec<_>>();

        tracing::info!(group = %group, workers = handles.len(), "Worker pool started");
        Self { group, handles }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker of the pool to stop.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(group = %self.group, error = %e, "Worker task panicked");
            }
        }
        tracing::info!(group = %self.group, "Worker pool stopped");
    }
}

async fn run_worker(
    worker: usize,
    queue: TaskQueue,
    registry: Arc<WorkerRegistry>,
    store: Arc<dyn PromiseStore>,
    cancel: CancellationToken,
) {
    tracing::debug!(group = queue.group(), worker, "Worker polling");

    loop {
        let task = tokio::select! {
            _ = cancel.cancelled() => break,
            task = queue.next() => match task {
                Some(task) => task,
                None => break,
            },
        };
        handle_task(&registry, store.as_ref(), task).await;
    }

    tracing::debug!(group = queue.group(), worker, "Worker stopped");
}

/// Run one task and settle its promise.
pub async fn handle_task(registry: &WorkerRegistry, store: &dyn PromiseStore, task: Task) {
    let id = task.promise_id;

    match store.get(&id).await {
        Ok(Some(record)) if record.state.is_settled() => {
            tracing::warn!(job_id = %id, state = ?record.state, "Promise already settled, skipping task");
            return;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(job_id = %id, error = %e, "Could not read promise before running");
        }
    }

    let Some(registration) = registry.get(&task.capability) else {
        tracing::error!(job_id = %id, capability = %task.capability, "Unknown capability");
        settle(store, &id, Err(format!("unknown capability '{}'", task.capability))).await;
        return;
    };

    tracing::info!(job_id = %id, capability = %task.capability, "Running task");
    let outcome = registration
        .handler
        .call(task.args)
        .await
        .map_err(|e| e.to_string());

    if let Err(message) = &outcome {
        // Retry policy `Never`: the failure is final.
        tracing::error!(job_id = %id, capability = %task.capability, error = %message, "Task failed");
    }
    settle(store, &id, outcome).await;
}

async fn settle(
    store: &dyn PromiseStore,
    id: &offload_core::JobId,
    outcome: Result<serde_json::Value, String>,
) {
    let settled = match outcome {
        Ok(value) => store.resolve(id, value).await,
        Err(message) => store.reject(id, message).await,
    };
    match settled {
        Ok(record) => tracing::info!(job_id = %id, state = ?record.state, "Promise settled"),
        Err(e) => tracing::warn!(job_id = %id, error = %e, "Failed to settle promise"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
