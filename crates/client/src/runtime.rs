//! In-process worker runtime.
//!
//! Wires a [`LocalRouter`], one [`WorkerPool`] per configured machine type
//! and an [`Invoker`] over a shared promise store, so a single process can
//! both submit and execute jobs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use offload_core::invoke::Invoker;
use offload_core::promise::PromiseStore;
use offload_core::routing::LocalRouter;
use offload_core::scripting::SandboxExecutor;
use offload_core::JobId;
use offload_worker::{default_registry, WorkerConfig, WorkerPool};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::coordinator::{read_script, Coordinator, ResultLocation};
use crate::error::ClientResult;
use crate::lookup::ResultLookup;

pub struct EmbeddedRuntime {
    router: Arc<LocalRouter>,
    store: Arc<dyn PromiseStore>,
    invoker: Invoker,
    pools: Vec<WorkerPool>,
    watchers: TaskTracker,
}

impl EmbeddedRuntime {
    /// Register every pool of `worker` and start its workers.
    ///
    /// Pending promises left behind by a process that is gone are rejected
    /// first; no worker of this runtime would ever pick them up.
    pub async fn start(
        store: Arc<dyn PromiseStore>,
        worker: &WorkerConfig,
        poll_interval: Duration,
    ) -> ClientResult<Self> {
        let abandoned = store.reject_orphans().await?;
        if !abandoned.is_empty() {
            tracing::warn!(count = abandoned.len(), ids = ?abandoned, "Rejected abandoned promises");
        }

        let router = Arc::new(LocalRouter::new());
        let registry = Arc::new(default_registry(SandboxExecutor::new(worker.sandbox()))?);
        // Workers stop once the router closes and their queue is drained.
        let cancel = CancellationToken::new();

        let mut pools = Vec::with_capacity(worker.pools.len());
        for group in &worker.pools {
            let queue = router.register_group(group.as_str()).await;
            pools.push(WorkerPool::spawn(
                queue,
                worker.workers_per_pool,
                Arc::clone(&registry),
                Arc::clone(&store),
                cancel.clone(),
            ));
        }

        let invoker =
            Invoker::new(Arc::clone(&store), router.clone()).with_poll_interval(poll_interval);

        tracing::info!(pools = ?worker.pools, "Embedded runtime started");
        Ok(Self {
            router,
            store,
            invoker,
            pools,
            watchers: TaskTracker::new(),
        })
    }

    pub fn coordinator(&self) -> Coordinator {
        Coordinator::new(self.invoker.clone(), self.watchers.clone())
    }

    pub fn lookup(&self) -> ResultLookup {
        ResultLookup::new(Arc::clone(&self.store))
    }

    /// Stop accepting tasks, let workers drain what is queued, then wait
    /// for detached watchers to settle their promises.
    pub async fn shutdown(self) {
        self.router.close().await;
        for pool in self.pools {
            pool.join().await;
        }
        self.watchers.close();
        self.watchers.wait().await;
        tracing::info!("Embedded runtime stopped");
    }
}

/// Run the script in a sandbox in this process, bypassing promises.
pub async fn execute_locally(
    worker: &WorkerConfig,
    script_path: &Path,
    job_id: &JobId,
) -> ClientResult<ResultLocation> {
    let script_content = read_script(script_path).await?;
    let executor = SandboxExecutor::new(worker.sandbox());
    tracing::info!(job_id = %job_id, "Executing script locally");
    let report = executor.execute(&script_content, job_id).await?;
    Ok(report.location())
}
