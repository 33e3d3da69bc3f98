//! Durable invocation on top of a promise store and a task router.
//!
//! Every invocation is keyed by a caller-chosen [`JobId`]. The promise is
//! created first; only the caller that creates it routes the task, so a
//! second invocation under the same id joins the first one instead of
//! running the work again.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::MissedTickBehavior;

use crate::error::{CoreError, CoreResult};
use crate::promise::{PromiseRecord, PromiseState, PromiseStore};
use crate::registry::RetryPolicy;
use crate::routing::{Target, Task, TaskRouter};
use crate::types::JobId;

/// Default interval between promise polls while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lower bound for the poll interval; `tokio::time::interval` rejects zero.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A remote call addressed to a worker pool.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub id: JobId,
    pub target: Target,
    pub capability: String,
    pub args: Value,
    pub retry_policy: RetryPolicy,
}

impl Invocation {
    pub fn new(id: JobId, target: Target, capability: impl Into<String>, args: Value) -> Self {
        Self {
            id,
            target,
            capability: capability.into(),
            args,
            retry_policy: RetryPolicy::Never,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn into_task(self) -> (JobId, Target, Task) {
        let task = Task {
            promise_id: self.id.clone(),
            capability: self.capability,
            args: self.args,
            retry_policy: self.retry_policy,
        };
        (self.id, self.target, task)
    }
}

/// Issues invocations and observes their promises.
#[derive(Clone)]
pub struct Invoker {
    store: Arc<dyn PromiseStore>,
    router: Arc<dyn TaskRouter>,
    poll_interval: Duration,
}

impl Invoker {
    pub fn new(store: Arc<dyn PromiseStore>, router: Arc<dyn TaskRouter>) -> Self {
        Self {
            store,
            router,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the promise poll interval, raised to at least [`MIN_POLL_INTERVAL`].
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn store(&self) -> &Arc<dyn PromiseStore> {
        &self.store
    }

    /// Invoke and block until the promise settles.
    ///
    /// Routing failures reject the promise and are returned as-is; a
    /// failed promise surfaces as [`CoreError::InvocationFailed`].
    pub async fn invoke_sync(&self, invocation: Invocation) -> CoreResult<Value> {
        let (id, target, task) = invocation.into_task();
        let created = self.store.create(&id).await?;

        if created.fresh {
            if let Err(e) = self.router.route(&target, task).await {
                tracing::error!(job_id = %id, target = %target, error = %e, "Routing failed");
                self.record_failure(&id, &e).await;
                return Err(e);
            }
            tracing::info!(job_id = %id, target = %target, "Invocation dispatched, waiting");
        } else {
            tracing::info!(
                job_id = %id,
                state = ?created.record.state,
                "Promise already exists, joining",
            );
        }

        let record = self.handle(id).wait().await?;
        into_value(record)
    }

    /// Invoke without waiting; the returned handle observes the promise.
    ///
    /// A routing failure is recorded against the promise and logged, never
    /// returned to the caller.
    pub async fn invoke_async(&self, invocation: Invocation) -> CoreResult<JobHandle> {
        let (id, target, task) = invocation.into_task();
        let created = self.store.create(&id).await?;

        if created.fresh {
            match self.router.route(&target, task).await {
                Ok(()) => {
                    tracing::info!(job_id = %id, target = %target, "Detached invocation dispatched");
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %id,
                        target = %target,
                        error = %e,
                        "Detached routing failed, recorded on promise",
                    );
                    self.record_failure(&id, &e).await;
                }
            }
        }

        Ok(self.handle(id))
    }

    /// Handle for an already-issued invocation.
    pub fn handle(&self, id: JobId) -> JobHandle {
        JobHandle {
            id,
            store: Arc::clone(&self.store),
            poll_interval: self.poll_interval,
        }
    }

    async fn record_failure(&self, id: &JobId, error: &CoreError) {
        if let Err(e) = self.store.reject(id, error.to_string()).await {
            tracing::warn!(job_id = %id, error = %e, "Could not record routing failure");
        }
    }
}

/// Observer for a single promise.
#[derive(Clone)]
pub struct JobHandle {
    id: JobId,
    store: Arc<dyn PromiseStore>,
    poll_interval: Duration,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle").field("id", &self.id).finish()
    }
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Current state, `None` if the store does not know the id.
    pub async fn state(&self) -> CoreResult<Option<PromiseState>> {
        Ok(self.store.get(&self.id).await?.map(|r| r.state))
    }

    /// Completed value if settled, `None` while pending.
    pub async fn try_result(&self) -> CoreResult<Option<Value>> {
        match self.store.get(&self.id).await? {
            Some(record) if record.state.is_settled() => into_value(record).map(Some),
            Some(_) => Ok(None),
            None => Err(CoreError::PromiseNotFound(self.id.clone())),
        }
    }

    /// Block until the promise settles and return its value.
    pub async fn result(&self) -> CoreResult<Value> {
        into_value(self.wait().await?)
    }

    async fn wait(&self) -> CoreResult<PromiseRecord> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let record = self
                .store
                .get(&self.id)
                .await?
                .ok_or_else(|| CoreError::PromiseNotFound(self.id.clone()))?;
            if record.state.is_settled() {
                return Ok(record);
            }
        }
    }
}

fn into_value(record: PromiseRecord) -> CoreResult<Value> {
    match record.state {
        PromiseState::Completed => Ok(record.value.unwrap_or(Value::Null)),
        PromiseState::Failed => Err(CoreError::InvocationFailed {
            id: record.id,
            message: record.error.unwrap_or_default(),
        }),
        PromiseState::Pending => Err(CoreError::Store(format!(
            "promise {} is still pending",
            record.id
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
