//! Task routing to named worker groups.
//!
//! Submitters address a pool with [`poll`] and hand a [`Task`] to a
//! [`TaskRouter`]. [`LocalRouter`] is the in-process implementation: one
//! bounded queue per registered group, drained by every worker of that
//! group through a shared [`TaskQueue`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::error::{CoreError, CoreResult};
use crate::registry::RetryPolicy;
use crate::types::JobId;

/// Default capacity of each group's queue.
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Address of a worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub group: String,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poll://{}", self.group)
    }
}

/// Resolve a machine-type name to the pool that polls for it.
pub fn poll(group: impl Into<String>) -> Target {
    Target {
        group: group.into(),
    }
}

/// A single invocation delivered to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Promise the worker settles once the handler returns.
    pub promise_id: JobId,
    /// Registered capability to run.
    pub capability: String,
    pub args: Value,
    pub retry_policy: RetryPolicy,
}

#[async_trait]
pub trait TaskRouter: Send + Sync {
    /// Deliver `task` to the pool behind `target`.
    async fn route(&self, target: &Target, task: Task) -> CoreResult<()>;
}

/// Receiving end of a group queue, shared by all workers of the pool.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    group: String,
    rx: Arc<Mutex<mpsc::Receiver<Task>>>,
}

impl TaskQueue {
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Wait for the next task, `None` once the router side is gone.
    pub async fn next(&self) -> Option<Task> {
        self.rx.lock().await.recv().await
    }
}

/// In-process router with one queue per group.
#[derive(Debug)]
pub struct LocalRouter {
    groups: RwLock<HashMap<String, mpsc::Sender<Task>>>,
    capacity: usize,
}

impl LocalRouter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register `group` and return the queue its workers poll.
    ///
    /// Re-registering a group replaces its queue; tasks still buffered in
    /// the old queue stay with the old receivers.
    pub async fn register_group(&self, group: impl Into<String>) -> TaskQueue {
        let group = group.into();
        let (tx, rx) = mpsc::channel(self.capacity);
        self.groups.write().await.insert(group.clone(), tx);
        tracing::debug!(group = %group, "Worker group registered");
        TaskQueue {
            group,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Drop the sending side of every group so idle workers wind down.
    pub async fn close(&self) {
        self.groups.write().await.clear();
    }

    pub async fn groups(&self) -> Vec<String> {
        self.groups.read().await.keys().cloned().collect()
    }
}

impl Default for LocalRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRouter for LocalRouter {
    async fn route(&self, target: &Target, task: Task) -> CoreResult<()> {
        let tx = self
            .groups
            .read()
            .await
            .get(&target.group)
            .cloned()
            .ok_or_else(|| CoreError::NoSuchPool(target.group.clone()))?;

        let promise_id = task.promise_id.clone();
        tx.send(task)
            .await
            .map_err(|_| CoreError::NoSuchPool(target.group.clone()))?;

        tracing::debug!(job_id = %promise_id, target = %target, "Task routed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn task(id: &str) -> Task {
        Task {
            promise_id: JobId::from(id),
            capability: "execute".into(),
            args: json!({}),
            retry_policy: RetryPolicy::Never,
        }
    }

    #[test]
    fn poll_targets_named_group() {
        let target = poll("gpu");
        assert_eq!(target.group, "gpu");
        assert_eq!(target.to_string(), "poll://gpu");
    }

    #[tokio::test]
    async fn routed_task_reaches_group_queue() {
        let router = LocalRouter::new();
        let queue = router.register_group("gpu").await;

        router.route(&poll("gpu"), task("r1")).await.expect("route");
        let received = queue.next().await.expect("task");
        assert_eq!(received.promise_id.as_str(), "r1");
        assert_eq!(queue.group(), "gpu");
    }

    #[tokio::test]
    async fn unknown_group_is_rejected() {
        let router = LocalRouter::new();
        router.register_group("gpu").await;
        assert_matches!(
            router.route(&poll("tpu"), task("r2")).await,
            Err(CoreError::NoSuchPool(group)) if group == "tpu"
        );
    }

    #[tokio::test]
    async fn dropped_queue_rejects_routing() {
        let router = LocalRouter::new();
        drop(router.register_group("gpu").await);
        assert_matches!(
            router.route(&poll("gpu"), task("r3")).await,
            Err(CoreError::NoSuchPool(_))
        );
    }

    #[tokio::test]
    async fn close_ends_worker_queues() {
        let router = LocalRouter::new();
        let queue = router.register_group("gpu").await;
        router.close().await;
        assert!(queue.next().await.is_none());
        assert!(router.groups().await.is_empty());
    }
}
