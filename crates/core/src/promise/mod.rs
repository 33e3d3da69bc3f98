//! Durable promise interface.
//!
//! A promise is a settle-once value addressed by a [`JobId`]. The store
//! owns the lifecycle; the core only creates promises through the invoker
//! and settles them from the worker once a handler returns.

pub mod file;
mod lease;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::types::JobId;

pub use file::FilePromiseStore;
pub use memory::MemoryPromiseStore;

/// Lifecycle state of a promise. Transitions only leave `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromiseState {
    Pending,
    Completed,
    Failed,
}

impl PromiseState {
    pub fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Stored view of a single promise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromiseRecord {
    pub id: JobId,
    pub state: PromiseState,
    /// Completion value, set only when `state` is `Completed`.
    pub value: Option<Value>,
    /// Failure message, set only when `state` is `Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    /// Lease token of the store instance that will settle this promise,
    /// for stores shared between processes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl PromiseRecord {
    pub fn pending(id: JobId) -> Self {
        Self {
            id,
            state: PromiseState::Pending,
            value: None,
            error: None,
            created_at: Utc::now(),
            settled_at: None,
            owner: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == PromiseState::Completed
    }

    /// Move a pending record into `Completed`.
    pub(crate) fn resolve(&mut self, value: Value) -> CoreResult<()> {
        self.ensure_pending()?;
        self.state = PromiseState::Completed;
        self.value = Some(value);
        self.settled_at = Some(Utc::now());
        Ok(())
    }

    /// Move a pending record into `Failed`.
    pub(crate) fn reject(&mut self, message: String) -> CoreResult<()> {
        self.ensure_pending()?;
        self.state = PromiseState::Failed;
        self.error = Some(message);
        self.settled_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_pending(&self) -> CoreResult<()> {
        if self.state.is_settled() {
            return Err(CoreError::PromiseAlreadySettled(self.id.clone()));
        }
        Ok(())
    }
}

/// Result of [`PromiseStore::create`].
#[derive(Debug, Clone)]
pub struct Created {
    pub record: PromiseRecord,
    /// `true` when this call created the promise, `false` when it existed.
    pub fresh: bool,
}

/// Keyed storage of promises, shared by submitters and workers.
///
/// Implementations must make `create` idempotent and settle each promise
/// at most once.
#[async_trait]
pub trait PromiseStore: Send + Sync {
    /// Create a pending promise, or return the existing record for `id`.
    async fn create(&self, id: &JobId) -> CoreResult<Created>;

    /// Fetch a promise, `None` if the id is unknown.
    async fn get(&self, id: &JobId) -> CoreResult<Option<PromiseRecord>>;

    /// Complete a pending promise with `value`.
    async fn resolve(&self, id: &JobId, value: Value) -> CoreResult<PromiseRecord>;

    /// Fail a pending promise with `message`.
    async fn reject(&self, id: &JobId, message: String) -> CoreResult<PromiseRecord>;

    /// Reject pending promises whose owner is gone and return their ids.
    ///
    /// Only stores shared between processes can hold such promises; the
    /// default finds none.
    async fn reject_orphans(&self) -> CoreResult<Vec<JobId>> {
        Ok(Vec::new())
    }
}

/// Failure message recorded on promises rejected by
/// [`PromiseStore::reject_orphans`].
pub const ABANDONED_MESSAGE: &str = "abandoned: the process running this job exited before it settled";

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
