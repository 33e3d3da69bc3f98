//! Result lookup by job id.

use std::fmt;
use std::sync::Arc;

use offload_core::promise::{PromiseState, PromiseStore};
use offload_core::JobId;
use serde_json::Value;

use crate::error::ClientResult;

/// Observable state of a job, as seen by a polling caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The job completed; carries its result value (the artifact location).
    Ready(Value),
    /// Pending or unknown. Poll again later.
    NotReady,
    /// The invocation itself failed.
    Failed(String),
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(Value::String(location)) => f.write_str(location),
            Self::Ready(value) => write!(f, "{value}"),
            Self::NotReady => f.write_str("not ready"),
            Self::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

#[derive(Clone)]
pub struct ResultLookup {
    store: Arc<dyn PromiseStore>,
}

impl ResultLookup {
    pub fn new(store: Arc<dyn PromiseStore>) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, job_id: &JobId) -> ClientResult<Lookup> {
        let lookup = match self.store.get(job_id).await? {
            Some(record) => match record.state {
                PromiseState::Completed => Lookup::Ready(record.value.unwrap_or(Value::Null)),
                PromiseState::Failed => Lookup::Failed(record.error.unwrap_or_default()),
                PromiseState::Pending => Lookup::NotReady,
            },
            None => Lookup::NotReady,
        };
        tracing::debug!(job_id = %job_id, ?lookup, "Lookup");
        Ok(lookup)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
