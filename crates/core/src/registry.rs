//! Capability registry consulted by workers.
//!
//! Built once at startup: every capability a worker can run is registered
//! explicitly with its handler and declared retry policy.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// How the runtime reacts when a handler fails.
///
/// Only `Never` exists: a failed invocation settles its promise as failed
/// and is not re-executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum RetryPolicy {
    #[default]
    Never,
}

/// Error returned across the worker boundary by a handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),
}

/// A unit of work a worker knows how to run.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, HandlerError>;
}

/// Handler plus its declared policy.
#[derive(Clone)]
pub struct Registration {
    pub handler: Arc<dyn Handler>,
    pub retry_policy: RetryPolicy,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    capabilities: HashMap<String, Registration>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`. Names are unique.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
        retry_policy: RetryPolicy,
    ) -> CoreResult<()> {
        let name = name.into();
        if self.capabilities.contains_key(&name) {
            return Err(CoreError::DuplicateCapability(name));
        }
        tracing::debug!(capability = %name, ?retry_policy, "Capability registered");
        self.capabilities.insert(
            name,
            Registration {
                handler,
                retry_policy,
            },
        );
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
        retry_policy: RetryPolicy,
    ) -> CoreResult<Self> {
        self.register(name, handler, retry_policy)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Registration> {
        self.capabilities.get(name)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &str> {
        self.capabilities.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
