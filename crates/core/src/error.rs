use crate::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Promise not found: {0}")]
    PromiseNotFound(JobId),

    #[error("Promise {0} is already settled")]
    PromiseAlreadySettled(JobId),

    #[error("No worker pool registered for group '{0}'")]
    NoSuchPool(String),

    #[error("Capability '{0}' is already registered")]
    DuplicateCapability(String),

    #[error("Invalid job id '{0}'")]
    InvalidJobId(String),

    #[error("Invocation {id} failed: {message}")]
    InvocationFailed { id: JobId, message: String },

    #[error("Promise store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the core crate.
pub type CoreResult<T> = Result<T, CoreError>;
