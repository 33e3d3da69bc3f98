use std::path::PathBuf;

use offload_core::CoreError;
use offload_worker::ConfigError;

/// Errors surfaced to a submitting or looking-up caller.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The script to submit does not exist. Never retried.
    #[error("Script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("Failed to read script {}: {source}", path.display())]
    ScriptUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Caller-supplied ids may not live in the derived detached namespace.
    #[error("Job id '{0}' is reserved for detached jobs")]
    ReservedJobId(String),

    #[error("Job id '{0}' must be at most 200 ASCII letters, digits, '-', '_' or '.'")]
    InvalidJobId(String),

    /// Routing, invocation and store failures.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
