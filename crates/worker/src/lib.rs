//! `offload-worker` library crate.
//!
//! Worker side of `offload`: configuration, the capabilities a worker
//! serves and the pool loop that drains a group queue and settles
//! promises.

pub mod config;
pub mod handlers;
pub mod pool;

pub use config::{ConfigError, WorkerConfig};
pub use handlers::{default_registry, ExecuteArgs, ExecuteHandler, EXECUTE};
pub use pool::WorkerPool;
