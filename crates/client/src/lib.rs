//! `offload-client` library crate.
//!
//! Submitter side of `offload`: the submission coordinator, detached
//! fan-out, result lookup and an embedded worker runtime for running
//! everything in one process.

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod detached;
pub mod error;
pub mod lookup;
pub mod runtime;

pub use config::ClientConfig;
pub use coordinator::{Coordinator, ResultLocation, SubmitRequest};
pub use detached::DetachedFanout;
pub use error::{ClientError, ClientResult};
pub use lookup::{Lookup, ResultLookup};
pub use runtime::{execute_locally, EmbeddedRuntime};
