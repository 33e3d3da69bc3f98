//! Core building blocks of `offload`: job ids, the durable promise
//! interface, task routing, the worker capability registry, durable
//! invocation and the sandboxed script executor.
//!
//! Nothing here talks to a network; the store and the router are traits
//! with in-process implementations.

pub mod error;
pub mod invoke;
pub mod promise;
pub mod registry;
pub mod routing;
pub mod scripting;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use types::JobId;
