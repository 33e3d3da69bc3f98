//! Sandboxed script execution on the worker side.
//!
//! [`sandbox::SandboxExecutor`] is the entry point. It owns the ephemeral
//! sandbox directory, delegates process handling to [`subprocess`],
//! classifies the run through [`outcome`] and persists [`artifacts`].

pub mod artifacts;
pub mod executor;
pub mod outcome;
pub mod sandbox;
pub mod subprocess;

pub use artifacts::ResultArtifacts;
pub use outcome::{ExecutionOutcome, ExecutionResult};
pub use sandbox::{ExecutionReport, SandboxConfig, SandboxExecutor};
