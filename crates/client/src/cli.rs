//! Command-line arguments of the `offload` binary.

use std::path::PathBuf;

use clap::Parser;
use offload_core::JobId;

#[derive(Parser, Debug)]
#[command(name = "offload")]
#[command(version)]
#[command(about = "Execute a script remotely on a worker pool")]
pub struct Args {
    /// Script to execute
    #[arg(required_unless_present = "get")]
    pub script: Option<PathBuf>,

    /// Type of machine to execute on
    #[arg(short = 'm', long = "machine", default_value = "gpu")]
    pub machine_type: String,

    /// Job id, defaults to a random UUID
    #[arg(short = 'i', long = "id")]
    pub id: Option<String>,

    /// Return immediately instead of waiting for the script to finish
    #[arg(short = 'w', long = "no-wait")]
    pub no_wait: bool,

    /// Run the script in a sandbox in this process
    #[arg(short = 'l', long = "local")]
    pub local: bool,

    /// Look up the result of a job id
    #[arg(long = "get", value_name = "ID", conflicts_with_all = ["id", "no_wait", "local"])]
    pub get: Option<String>,
}

impl Args {
    pub fn wait(&self) -> bool {
        !self.no_wait
    }
}

/// Line printed once a submission finished (`location`) or was handed off.
pub fn submitted_message(job_id: &JobId, location: Option<&str>) -> String {
    match location {
        Some(location) => format!("results are located at {location}"),
        None => format!(
            "Detached execution submitted, retrieve it with --get {}",
            job_id.detached()
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
