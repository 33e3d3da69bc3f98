//! `offload` -- submit a script to a worker pool and retrieve its results.
//!
//! Runs the worker pools in-process over a file-backed promise store, so a
//! later `offload --get <ID>` in another process sees the same promises.
//! Detached jobs in flight are drained before the process exits.
//!
//! # Environment variables
//!
//! | Variable                   | Default    | Description                        |
//! |----------------------------|------------|------------------------------------|
//! | `OFFLOAD_STATE_DIR`        | `.offload` | promise records, one JSON per id   |
//! | `OFFLOAD_POLL_INTERVAL_MS` | `100`      | promise poll interval              |
//! | `OFFLOAD_POOLS`            | `gpu`      | pools started by this process      |
//! | `OFFLOAD_TIMEOUT_SECS`     | `120`      | sandbox wall-clock timeout         |

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use offload_client::cli::{submitted_message, Args};
use offload_client::{
    execute_locally, ClientConfig, EmbeddedRuntime, Lookup, ResultLookup, SubmitRequest,
};
use offload_core::promise::{FilePromiseStore, PromiseStore};
use offload_core::JobId;
use offload_worker::WorkerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "offload_client=info,offload_worker=info,offload_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let client = ClientConfig::from_env().context("invalid client configuration")?;
    let worker = WorkerConfig::from_env().context("invalid worker configuration")?;

    let store: Arc<dyn PromiseStore> = Arc::new(
        FilePromiseStore::open(&client.state_dir)
            .await
            .with_context(|| format!("cannot open state dir {}", client.state_dir.display()))?,
    );

    if let Some(get_id) = args.get.as_deref() {
        store.reject_orphans().await?;
        let lookup = ResultLookup::new(store);
        match lookup.get_by_id(&JobId::from(get_id)).await? {
            ready @ Lookup::Ready(_) => println!("Job results located at: {ready}"),
            Lookup::NotReady => println!("Job {get_id} is not ready yet."),
            Lookup::Failed(message) => println!("Job {get_id} failed: {message}"),
        }
        return Ok(());
    }

    let Some(script) = args.script.clone() else {
        anyhow::bail!("Script name is required");
    };
    let job_id = offload_client::coordinator::resolve_job_id(args.id.clone().map(JobId::from))?;

    println!("You can retrieve this execution using {job_id}");
    println!("Will execute {} in {}...", script.display(), args.machine_type);

    if args.local {
        let location = execute_locally(&worker, &script, &job_id).await?;
        println!("results are located at {location}");
        return Ok(());
    }

    let runtime = EmbeddedRuntime::start(store, &worker, client.poll_interval).await?;
    let submitted = runtime
        .coordinator()
        .submit(SubmitRequest {
            script_path: script,
            job_id: Some(job_id.clone()),
            machine_type: args.machine_type.clone(),
            wait: args.wait(),
        })
        .await;

    // Printed before shutdown, which waits for detached jobs to finish.
    if let Ok(location) = &submitted {
        println!("{}", submitted_message(&job_id, location.as_deref()));
    }

    // Detached jobs already routed still run to completion.
    runtime.shutdown().await;
    submitted?;
    Ok(())
}
