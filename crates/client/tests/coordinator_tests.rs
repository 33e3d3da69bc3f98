//! End-to-end tests for submission and lookup through the embedded runtime.
//!
//! Scripts run with `sh` so the tests need no Python interpreter.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use offload_client::{ClientError, EmbeddedRuntime, Lookup, SubmitRequest};
use offload_core::promise::{FilePromiseStore, MemoryPromiseStore, PromiseStore, ABANDONED_MESSAGE};
use offload_core::{CoreError, JobId};
use offload_worker::WorkerConfig;
use serde_json::json;

const POLL: Duration = Duration::from_millis(10);

fn worker_config(artifact_dir: &Path, timeout: Duration) -> WorkerConfig {
    WorkerConfig {
        pools: vec!["gpu".into()],
        workers_per_pool: 1,
        artifact_dir: artifact_dir.to_path_buf(),
        interpreter: "sh".into(),
        interpreter_args: vec![],
        script_extension: "sh".into(),
        timeout,
    }
}

fn write_script(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write script");
    path
}

fn request(script_path: PathBuf, id: &str, machine_type: &str, wait: bool) -> SubmitRequest {
    SubmitRequest {
        script_path,
        job_id: Some(JobId::from(id)),
        machine_type: machine_type.into(),
        wait,
    }
}

async fn start(store: Arc<dyn PromiseStore>, config: &WorkerConfig) -> EmbeddedRuntime {
    EmbeddedRuntime::start(store, config, POLL)
        .await
        .expect("start runtime")
}

async fn wait_ready(runtime: &EmbeddedRuntime, id: &str) -> Lookup {
    let lookup = runtime.lookup();
    let id = JobId::from(id);
    for _ in 0..1000 {
        let result = lookup.get_by_id(&id).await.expect("lookup");
        if result != Lookup::NotReady {
            return result;
        }
        tokio::time::sleep(POLL).await;
    }
    panic!("job {id} never became ready");
}

// ---------------------------------------------------------------------------
// Test: wait mode returns the stdout artifact of the job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wait_mode_returns_output_location() {
    let work = tempfile::tempdir().expect("work dir");
    let config = worker_config(work.path(), Duration::from_secs(10));
    let runtime = start(Arc::new(MemoryPromiseStore::new()), &config).await;
    let script = write_script(work.path(), "hello.sh", "echo hi\n");

    let location = runtime
        .coordinator()
        .submit(request(script, "t1", "gpu", true))
        .await
        .expect("submit")
        .expect("wait mode returns a location");

    assert!(location.ends_with("t1.sout"), "unexpected location {location}");
    assert_eq!(std::fs::read_to_string(&location).expect("sout"), "hi\n");
    assert_eq!(
        std::fs::read_to_string(work.path().join("t1.eout")).expect("eout"),
        ""
    );
    runtime.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: a missing script fails before anything is dispatched
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_script_is_not_found() {
    let work = tempfile::tempdir().expect("work dir");
    let config = worker_config(work.path(), Duration::from_secs(10));
    let store = Arc::new(MemoryPromiseStore::new());
    let runtime = start(store.clone(), &config).await;
    let missing = work.path().join("absent.sh");

    let result = runtime
        .coordinator()
        .submit(request(missing.clone(), "nf1", "gpu", true))
        .await;

    assert_matches!(result, Err(ClientError::ScriptNotFound(p)) if p == missing);
    assert!(store.is_empty().await);
    runtime.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: a script outliving the timeout leaves the timeout diagnostic
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timed_out_script_writes_diagnostic() {
    let work = tempfile::tempdir().expect("work dir");
    let config = worker_config(work.path(), Duration::from_secs(1));
    let runtime = start(Arc::new(MemoryPromiseStore::new()), &config).await;
    let script = write_script(work.path(), "slow.sh", "sleep 30\n");

    let location = runtime
        .coordinator()
        .submit(request(script, "t2", "gpu", true))
        .await
        .expect("submit")
        .expect("location");

    assert_eq!(std::fs::read_to_string(&location).expect("sout"), "");
    let eout = std::fs::read_to_string(work.path().join("t2.eout")).expect("eout");
    assert_eq!(eout, "Error: Execution timed out after 1 seconds");
    runtime.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: detached mode returns at once and resolves under the derived id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn detached_mode_resolves_derived_id() {
    let work = tempfile::tempdir().expect("work dir");
    let config = worker_config(work.path(), Duration::from_secs(10));
    let runtime = start(Arc::new(MemoryPromiseStore::new()), &config).await;
    let script = write_script(work.path(), "bg.sh", "sleep 1\necho bg\n");

    let started = Instant::now();
    let submitted = runtime
        .coordinator()
        .submit(request(script, "t3", "gpu", false))
        .await
        .expect("submit");
    assert!(submitted.is_none());
    assert!(started.elapsed() < Duration::from_millis(900));

    let lookup = runtime.lookup();
    assert_eq!(
        lookup.get_by_id(&JobId::from("detached_t3")).await.expect("lookup"),
        Lookup::NotReady
    );

    let ready = wait_ready(&runtime, "detached_t3").await;
    let expected = work.path().join("t3.sout").display().to_string();
    assert_eq!(ready, Lookup::Ready(json!(expected)));
    assert_eq!(std::fs::read_to_string(&expected).expect("sout"), "bg\n");

    let again = lookup.get_by_id(&JobId::from("detached_t3")).await.expect("lookup");
    assert_eq!(again, ready);
    runtime.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: routing to an unknown pool fails wait mode and marks detached Failed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_pool_fails_submission() {
    let work = tempfile::tempdir().expect("work dir");
    let config = worker_config(work.path(), Duration::from_secs(10));
    let runtime = start(Arc::new(MemoryPromiseStore::new()), &config).await;
    let script = write_script(work.path(), "any.sh", "echo any\n");

    let waited = runtime
        .coordinator()
        .submit(request(script.clone(), "u1", "tpu", true))
        .await;
    assert_matches!(
        waited,
        Err(ClientError::Core(CoreError::NoSuchPool(group))) if group == "tpu"
    );

    let detached = runtime
        .coordinator()
        .submit(request(script, "u2", "tpu", false))
        .await
        .expect("detached submission does not surface routing errors");
    assert!(detached.is_none());
    assert_matches!(
        runtime.lookup().get_by_id(&JobId::from("detached_u2")).await,
        Ok(Lookup::Failed(message)) if message.contains("tpu")
    );
    runtime.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: caller ids in the detached namespace are rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reserved_id_is_rejected() {
    let work = tempfile::tempdir().expect("work dir");
    let config = worker_config(work.path(), Duration::from_secs(10));
    let runtime = start(Arc::new(MemoryPromiseStore::new()), &config).await;
    let script = write_script(work.path(), "any.sh", "echo any\n");

    let result = runtime
        .coordinator()
        .submit(request(script, "detached_x", "gpu", true))
        .await;
    assert_matches!(result, Err(ClientError::ReservedJobId(id)) if id == "detached_x");
    runtime.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: resubmitting a completed id returns the stored location unchanged
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resubmission_reuses_completed_result() {
    let work = tempfile::tempdir().expect("work dir");
    let config = worker_config(work.path(), Duration::from_secs(10));
    let runtime = start(Arc::new(MemoryPromiseStore::new()), &config).await;
    let script = write_script(work.path(), "once.sh", "echo first\n");
    let coordinator = runtime.coordinator();

    let first = coordinator
        .submit(request(script.clone(), "r1", "gpu", true))
        .await
        .expect("submit")
        .expect("location");

    std::fs::write(&script, "echo second\n").expect("rewrite script");
    let second = coordinator
        .submit(request(script, "r1", "gpu", true))
        .await
        .expect("resubmit")
        .expect("location");

    assert_eq!(first, second);
    assert_eq!(std::fs::read_to_string(&second).expect("sout"), "first\n");
    runtime.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: detached results survive a restart with the file store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn file_store_lookup_survives_restart() {
    let work = tempfile::tempdir().expect("work dir");
    let state = tempfile::tempdir().expect("state dir");
    let config = worker_config(work.path(), Duration::from_secs(10));
    let script = write_script(work.path(), "persist.sh", "echo kept\n");

    let store = Arc::new(FilePromiseStore::open(state.path()).await.expect("open store"));
    let runtime = start(store, &config).await;
    runtime
        .coordinator()
        .submit(request(script, "f1", "gpu", false))
        .await
        .expect("submit");
    // Shutdown drains the detached job.
    runtime.shutdown().await;

    let reopened = Arc::new(FilePromiseStore::open(state.path()).await.expect("reopen store"));
    let runtime = start(reopened, &config).await;
    let expected = work.path().join("f1.sout").display().to_string();
    assert_eq!(
        runtime.lookup().get_by_id(&JobId::from("detached_f1")).await.expect("lookup"),
        Lookup::Ready(json!(expected))
    );
    runtime.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: a detached run under a finished id reuses it instead of rerunning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn detached_resubmission_keeps_completed_artifacts() {
    let work = tempfile::tempdir().expect("work dir");
    let config = worker_config(work.path(), Duration::from_secs(10));
    let runtime = start(Arc::new(MemoryPromiseStore::new()), &config).await;
    let script = write_script(work.path(), "twice.sh", "echo first\n");
    let coordinator = runtime.coordinator();

    let location = coordinator
        .submit(request(script.clone(), "d1", "gpu", true))
        .await
        .expect("submit")
        .expect("location");

    std::fs::write(&script, "echo second\n").expect("rewrite script");
    let detached = coordinator
        .submit(request(script, "d1", "gpu", false))
        .await
        .expect("detached submit");
    assert!(detached.is_none());

    assert_eq!(wait_ready(&runtime, "detached_d1").await, Lookup::Ready(json!(location)));
    assert_eq!(std::fs::read_to_string(&location).expect("sout"), "first\n");
    runtime.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: a job left pending by a runtime that is gone fails on restart
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[tokio::test]
async fn pending_job_of_a_closed_runtime_fails_on_restart() {
    let work = tempfile::tempdir().expect("work dir");
    let state = tempfile::tempdir().expect("state dir");
    let config = worker_config(work.path(), Duration::from_secs(10));
    let script = write_script(work.path(), "stuck.sh", "echo never\n");
    {
        let store = FilePromiseStore::open(state.path()).await.expect("open store");
        store.create(&JobId::from("s1")).await.expect("create");
    }

    let reopened = Arc::new(FilePromiseStore::open(state.path()).await.expect("reopen store"));
    let runtime = start(reopened, &config).await;

    let result = tokio::time::timeout(
        Duration::from_secs(3),
        runtime.coordinator().submit(request(script, "s1", "gpu", true)),
    )
    .await
    .expect("resubmission must not hang");
    assert_matches!(
        result,
        Err(ClientError::Core(CoreError::InvocationFailed { message, .. }))
            if message == ABANDONED_MESSAGE
    );
    assert_matches!(
        runtime.lookup().get_by_id(&JobId::from("s1")).await,
        Ok(Lookup::Failed(message)) if message == ABANDONED_MESSAGE
    );
    assert!(!work.path().join("s1.sout").exists());
    runtime.shutdown().await;
}
