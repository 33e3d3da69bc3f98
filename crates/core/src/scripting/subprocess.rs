//! Subprocess spawning with a cleared environment and a hard deadline.
//!
//! [`run_command`] applies the [`ScriptInput`] to an already-built
//! [`tokio::process::Command`], captures both output streams and kills the
//! child once the timeout elapses.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::executor::{ScriptError, ScriptInput, ScriptOutput};

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Output exceeding this limit is truncated.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Spawn `cmd`, capture stdout/stderr and enforce the configured timeout.
///
/// The caller sets the program and arguments. The child inherits nothing
/// from this process' environment except `input.env_vars`, and stdin is
/// closed. The child leads its own process group; the whole group is killed
/// once the child exits or the deadline passes, so stray background
/// processes cannot hold the output pipes open. One deadline covers both
/// the wait and draining the pipes.
pub async fn run_command(
    cmd: &mut Command,
    input: &ScriptInput,
) -> Result<ScriptOutput, ScriptError> {
    // `kill_on_drop(true)` ensures the child is killed when dropped (e.g. on timeout).
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .env_clear()
        .current_dir(&input.working_directory);
    #[cfg(unix)]
    cmd.process_group(0);

    for (key, value) in &input.env_vars {
        cmd.env(key, value);
    }

    let start = Instant::now();
    let deadline = tokio::time::Instant::now() + input.timeout;

    let mut child = cmd.spawn().map_err(ScriptError::IoError)?;
    // Taken before `wait`: the id is gone once the child is reaped.
    let pid = child.id();

    // Read the pipes in spawned tasks so `child.wait()` can borrow `&mut child`.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let mut stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let mut stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            kill_process_group(pid);
            stdout_task.abort();
            stderr_task.abort();
            return Err(ScriptError::IoError(e));
        }
        Err(_elapsed) => {
            // Kill explicitly so the process is gone before the sandbox is
            // removed; `kill_on_drop` covers the case where this fails.
            kill_process_group(pid);
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill timed-out process");
            }
            stdout_task.abort();
            stderr_task.abort();
            return Err(ScriptError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }
    };

    // Leftover children of the script would otherwise keep the pipes open.
    kill_process_group(pid);

    let drained = tokio::time::timeout_at(deadline, async {
        let stdout = (&mut stdout_task).await.unwrap_or_default();
        let stderr = (&mut stderr_task).await.unwrap_or_default();
        (stdout, stderr)
    })
    .await;

    let Ok((stdout_bytes, stderr_bytes)) = drained else {
        // A descendant left the process group and still holds a pipe.
        tracing::warn!("Output pipes still open at the deadline");
        stdout_task.abort();
        stderr_task.abort();
        return Err(ScriptError::Timeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
        });
    };

    Ok(ScriptOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        exit_code: status.code().unwrap_or(-1),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // Safety: kill(2) takes no pointers; a negative pid addresses the group
    // created by `process_group(0)`. ESRCH (group already empty) is ignored.
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
