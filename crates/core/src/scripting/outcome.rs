//! Tagged classification of a sandboxed run.
//!
//! Every run ends in exactly one [`ExecutionOutcome`]. Non-success
//! outcomes carry a human-readable diagnostic that becomes the error
//! artifact; none of them is raised as an error to any caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::executor::{ScriptError, ScriptOutput};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success,
    TimeoutExceeded,
    NonZeroExit { code: i32 },
    UnexpectedError { message: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Short label used in log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::TimeoutExceeded => "timeout",
            Self::NonZeroExit { .. } => "non_zero_exit",
            Self::UnexpectedError { .. } => "unexpected_error",
        }
    }
}

/// What a run produced, ready to be written out as artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Content of the output artifact. Empty unless the run succeeded.
    pub stdout: String,
    /// Content of the error artifact: stderr on success, a diagnostic otherwise.
    pub stderr: String,
    pub outcome: ExecutionOutcome,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Classify a subprocess result.
    pub fn classify(result: Result<ScriptOutput, ScriptError>, timeout: Duration) -> Self {
        match result {
            Ok(output) if output.succeeded() => Self {
                stdout: output.stdout,
                stderr: output.stderr,
                outcome: ExecutionOutcome::Success,
                duration_ms: output.duration_ms,
            },
            Ok(output) => Self {
                stdout: String::new(),
                stderr: format!(
                    "Error: Process returned {}\nSTDOUT:\n{}\nSTDERR:\n{}",
                    output.exit_code, output.stdout, output.stderr
                ),
                outcome: ExecutionOutcome::NonZeroExit {
                    code: output.exit_code,
                },
                duration_ms: output.duration_ms,
            },
            Err(ScriptError::Timeout { elapsed_ms }) => Self {
                stdout: String::new(),
                stderr: timeout_diagnostic(timeout),
                outcome: ExecutionOutcome::TimeoutExceeded,
                duration_ms: elapsed_ms,
            },
            Err(e) => Self::unexpected(e.to_string()),
        }
    }

    /// A run that failed before or around the process itself.
    pub fn unexpected(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            stdout: String::new(),
            stderr: format!("Unexpected error: {message}"),
            outcome: ExecutionOutcome::UnexpectedError { message },
            duration_ms: 0,
        }
    }
}

/// Marker written to the error artifact when the deadline fires.
pub fn timeout_diagnostic(timeout: Duration) -> String {
    let secs = timeout.as_secs_f64();
    if timeout.subsec_nanos() == 0 {
        format!("Error: Execution timed out after {} seconds", timeout.as_secs())
    } else {
        format!("Error: Execution timed out after {secs:.3} seconds")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: i32, stdout: &str, stderr: &str) -> ScriptOutput {
        ScriptOutput {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            duration_ms: 7,
        }
    }

    #[test]
    fn success_keeps_both_streams() {
        let result = ExecutionResult::classify(Ok(output(0, "hi\n", "warn\n")), Duration::from_secs(120));
        assert_eq!(result.outcome, ExecutionOutcome::Success);
        assert_eq!(result.stdout, "hi\n");
        assert_eq!(result.stderr, "warn\n");
    }

    #[test]
    fn nonzero_exit_moves_streams_into_diagnostic() {
        let result = ExecutionResult::classify(Ok(output(3, "partial", "trace")), Duration::from_secs(120));
        assert_eq!(result.outcome, ExecutionOutcome::NonZeroExit { code: 3 });
        assert!(result.stdout.is_empty());
        assert_eq!(
            result.stderr,
            "Error: Process returned 3\nSTDOUT:\npartial\nSTDERR:\ntrace"
        );
    }

    #[test]
    fn timeout_has_marker_and_empty_stdout() {
        let result = ExecutionResult::classify(
            Err(ScriptError::Timeout { elapsed_ms: 120_000 }),
            Duration::from_secs(120),
        );
        assert_eq!(result.outcome, ExecutionOutcome::TimeoutExceeded);
        assert!(result.stdout.is_empty());
        assert_eq!(result.stderr, "Error: Execution timed out after 120 seconds");
    }

    #[test]
    fn subsecond_timeouts_keep_precision() {
        assert_eq!(
            timeout_diagnostic(Duration::from_millis(250)),
            "Error: Execution timed out after 0.250 seconds"
        );
    }

    #[test]
    fn io_failure_is_unexpected() {
        let result = ExecutionResult::classify(
            Err(ScriptError::IoError(std::io::Error::other("no interpreter"))),
            Duration::from_secs(120),
        );
        assert_eq!(result.outcome.label(), "unexpected_error");
        assert!(result.stderr.starts_with("Unexpected error: I/O error:"));
        assert!(result.stderr.contains("no interpreter"));
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_value(ExecutionOutcome::NonZeroExit { code: 1 }).expect("serialize");
        assert_eq!(json, serde_json::json!({"kind": "non_zero_exit", "code": 1}));
    }
}
