//! Shared identifier types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix prepended to a parent job id to derive its detached job id.
pub const DETACHED_PREFIX: &str = "detached_";

/// Longest id a caller may submit under.
///
/// The derived detached id plus the longest file name built from it
/// (`sandboxed_script-{id}.{ext}`, `{id}.json.tmp`) stays well below the
/// 255-byte file name limit.
pub const MAX_JOB_ID_LEN: usize = 200;

/// Correlation id tying a submission to its eventual result.
///
/// Doubles as the promise id in the store and as the artifact file stem
/// on the worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, globally unique id (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Id of the detached job fanned out from this parent.
    pub fn detached(&self) -> Self {
        Self(format!("{DETACHED_PREFIX}{}", self.0))
    }

    /// Whether this id already lives in the derived detached namespace.
    pub fn is_detached(&self) -> bool {
        self.0.starts_with(DETACHED_PREFIX)
    }

    /// Whether the id can be used verbatim as a file stem.
    ///
    /// Artifact and promise files are named after the id, so separators,
    /// parent references and control characters are refused.
    pub fn is_file_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= MAX_JOB_ID_LEN + DETACHED_PREFIX.len()
            && self.0 != "."
            && self.0 != ".."
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }

    /// File-safe and short enough for a caller-chosen id.
    pub fn is_submittable(&self) -> bool {
        self.0.len() <= MAX_JOB_ID_LEN && self.is_file_safe()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
