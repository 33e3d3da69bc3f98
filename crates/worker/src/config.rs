use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use offload_core::scripting::SandboxConfig;

/// Error raised when an environment variable holds an unusable value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for a single local machine.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Pools (machine types) this process serves.
    pub pools: Vec<String>,
    /// Worker tasks started per pool.
    pub workers_per_pool: usize,
    /// Directory receiving result artifacts (empty: current directory).
    pub artifact_dir: PathBuf,
    pub interpreter: String,
    pub interpreter_args: Vec<String>,
    pub script_extension: String,
    pub timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let sandbox = SandboxConfig::default();
        Self {
            pools: vec!["gpu".into()],
            workers_per_pool: 1,
            artifact_dir: sandbox.artifact_dir,
            interpreter: sandbox.interpreter,
            interpreter_args: sandbox.interpreter_args,
            script_extension: sandbox.script_extension,
            timeout: sandbox.timeout,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default  |
    /// |----------------------------|----------|
    /// | `OFFLOAD_POOLS`            | `gpu`    |
    /// | `OFFLOAD_WORKERS_PER_POOL` | `1`      |
    /// | `OFFLOAD_ARTIFACT_DIR`     | (cwd)    |
    /// | `OFFLOAD_INTERPRETER`      | `python3`|
    /// | `OFFLOAD_INTERPRETER_ARGS` | `-I -S`  |
    /// | `OFFLOAD_SCRIPT_EXTENSION` | `py`     |
    /// | `OFFLOAD_TIMEOUT_SECS`     | `120`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let pools = match lookup("OFFLOAD_POOLS") {
            Some(raw) => {
                let pools = split_list(&raw, ',');
                if pools.is_empty() {
                    return Err(ConfigError::Invalid {
                        var: "OFFLOAD_POOLS",
                        value: raw,
                    });
                }
                pools
            }
            None => defaults.pools,
        };

        let workers_per_pool = parse_var::<usize>(&lookup, "OFFLOAD_WORKERS_PER_POOL")?
            .unwrap_or(defaults.workers_per_pool);
        if workers_per_pool == 0 {
            return Err(ConfigError::Invalid {
                var: "OFFLOAD_WORKERS_PER_POOL",
                value: "0".into(),
            });
        }

        let timeout = parse_var::<u64>(&lookup, "OFFLOAD_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Ok(Self {
            pools,
            workers_per_pool,
            artifact_dir: lookup("OFFLOAD_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_dir),
            interpreter: lookup("OFFLOAD_INTERPRETER").unwrap_or(defaults.interpreter),
            interpreter_args: lookup("OFFLOAD_INTERPRETER_ARGS")
                .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                .unwrap_or(defaults.interpreter_args),
            script_extension: lookup("OFFLOAD_SCRIPT_EXTENSION")
                .unwrap_or(defaults.script_extension),
            timeout,
        })
    }

    /// Sandbox settings derived from this configuration.
    pub fn sandbox(&self) -> SandboxConfig {
        SandboxConfig {
            interpreter: self.interpreter.clone(),
            interpreter_args: self.interpreter_args.clone(),
            script_extension: self.script_extension.clone(),
            timeout: self.timeout,
            artifact_dir: self.artifact_dir.clone(),
            ..SandboxConfig::default()
        }
    }
}

/// Parse an optional variable, failing on values that do not parse.
pub fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
        None => Ok(None),
    }
}

fn split_list(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
