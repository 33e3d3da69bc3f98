use std::path::PathBuf;
use std::time::Duration;

use offload_core::invoke::DEFAULT_POLL_INTERVAL;
use offload_worker::config::parse_var;
use offload_worker::ConfigError;

/// Submitter-side configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory holding one JSON record per promise.
    pub state_dir: PathBuf,
    /// Interval between promise polls while waiting for a result.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".offload"),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default    |
    /// |----------------------------|------------|
    /// | `OFFLOAD_STATE_DIR`        | `.offload` |
    /// | `OFFLOAD_POLL_INTERVAL_MS` | `100`      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let poll_interval = match parse_var::<u64>(&lookup, "OFFLOAD_POLL_INTERVAL_MS")? {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    var: "OFFLOAD_POLL_INTERVAL_MS",
                    value: "0".into(),
                });
            }
            Some(millis) => Duration::from_millis(millis),
            None => defaults.poll_interval,
        };

        Ok(Self {
            state_dir: lookup("OFFLOAD_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
            poll_interval,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_without_variables() {
        let config = ClientConfig::from_lookup(|_| None).expect("config");
        assert_eq!(config.state_dir, PathBuf::from(".offload"));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn poll_interval_is_parsed_in_millis() {
        let config = ClientConfig::from_lookup(|name| {
            (name == "OFFLOAD_POLL_INTERVAL_MS").then(|| "25".to_string())
        })
        .expect("config");
        assert_eq!(config.poll_interval, Duration::from_millis(25));
    }

    #[test]
    fn invalid_poll_interval_is_reported() {
        assert_matches!(
            ClientConfig::from_lookup(|name| {
                (name == "OFFLOAD_POLL_INTERVAL_MS").then(|| "fast".to_string())
            }),
            Err(ConfigError::Invalid { var: "OFFLOAD_POLL_INTERVAL_MS", .. })
        );
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        assert_matches!(
            ClientConfig::from_lookup(|name| {
                (name == "OFFLOAD_POLL_INTERVAL_MS").then(|| "0".to_string())
            }),
            Err(ConfigError::Invalid { var: "OFFLOAD_POLL_INTERVAL_MS", .. })
        );
    }
}
