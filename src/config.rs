//! Engine configuration.

use std::time::Duration;

use crate::params::{
    DEFAULT_ATTEMPTS_ON_RETRYABLE_ERROR, DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_RPS,
};

/// Engine-wide defaults, applied to requests that leave the matching knob
/// unset.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default sustained mutation rate per second.
    pub default_rps: u32,

    /// Default per-target attempt budget.
    pub default_attempts_on_retryable_error: u32,

    /// Default activity heartbeat timeout.
    pub default_heartbeat_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_rps: DEFAULT_RPS,
            default_attempts_on_retryable_error: DEFAULT_ATTEMPTS_ON_RETRYABLE_ERROR,
            default_heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// wire defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let default_rps = std::env::var("ROCKFALL_DEFAULT_RPS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RPS);

        let default_attempts_on_retryable_error = std::env::var("ROCKFALL_DEFAULT_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_ATTEMPTS_ON_RETRYABLE_ERROR);

        let default_heartbeat_timeout = std::env::var("ROCKFALL_DEFAULT_HEARTBEAT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT);

        Config {
            default_rps,
            default_attempts_on_retryable_error,
            default_heartbeat_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_wire_constants() {
        let config = Config::default();
        assert_eq!(config.default_rps, 50);
        assert_eq!(config.default_attempts_on_retryable_error, 50);
        assert_eq!(config.default_heartbeat_timeout, Duration::from_secs(60));
    }
}
