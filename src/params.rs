//! Batch request parameters, defaults and validation.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Targets fetched per visibility scan call. Wire constant; deployed cursors
/// assume it and it is deliberately not configurable.
pub const PAGE_SIZE: usize = 1000;

/// Default sustained mutation rate (and burst capacity) per second.
pub const DEFAULT_RPS: u32 = 50;
/// Mutation rate one worker is expected to sustain; drives the concurrency
/// default of `rps / 10`.
pub const DEFAULT_RPS_PER_CONCURRENCY: u32 = 10;
/// Default per-target attempt budget across retryable failures.
pub const DEFAULT_ATTEMPTS_ON_RETRYABLE_ERROR: u32 = 50;
/// Default heartbeat timeout the trampoline configures on the activity.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry policy the workflow trampoline configures on the batch activity.
///
/// The engine never schedules its own retries; this is published so
/// deployments wiring the activity stay aligned.
#[derive(Clone, Copy, Debug)]
pub struct ActivityRetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    pub expiration_interval: Duration,
}

/// Effectively infinite: the batch activity retries until it completes.
pub const BATCH_ACTIVITY_RETRY_POLICY: ActivityRetryPolicy = ActivityRetryPolicy {
    initial_interval: Duration::from_secs(10),
    backoff_coefficient: 1.7,
    maximum_interval: Duration::from_secs(5 * 60),
    expiration_interval: Duration::from_secs(20 * 365 * 24 * 60 * 60),
};

/// The mutation a batch run applies to every matching execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchOperation {
    /// Terminate matching executions, by default including their pending
    /// children.
    Terminate {
        #[serde(default)]
        terminate_children: Option<bool>,
    },
    /// Request cancellation of matching executions, by default including
    /// their pending children.
    Cancel {
        #[serde(default)]
        cancel_children: Option<bool>,
    },
    /// Signal each matching execution. A signal targets a single execution
    /// by definition and never recurses into children.
    Signal {
        signal_name: String,
        #[serde(default)]
        input: String,
    },
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParamsError {
    #[error("must provide required parameters: domain, query and reason")]
    MissingRequired,
    #[error("must provide a signal name")]
    MissingSignalName,
}

/// Parameters for one batch run. Immutable for the life of the activity.
///
/// Numeric knobs left at zero (and a zero heartbeat timeout) mean "use the
/// configured default"; [`BatchParams::normalized`] resolves them before the
/// engine starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchParams {
    /// Domain the target executions live in. The injected client is scoped
    /// to it.
    pub domain: String,
    /// Visibility query selecting the target executions.
    pub query: String,
    /// Reason carried on every mutation for audit.
    pub reason: String,
    pub operation: BatchOperation,
    /// Sustained mutation RPCs per second across all workers; also the burst
    /// capacity of the shared token bucket.
    #[serde(default)]
    pub rps: u32,
    /// Number of worker tasks processing targets in parallel.
    #[serde(default)]
    pub concurrency: usize,
    /// Attempts per target before a retryable failure becomes terminal.
    #[serde(default)]
    pub attempts_on_retryable_error: u32,
    /// Heartbeat timeout the trampoline configures on the activity. The
    /// engine heartbeats strictly more often than this.
    #[serde(default)]
    pub heartbeat_timeout: Duration,
    /// Error messages that fail a task on first occurrence instead of
    /// consuming the attempt budget.
    #[serde(default)]
    pub non_retryable_errors: Vec<String>,
    #[serde(skip)]
    non_retryable: HashSet<String>,
}

impl BatchParams {
    pub fn new(
        domain: impl Into<String>,
        query: impl Into<String>,
        reason: impl Into<String>,
        operation: BatchOperation,
    ) -> Self {
        Self {
            domain: domain.into(),
            query: query.into(),
            reason: reason.into(),
            operation,
            rps: 0,
            concurrency: 0,
            attempts_on_retryable_error: 0,
            heartbeat_timeout: Duration::ZERO,
            non_retryable_errors: Vec::new(),
            non_retryable: HashSet::new(),
        }
    }

    /// Fill unset knobs from `config`, resolve the tri-state child flags and
    /// materialize the non-retryable set for O(1) lookup.
    #[must_use]
    pub fn normalized(mut self, config: &Config) -> Self {
        if self.rps == 0 {
            self.rps = config.default_rps;
        }
        if self.concurrency == 0 {
            self.concurrency = (self.rps / DEFAULT_RPS_PER_CONCURRENCY).max(1) as usize;
        }
        if self.attempts_on_retryable_error == 0 {
            self.attempts_on_retryable_error = config.default_attempts_on_retryable_error;
        }
        if self.heartbeat_timeout.is_zero() {
            self.heartbeat_timeout = config.default_heartbeat_timeout;
        }
        self.operation = match self.operation {
            BatchOperation::Terminate { terminate_children } => BatchOperation::Terminate {
                terminate_children: terminate_children.or(Some(true)),
            },
            BatchOperation::Cancel { cancel_children } => BatchOperation::Cancel {
                cancel_children: cancel_children.or(Some(true)),
            },
            signal @ BatchOperation::Signal { .. } => signal,
        };
        self.non_retryable = self.non_retryable_errors.iter().cloned().collect();
        self
    }

    /// Reject malformed requests. Runs after [`BatchParams::normalized`] and
    /// before any worker is spawned; returns the first failure.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.reason.is_empty() || self.domain.is_empty() || self.query.is_empty() {
            return Err(ParamsError::MissingRequired);
        }
        if let BatchOperation::Signal { signal_name, .. } = &self.operation
            && signal_name.is_empty()
        {
            return Err(ParamsError::MissingSignalName);
        }
        Ok(())
    }

    /// True when a task failure with this message is terminal on first
    /// occurrence.
    pub fn is_non_retryable(&self, message: &str) -> bool {
        self.non_retryable.contains(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminate_params() -> BatchParams {
        BatchParams::new(
            "deals",
            "WorkflowType = 'expired-deal'",
            "cleanup",
            BatchOperation::Terminate {
                terminate_children: None,
            },
        )
    }

    #[test]
    fn normalized_fills_unset_knobs_from_config() {
        let params = terminate_params().normalized(&Config::default());
        assert_eq!(params.rps, DEFAULT_RPS);
        assert_eq!(params.concurrency, (DEFAULT_RPS / 10) as usize);
        assert_eq!(
            params.attempts_on_retryable_error,
            DEFAULT_ATTEMPTS_ON_RETRYABLE_ERROR
        );
        assert_eq!(params.heartbeat_timeout, DEFAULT_HEARTBEAT_TIMEOUT);
    }

    #[test]
    fn normalized_keeps_explicit_knobs() {
        let mut params = terminate_params();
        params.rps = 7;
        params.attempts_on_retryable_error = 3;
        params.heartbeat_timeout = Duration::from_secs(5);
        let params = params.normalized(&Config::default());
        assert_eq!(params.rps, 7);
        // 7 rps floors to zero workers without the minimum of one.
        assert_eq!(params.concurrency, 1);
        assert_eq!(params.attempts_on_retryable_error, 3);
        assert_eq!(params.heartbeat_timeout, Duration::from_secs(5));
    }

    #[test]
    fn normalized_defaults_child_mutation_on() {
        let params = terminate_params().normalized(&Config::default());
        assert!(matches!(
            params.operation,
            BatchOperation::Terminate {
                terminate_children: Some(true)
            }
        ));

        let params = BatchParams::new(
            "deals",
            "q",
            "r",
            BatchOperation::Cancel {
                cancel_children: Some(false),
            },
        )
        .normalized(&Config::default());
        assert!(matches!(
            params.operation,
            BatchOperation::Cancel {
                cancel_children: Some(false)
            }
        ));
    }

    #[test]
    fn normalized_materializes_non_retryable_set() {
        let mut params = terminate_params();
        params.non_retryable_errors = vec!["forbidden".to_string()];
        let params = params.normalized(&Config::default());
        assert!(params.is_non_retryable("forbidden"));
        assert!(!params.is_non_retryable("transient"));
    }

    #[test]
    fn validate_rejects_missing_required_fields() {
        for (domain, query, reason) in [("", "q", "r"), ("d", "", "r"), ("d", "q", "")] {
            let params = BatchParams::new(
                domain,
                query,
                reason,
                BatchOperation::Cancel {
                    cancel_children: None,
                },
            )
            .normalized(&Config::default());
            assert_eq!(params.validate(), Err(ParamsError::MissingRequired));
        }
    }

    #[test]
    fn validate_rejects_signal_without_name() {
        let params = BatchParams::new(
            "deals",
            "q",
            "r",
            BatchOperation::Signal {
                signal_name: String::new(),
                input: "{}".to_string(),
            },
        )
        .normalized(&Config::default());
        assert_eq!(params.validate(), Err(ParamsError::MissingSignalName));
    }

    #[test]
    fn validate_accepts_a_complete_request() {
        let params = terminate_params().normalized(&Config::default());
        assert_eq!(params.validate(), Ok(()));
    }

    #[test]
    fn operation_round_trips_through_json() {
        let operation = BatchOperation::Signal {
            signal_name: "pause".to_string(),
            input: "{\"until\":\"tomorrow\"}".to_string(),
        };
        let encoded = serde_json::to_string(&operation).expect("encode operation");
        let decoded: BatchOperation =
            serde_json::from_str(&encoded).expect("decode operation");
        assert!(matches!(
            decoded,
            BatchOperation::Signal { signal_name, .. } if signal_name == "pause"
        ));
    }
}
