//! Heartbeat progress record and the activity-host seam.

use serde::{Deserialize, Serialize};

/// Progress checkpoint emitted to the activity host.
///
/// Recorded after every fully-drained page and on every node of a child
/// walk. The host stores it opaquely; a re-invoked activity restores it and
/// resumes scanning at `page_token` instead of from the beginning.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatDetails {
    /// Visibility cursor for the next scan call. Empty at a fresh start and
    /// once the result set is exhausted.
    pub page_token: Vec<u8>,
    /// Number of pages fully drained so far.
    pub current_page: u32,
    /// Result-set size sampled once at fresh start. Display only; it drifts
    /// as mutations shrink the live result set and is never refreshed.
    pub total_estimate: i64,
    /// Targets resolved successfully, including already-deleted ones.
    pub success_count: usize,
    /// Targets that gave up after a terminal failure.
    pub error_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatRestoreError {
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Message(String),
}

/// Heartbeat surface of the surrounding durable-execution host.
///
/// A failed restore is never fatal: the engine logs it, bumps the failure
/// counter and rescans from the beginning.
pub trait ActivityHost: Send + Sync {
    /// Whether a previous invocation left heartbeat details behind.
    fn has_heartbeat_details(&self) -> bool;

    /// Decode the recorded heartbeat details.
    fn heartbeat_details(&self) -> Result<HeartbeatDetails, HeartbeatRestoreError>;

    /// Record fresh heartbeat details, keeping the activity alive and
    /// checkpointing progress.
    fn record_heartbeat(&self, details: &HeartbeatDetails);
}

#[cfg(test)]
mod tests {
    use super::HeartbeatDetails;

    #[test]
    fn default_details_are_a_fresh_start() {
        let details = HeartbeatDetails::default();
        assert!(details.page_token.is_empty());
        assert_eq!(details.current_page, 0);
        assert_eq!(details.total_estimate, 0);
        assert_eq!(details.success_count, 0);
        assert_eq!(details.error_count, 0);
    }

    #[test]
    fn details_round_trip_through_json() {
        let details = HeartbeatDetails {
            page_token: vec![0x17, 0x2a],
            current_page: 4,
            total_estimate: 90_000,
            success_count: 3_998,
            error_count: 2,
        };
        let encoded = serde_json::to_vec(&details).expect("encode details");
        let decoded: HeartbeatDetails =
            serde_json::from_slice(&encoded).expect("decode details");
        assert_eq!(decoded, details);
    }
}
