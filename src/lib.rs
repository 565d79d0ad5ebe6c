//! Rockfall - resumable, rate-limited bulk operations over workflow
//! executions.
//!
//! Given a visibility query, rockfall applies one mutation (terminate,
//! cancel or signal) to every matching workflow execution. The result set
//! can be very large, so the engine scans it page by page behind an opaque
//! cursor, fans each page out to a bounded worker pool under a global token
//! bucket, walks pending children breadth-first, and checkpoints progress
//! through the surrounding activity host's heartbeat mechanism. A restarted
//! activity resumes at the last fully-drained page instead of rescanning.
//!
//! The crate is a library. The durable-workflow trampoline that schedules
//! the activity, the real remote client and the metrics sink all live in the
//! embedding process:
//!
//! - [`WorkflowServiceClient`]: the injected, domain-scoped service client
//! - [`ActivityHost`]: the heartbeat surface of the durable-execution host
//! - [`run_batch`]: the activity body - normalize, validate, dispatch
//!
//! Mutations are at-least-once: a target can be mutated again after a retry
//! or a resume, and a second attempt observing the target already gone is
//! folded into success.

pub mod activity;
pub mod client;
pub mod config;
pub mod dispatcher;
mod operation;
pub mod params;
pub mod rate_limiter;
mod worker;

// Activity surface
pub use activity::{ActivityHost, HeartbeatDetails, HeartbeatRestoreError};

// Client seam
pub use client::{
    ClientError, ClientResult, ExecutionDescription, ScanPage, WorkflowExecution,
    WorkflowServiceClient,
};

// Configuration
pub use config::Config;

// Engine
pub use dispatcher::{BatchDispatcher, EngineError, run_batch};
pub use params::{
    ActivityRetryPolicy, BATCH_ACTIVITY_RETRY_POLICY, BatchOperation, BatchParams,
    DEFAULT_ATTEMPTS_ON_RETRYABLE_ERROR, DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_RPS,
    DEFAULT_RPS_PER_CONCURRENCY, PAGE_SIZE, ParamsError,
};
pub use rate_limiter::RateLimiter;
