//! Client interface for the remote workflow service.
//!
//! The engine reaches the visibility index and the per-execution mutation
//! RPCs through this seam; the embedding process injects an implementation
//! scoped to the request's domain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifies a single workflow execution. Both ids are opaque strings;
/// equality is structural.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub run_id: String,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

/// One page of visibility scan results.
#[derive(Clone, Debug, Default)]
pub struct ScanPage {
    pub executions: Vec<WorkflowExecution>,
    /// Cursor for the next scan call; empty means the result set is
    /// exhausted.
    pub next_page_token: Vec<u8>,
}

/// The slice of a describe response the engine consumes.
#[derive(Clone, Debug, Default)]
pub struct ExecutionDescription {
    pub pending_children: Vec<WorkflowExecution>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The execution is not running or has been deleted.
    ///
    /// On a mutation this counts as success (the caller's intent is already
    /// achieved); on a describe it means the children are unknowable and the
    /// walk moves on.
    #[error("entity not exists")]
    EntityNotExists,
    /// Any other remote failure. Task-level retry classification matches the
    /// display string against the request's non-retryable set.
    #[error("{0}")]
    Remote(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Domain-scoped client for the workflow service.
///
/// `scan_executions` pages through an opaque cursor; the backend is assumed
/// to keep a cursor valid while executions it has already passed are being
/// mutated. The engine does not detect or repair cursor drift.
#[async_trait]
pub trait WorkflowServiceClient: Send + Sync {
    /// Estimate the number of executions matching `query`.
    async fn count_executions(&self, query: &str) -> ClientResult<i64>;

    /// Fetch one page of executions matching `query`. An empty `page_token`
    /// starts from the beginning.
    async fn scan_executions(
        &self,
        query: &str,
        page_size: usize,
        page_token: &[u8],
    ) -> ClientResult<ScanPage>;

    /// Describe an execution, exposing its pending children.
    async fn describe_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> ClientResult<ExecutionDescription>;

    async fn terminate_execution(
        &self,
        execution: &WorkflowExecution,
        reason: &str,
        details: &[u8],
    ) -> ClientResult<()>;

    async fn cancel_execution(&self, execution: &WorkflowExecution) -> ClientResult<()>;

    async fn signal_execution(
        &self,
        execution: &WorkflowExecution,
        signal_name: &str,
        input: &str,
    ) -> ClientResult<()>;
}
