//! Task-processing workers.
//!
//! Each worker pulls one task at a time from the shared task channel,
//! applies the operation to the target and its pending children, and
//! publishes the outcome. Retryable failures go back onto the task channel
//! with an incremented attempt count; non-retryable or exhausted ones are
//! published as terminal errors and counted by the dispatcher.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::activity::{ActivityHost, HeartbeatDetails};
use crate::client::{ClientError, WorkflowExecution, WorkflowServiceClient};
use crate::operation::OperationStrategy;
use crate::params::BatchParams;
use crate::rate_limiter::RateLimiter;

/// One unit of work: a scanned target plus the heartbeat details current
/// when it was enqueued.
///
/// The snapshot lets a worker deep in a child walk keep the activity alive
/// with the dispatcher's last-known cursor while the dispatcher itself is
/// blocked waiting for this page to drain.
#[derive(Clone, Debug)]
pub(crate) struct TaskDetail {
    pub execution: WorkflowExecution,
    pub attempts: u32,
    pub hbd: HeartbeatDetails,
}

pub(crate) type SharedTaskReceiver = Arc<Mutex<mpsc::Receiver<TaskDetail>>>;

enum WalkOutcome {
    Done(Result<(), ClientError>),
    Cancelled,
}

/// Long-lived task consumer; the dispatcher spawns `concurrency` of these
/// before scanning the first page.
///
/// Workers never exit on an empty channel; they run until the dispatcher's
/// cancellation token fires.
pub(crate) struct TaskProcessor<C, H> {
    pub params: Arc<BatchParams>,
    pub strategy: Arc<OperationStrategy>,
    pub client: Arc<C>,
    pub host: Arc<H>,
    pub limiter: Arc<RateLimiter>,
    pub task_rx: SharedTaskReceiver,
    pub task_tx: mpsc::Sender<TaskDetail>,
    pub outcome_tx: mpsc::Sender<Result<(), ClientError>>,
}

impl<C, H> TaskProcessor<C, H>
where
    C: WorkflowServiceClient + 'static,
    H: ActivityHost + 'static,
{
    pub(crate) async fn run(self, shutdown: CancellationToken) {
        loop {
            let task = tokio::select! {
                _ = shutdown.cancelled() => return,
                task = Self::next_task(&self.task_rx) => match task {
                    Some(task) => task,
                    None => return,
                },
            };
            match self.process(&task, &shutdown).await {
                WalkOutcome::Done(result) => self.publish(task, result).await,
                WalkOutcome::Cancelled => return,
            }
        }
    }

    async fn next_task(task_rx: &SharedTaskReceiver) -> Option<TaskDetail> {
        task_rx.lock().await.recv().await
    }

    /// Apply the operation to the task's target and, when the strategy walks
    /// children, to the transitive tree of pending children, breadth-first.
    async fn process(&self, task: &TaskDetail, shutdown: &CancellationToken) -> WalkOutcome {
        let mut queue = VecDeque::new();
        queue.push_back(task.execution.clone());

        while let Some(execution) = queue.pop_front() {
            if shutdown.is_cancelled() {
                return WalkOutcome::Cancelled;
            }
            tokio::select! {
                _ = shutdown.cancelled() => return WalkOutcome::Cancelled,
                _ = self.limiter.acquire() => {}
            }

            let mutated = tokio::select! {
                _ = shutdown.cancelled() => return WalkOutcome::Cancelled,
                result = self.strategy.mutate(self.client.as_ref(), &execution) => result,
            };
            match mutated {
                // Already gone: the caller's intent is achieved.
                Ok(()) | Err(ClientError::EntityNotExists) => {}
                Err(err) => return WalkOutcome::Done(Err(err)),
            }

            let described = tokio::select! {
                _ = shutdown.cancelled() => return WalkOutcome::Cancelled,
                result = self.client.describe_execution(&execution) => result,
            };
            let description = match described {
                Ok(description) => description,
                // Deleted underneath us; children are unknowable.
                Err(ClientError::EntityNotExists) => continue,
                Err(err) => return WalkOutcome::Done(Err(err)),
            };

            if self.strategy.applies_to_children() && !description.pending_children.is_empty() {
                info!(
                    count = description.pending_children.len(),
                    workflow_id = %execution.workflow_id,
                    "found pending child executions to process"
                );
                queue.extend(description.pending_children);
            }

            // Deep child trees under a starved limiter would outlive the
            // heartbeat timeout without a per-node refresh.
            self.host.record_heartbeat(&task.hbd);
        }

        WalkOutcome::Done(Ok(()))
    }

    /// Report a finished walk: successes and terminal failures go to the
    /// dispatcher, retryable failures back onto the task channel.
    async fn publish(&self, mut task: TaskDetail, result: Result<(), ClientError>) {
        match result {
            Ok(()) => {
                metrics::counter!("rockfall_processor_success_total").increment(1);
                if self.outcome_tx.send(Ok(())).await.is_err() {
                    warn!("outcome channel closed, dropping success");
                }
            }
            Err(err) => {
                metrics::counter!("rockfall_processor_failures_total").increment(1);
                error!(
                    workflow_id = %task.execution.workflow_id,
                    run_id = %task.execution.run_id,
                    attempts = task.attempts,
                    error = ?err,
                    "failed to process batch operation task"
                );

                let terminal = self.params.is_non_retryable(&err.to_string())
                    || task.attempts + 1 >= self.params.attempts_on_retryable_error;
                if terminal {
                    if self.outcome_tx.send(Err(err)).await.is_err() {
                        warn!("outcome channel closed, dropping terminal failure");
                    }
                } else {
                    task.attempts += 1;
                    // The channel always has room: every held task freed a
                    // slot when it was received.
                    if self.task_tx.send(task).await.is_err() {
                        warn!("task channel closed, dropping retry");
                    }
                }
            }
        }
    }
}
