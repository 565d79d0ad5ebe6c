//! Batch dispatcher: the scan-dispatch-heartbeat loop.
//!
//! The dispatcher owns the paginated visibility scan. For each page it fans
//! the targets out to the worker pool, blocks until exactly one outcome per
//! target has come back, then advances the cursor and records a heartbeat.
//! Anchoring heartbeats to fully-drained pages means a restarted activity
//! never re-processes a page it already finished; at worst it replays the
//! page it was interrupted in, which the at-least-once mutation semantics
//! tolerate.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activity::{ActivityHost, HeartbeatDetails};
use crate::client::{ClientError, WorkflowServiceClient};
use crate::config::Config;
use crate::operation::OperationStrategy;
use crate::params::{BatchParams, PAGE_SIZE, ParamsError};
use crate::rate_limiter::RateLimiter;
use crate::worker::{TaskDetail, TaskProcessor};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    InvalidParams(#[from] ParamsError),
    #[error("visibility count failed: {0}")]
    Count(#[source] ClientError),
    #[error("visibility scan failed: {0}")]
    Scan(#[source] ClientError),
    #[error("batch run cancelled")]
    Cancelled,
}

/// Activity entry point: normalize the request, validate it, and drive the
/// dispatcher to completion or the first non-recoverable error.
pub async fn run_batch<C, H>(
    config: &Config,
    params: BatchParams,
    client: Arc<C>,
    host: Arc<H>,
    shutdown: CancellationToken,
) -> Result<HeartbeatDetails, EngineError>
where
    C: WorkflowServiceClient + 'static,
    H: ActivityHost + 'static,
{
    let params = params.normalized(config);
    params.validate()?;
    BatchDispatcher::new(params, client, host).run(shutdown).await
}

/// Drives one batch request to completion.
pub struct BatchDispatcher<C, H> {
    params: BatchParams,
    client: Arc<C>,
    host: Arc<H>,
}

impl<C, H> BatchDispatcher<C, H>
where
    C: WorkflowServiceClient + 'static,
    H: ActivityHost + 'static,
{
    /// `params` must already be normalized and validated; [`run_batch`] is
    /// the entry point that does both.
    pub fn new(params: BatchParams, client: Arc<C>, host: Arc<H>) -> Self {
        Self {
            params,
            client,
            host,
        }
    }

    /// Run the scan-dispatch-heartbeat loop until the result set is
    /// exhausted, returning the final progress record.
    pub async fn run(self, shutdown: CancellationToken) -> Result<HeartbeatDetails, EngineError> {
        let mut hbd = self.restore_or_count(&shutdown).await?;

        info!(
            domain = %self.params.domain,
            query = %self.params.query,
            rps = self.params.rps,
            concurrency = self.params.concurrency,
            resumed_page = hbd.current_page,
            total_estimate = hbd.total_estimate,
            "starting batch dispatch"
        );

        let params = Arc::new(self.params.clone());
        let strategy = Arc::new(OperationStrategy::resolve(&self.params));
        let limiter = Arc::new(RateLimiter::new(params.rps, params.rps));
        let (task_tx, task_rx) = mpsc::channel(PAGE_SIZE);
        let (outcome_tx, mut outcome_rx) = mpsc::channel(PAGE_SIZE);
        let task_rx = Arc::new(Mutex::new(task_rx));

        // Child token so normal completion can retire the pool without
        // cancelling the caller's context.
        let worker_shutdown = shutdown.child_token();
        let mut workers = Vec::with_capacity(params.concurrency);
        for _ in 0..params.concurrency {
            let processor = TaskProcessor {
                params: Arc::clone(&params),
                strategy: Arc::clone(&strategy),
                client: Arc::clone(&self.client),
                host: Arc::clone(&self.host),
                limiter: Arc::clone(&limiter),
                task_rx: Arc::clone(&task_rx),
                task_tx: task_tx.clone(),
                outcome_tx: outcome_tx.clone(),
            };
            workers.push(tokio::spawn(processor.run(worker_shutdown.clone())));
        }
        // Workers hold their own clones; keeping the originals would mask
        // pool death on the receive side.
        drop(outcome_tx);

        let result = self
            .page_loop(&mut hbd, &task_tx, &mut outcome_rx, &shutdown)
            .await;

        worker_shutdown.cancel();
        drop(task_tx);
        for worker in workers {
            let _ = worker.await;
        }

        match result {
            Ok(()) => {
                info!(
                    pages = hbd.current_page,
                    success_count = hbd.success_count,
                    error_count = hbd.error_count,
                    "batch dispatch complete"
                );
                Ok(hbd)
            }
            Err(err) => Err(err),
        }
    }

    /// Resume from recorded heartbeat details when the host has them,
    /// otherwise start fresh with a result-set estimate.
    async fn restore_or_count(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<HeartbeatDetails, EngineError> {
        if self.host.has_heartbeat_details() {
            match self.host.heartbeat_details() {
                Ok(hbd) => {
                    info!(
                        current_page = hbd.current_page,
                        success_count = hbd.success_count,
                        error_count = hbd.error_count,
                        "resuming batch from recorded heartbeat"
                    );
                    return Ok(hbd);
                }
                Err(err) => {
                    metrics::counter!("rockfall_processor_failures_total").increment(1);
                    warn!(
                        error = ?err,
                        "failed to recover from last heartbeat, starting over from the beginning"
                    );
                }
            }
        }

        let total_estimate = tokio::select! {
            _ = shutdown.cancelled() => return Err(EngineError::Cancelled),
            result = self.client.count_executions(&self.params.query) => {
                result.map_err(EngineError::Count)?
            }
        };
        Ok(HeartbeatDetails {
            total_estimate,
            ..HeartbeatDetails::default()
        })
    }

    async fn page_loop(
        &self,
        hbd: &mut HeartbeatDetails,
        task_tx: &mpsc::Sender<TaskDetail>,
        outcome_rx: &mut mpsc::Receiver<Result<(), ClientError>>,
        shutdown: &CancellationToken,
    ) -> Result<(), EngineError> {
        loop {
            let page = tokio::select! {
                _ = shutdown.cancelled() => return Err(EngineError::Cancelled),
                result = self
                    .client
                    .scan_executions(&self.params.query, PAGE_SIZE, &hbd.page_token) =>
                {
                    result.map_err(EngineError::Scan)?
                }
            };
            if page.executions.is_empty() {
                return Ok(());
            }

            // Channel capacity covers a full page, so enqueueing never
            // blocks against the workers.
            for execution in &page.executions {
                let task = TaskDetail {
                    execution: execution.clone(),
                    attempts: 0,
                    hbd: hbd.clone(),
                };
                if task_tx.send(task).await.is_err() {
                    // Workers only disappear when the run is cancelled.
                    return Err(EngineError::Cancelled);
                }
            }

            let mut success = 0usize;
            let mut errors = 0usize;
            while success + errors < page.executions.len() {
                tokio::select! {
                    _ = shutdown.cancelled() => return Err(EngineError::Cancelled),
                    outcome = outcome_rx.recv() => match outcome {
                        Some(Ok(())) => success += 1,
                        Some(Err(_)) => errors += 1,
                        None => return Err(EngineError::Cancelled),
                    },
                }
            }

            hbd.current_page += 1;
            hbd.page_token = page.next_page_token;
            hbd.success_count += success;
            hbd.error_count += errors;
            self.host.record_heartbeat(hbd);
            debug!(
                page = hbd.current_page,
                success, errors, "page drained"
            );

            if hbd.page_token.is_empty() {
                return Ok(());
            }
        }
    }
}
