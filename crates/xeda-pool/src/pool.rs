//! Bounded concurrent execution of flow batches.

use std::any::Any;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info_span, warn, Instrument, Span};
use xeda_core::errors::{ErrorInfo, XedaError};
use xeda_flow::Flow;

use crate::outcome::{Completed, CrashInfo, TaskOutcome};

/// Worker count for a CPU budget: `max(2, total_cpus / threads_per_flow)`.
pub fn max_workers_for(total_cpus: usize, threads_per_flow: usize) -> usize {
    (total_cpus / threads_per_flow.max(1)).max(2)
}

/// Runs flows concurrently, at most `max_workers` at a time.
///
/// The pool is its own cleanup guard: [`WorkerPool::shutdown`] runs on drop,
/// cancelling every outstanding task of every batch it launched.
#[derive(Debug)]
pub struct WorkerPool {
    max_workers: usize,
    permits: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Creates a pool with `max_workers` slots (at least one).
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        let (shutdown, _) = watch::channel(false);
        Self {
            max_workers,
            permits: Arc::new(Semaphore::new(max_workers)),
            shutdown,
        }
    }

    /// Number of tasks that may run at once.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Whether [`WorkerPool::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Starts every task of a batch. Must be called inside a Tokio runtime.
    ///
    /// Each task runs `run` then `parse_reports` in its own spawned task,
    /// inside a `trial` span parented to `span`. Failures are reported as
    /// tagged outcomes and never affect sibling tasks.
    pub fn submit_batch<F: Flow>(
        &self,
        tasks: Vec<F>,
        timeout: Duration,
        span: &Span,
    ) -> Result<Batch, XedaError> {
        if self.is_shut_down() {
            return Err(XedaError::Pool(
                ErrorInfo::new("pool.shut_down", "worker pool has been shut down")
                    .with_context("tasks", tasks.len().to_string()),
            ));
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut supervisors = JoinSet::new();
        let pending: BTreeSet<usize> = (0..tasks.len()).collect();

        for (index, flow) in tasks.into_iter().enumerate() {
            let trial_span = info_span!(parent: span, "trial", index, flow = flow.name());
            let sender = sender.clone();
            let permits = Arc::clone(&self.permits);
            let shutdown = self.shutdown.subscribe();
            supervisors.spawn(
                async move {
                    let outcome = supervise(flow, permits, shutdown, timeout).await;
                    match &outcome {
                        TaskOutcome::Success(completed) => {
                            debug!(success = completed.results.success(), "trial finished")
                        }
                        TaskOutcome::Timeout => warn!(?timeout, "trial timed out"),
                        TaskOutcome::WorkerCrashed(crash) => {
                            warn!(message = %crash.message, "worker crashed")
                        }
                        TaskOutcome::TaskError(err) => warn!(error = %err, "trial failed"),
                        TaskOutcome::Cancelled => debug!("trial cancelled"),
                    }
                    // The batch may already be gone; the outcome is moot then.
                    let _ = sender.send((index, outcome));
                }
                .instrument(trial_span),
            );
        }

        Ok(Batch {
            supervisors,
            outcomes: receiver,
            pending,
            ready: VecDeque::new(),
        })
    }

    /// Cancels all outstanding work and refuses new batches. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            debug!(max_workers = self.max_workers, "worker pool shutting down");
        }
        self.permits.close();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Aborts the wrapped task when dropped, so a timed out or cancelled
/// supervisor never leaves its flow running.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn supervise<F: Flow>(
    flow: F,
    permits: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
    timeout: Duration,
) -> TaskOutcome {
    let _permit = tokio::select! {
        permit = permits.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return TaskOutcome::Cancelled,
        },
        _ = stopped(&mut shutdown) => return TaskOutcome::Cancelled,
    };

    let mut worker = AbortOnDrop(tokio::spawn(execute(flow).in_current_span()));
    tokio::select! {
        _ = stopped(&mut shutdown) => TaskOutcome::Cancelled,
        joined = tokio::time::timeout(timeout, &mut worker.0) => match joined {
            Ok(Ok(Ok(completed))) => TaskOutcome::Success(completed),
            Ok(Ok(Err(err))) => TaskOutcome::TaskError(err),
            Ok(Err(join_error)) => crash_outcome(join_error),
            Err(_) => TaskOutcome::Timeout,
        },
    }
}

/// Resolves once shutdown is requested or the pool is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn execute<F: Flow>(mut flow: F) -> Result<Completed, XedaError> {
    flow.run().await?;
    flow.parse_reports()?;
    Ok(Completed {
        results: flow.results().clone(),
        settings: flow.settings().clone(),
        run_dir: flow.run_dir().to_path_buf(),
    })
}

fn crash_outcome(join_error: JoinError) -> TaskOutcome {
    if !join_error.is_panic() {
        return TaskOutcome::Cancelled;
    }
    TaskOutcome::WorkerCrashed(CrashInfo {
        message: panic_message(join_error.into_panic()),
    })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Outcomes of one submitted batch, delivered in completion order.
///
/// Dropping the batch aborts whatever is still running.
#[derive(Debug)]
pub struct Batch {
    supervisors: JoinSet<()>,
    outcomes: mpsc::UnboundedReceiver<(usize, TaskOutcome)>,
    pending: BTreeSet<usize>,
    ready: VecDeque<(usize, TaskOutcome)>,
}

impl Batch {
    /// Number of tasks whose outcome has not been delivered or settled yet.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Next `(task index, outcome)` pair, or `None` once every task has
    /// been reported.
    pub async fn next_outcome(&mut self) -> Option<(usize, TaskOutcome)> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(item);
            }
            if self.pending.is_empty() {
                return None;
            }
            match self.outcomes.recv().await {
                Some((index, outcome)) => {
                    if self.pending.remove(&index) {
                        return Some((index, outcome));
                    }
                }
                None => {
                    let lost = std::mem::take(&mut self.pending);
                    self.ready
                        .extend(lost.into_iter().map(|index| (index, TaskOutcome::Cancelled)));
                }
            }
        }
    }

    /// Aborts every task still running and settles it as
    /// [`TaskOutcome::Cancelled`]. Outcomes that already arrived are kept.
    ///
    /// Returns how many tasks were cancelled; calling it again, or after the
    /// batch completed, returns 0.
    pub fn cancel_remaining(&mut self) -> usize {
        self.supervisors.abort_all();
        while let Ok((index, outcome)) = self.outcomes.try_recv() {
            if self.pending.remove(&index) {
                self.ready.push_back((index, outcome));
            }
        }
        let cancelled = std::mem::take(&mut self.pending);
        let count = cancelled.len();
        self.ready
            .extend(cancelled.into_iter().map(|index| (index, TaskOutcome::Cancelled)));
        count
    }

    /// Waits for every remaining outcome.
    pub async fn collect(mut self) -> Vec<(usize, TaskOutcome)> {
        let mut outcomes = Vec::new();
        while let Some(item) = self.next_outcome().await {
            outcomes.push(item);
        }
        outcomes
    }
}
