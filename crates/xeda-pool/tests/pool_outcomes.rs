use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::Span;
use xeda_core::errors::{ErrorInfo, XedaError};
use xeda_core::settings::FlowSettings;
use xeda_flow::{Flow, FlowResults};
use xeda_pool::{max_workers_for, TaskOutcome, WorkerPool};

#[derive(Clone, Copy)]
enum Behavior {
    Pass(f64),
    Fail,
    Error,
    Panic,
}

struct MockFlow {
    delay: Duration,
    behavior: Behavior,
    settings: FlowSettings,
    run_dir: PathBuf,
    results: FlowResults,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockFlow {
    fn new(delay_ms: u64, behavior: Behavior) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            behavior,
            settings: FlowSettings::default(),
            run_dir: PathBuf::from("mock"),
            results: FlowResults::new(),
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn counted(mut self, running: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> Self {
        self.running = Arc::clone(running);
        self.peak = Arc::clone(peak);
        self
    }
}

impl Flow for MockFlow {
    fn name(&self) -> &str {
        "mock"
    }

    fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    async fn run(&mut self) -> Result<(), XedaError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Error => Err(XedaError::ToolExecution(ErrorInfo::new(
                "flow.tool_execution",
                "exit status 1",
            ))),
            Behavior::Panic => panic!("synthetic worker crash"),
            Behavior::Pass(_) | Behavior::Fail => Ok(()),
        }
    }

    fn parse_reports(&mut self) -> Result<(), XedaError> {
        match self.behavior {
            Behavior::Pass(frequency) => {
                self.results.insert("success", true);
                self.results.insert("clock_frequency", frequency);
            }
            _ => self.results.insert("success", false),
        }
        Ok(())
    }

    fn results(&self) -> &FlowResults {
        &self.results
    }
}

fn by_index(outcomes: Vec<(usize, TaskOutcome)>) -> BTreeMap<usize, TaskOutcome> {
    outcomes.into_iter().collect()
}

#[test]
fn worker_budget_is_at_least_two() {
    assert_eq!(max_workers_for(16, 4), 4);
    assert_eq!(max_workers_for(4, 4), 2);
    assert_eq!(max_workers_for(1, 8), 2);
    assert_eq!(max_workers_for(8, 0), 8);
}

#[tokio::test]
async fn failures_are_tagged_per_task() {
    let pool = WorkerPool::new(4);
    let tasks = vec![
        MockFlow::new(10, Behavior::Pass(250.0)),
        MockFlow::new(10, Behavior::Fail),
        MockFlow::new(10, Behavior::Error),
        MockFlow::new(10, Behavior::Panic),
    ];
    let batch = pool
        .submit_batch(tasks, Duration::from_secs(5), &Span::none())
        .expect("submit");
    let outcomes = by_index(batch.collect().await);

    assert_eq!(outcomes.len(), 4);
    assert!(outcomes[&0].passed());
    let completed = outcomes[&0].completed().expect("completed");
    assert_eq!(completed.results.get_f64("clock_frequency"), Some(250.0));
    assert!(matches!(outcomes[&1], TaskOutcome::Success(_)));
    assert!(!outcomes[&1].passed());
    assert!(matches!(outcomes[&2], TaskOutcome::TaskError(XedaError::ToolExecution(_))));
    match &outcomes[&3] {
        TaskOutcome::WorkerCrashed(crash) => assert_eq!(crash.message, "synthetic worker crash"),
        other => panic!("expected crash, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrency_is_bounded_by_max_workers() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let pool = WorkerPool::new(2);
    let tasks: Vec<MockFlow> = (0..6)
        .map(|_| MockFlow::new(40, Behavior::Pass(100.0)).counted(&running, &peak))
        .collect();
    let batch = pool
        .submit_batch(tasks, Duration::from_secs(5), &Span::none())
        .expect("submit");
    let outcomes = batch.collect().await;

    assert_eq!(outcomes.len(), 6);
    assert!(outcomes.iter().all(|(_, outcome)| outcome.passed()));
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn timeout_cancels_pending_siblings_and_keeps_completed() {
    let pool = WorkerPool::new(3);
    let tasks = vec![
        MockFlow::new(20, Behavior::Pass(200.0)),
        MockFlow::new(10_000, Behavior::Pass(300.0)),
        MockFlow::new(10_000, Behavior::Pass(400.0)),
    ];
    let mut batch = pool
        .submit_batch(tasks, Duration::from_millis(300), &Span::none())
        .expect("submit");

    let mut outcomes = BTreeMap::new();
    let mut cancelled_after_timeout = None;
    while let Some((index, outcome)) = batch.next_outcome().await {
        if matches!(outcome, TaskOutcome::Timeout) && cancelled_after_timeout.is_none() {
            cancelled_after_timeout = Some(batch.cancel_remaining());
        }
        outcomes.insert(index, outcome);
    }

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[&0].passed());
    assert!(outcomes[&1].is_cancelled());
    assert!(outcomes[&2].is_cancelled());
    let timeouts = outcomes
        .values()
        .filter(|outcome| matches!(outcome, TaskOutcome::Timeout))
        .count();
    let cancelled = cancelled_after_timeout.expect("a task timed out");
    assert!(timeouts >= 1);
    assert_eq!(timeouts + cancelled, 2);
}

#[tokio::test]
async fn cancel_remaining_is_idempotent() {
    let pool = WorkerPool::new(2);
    let tasks = vec![
        MockFlow::new(10_000, Behavior::Pass(1.0)),
        MockFlow::new(10_000, Behavior::Pass(2.0)),
    ];
    let mut batch = pool
        .submit_batch(tasks, Duration::from_secs(60), &Span::none())
        .expect("submit");

    assert_eq!(batch.cancel_remaining(), 2);
    assert_eq!(batch.cancel_remaining(), 0);
    assert_eq!(batch.pending(), 0);
    let outcomes = batch.collect().await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes
        .iter()
        .all(|(_, outcome)| matches!(outcome, TaskOutcome::Cancelled)));
}

#[tokio::test]
async fn cancel_after_completion_is_a_no_op() {
    let pool = WorkerPool::new(2);
    let mut batch = pool
        .submit_batch(
            vec![MockFlow::new(5, Behavior::Pass(10.0))],
            Duration::from_secs(5),
            &Span::none(),
        )
        .expect("submit");
    let (index, outcome) = batch.next_outcome().await.expect("outcome");
    assert_eq!(index, 0);
    assert!(outcome.passed());
    assert!(batch.next_outcome().await.is_none());
    assert_eq!(batch.cancel_remaining(), 0);
    assert_eq!(batch.cancel_remaining(), 0);
}

#[tokio::test]
async fn shutdown_cancels_in_flight_work_and_refuses_new_batches() {
    let pool = WorkerPool::new(1);
    let tasks = vec![
        MockFlow::new(10_000, Behavior::Pass(1.0)),
        MockFlow::new(10_000, Behavior::Pass(2.0)),
    ];
    let batch = pool
        .submit_batch(tasks, Duration::from_secs(60), &Span::none())
        .expect("submit");
    tokio::time::sleep(Duration::from_millis(20)).await;

    pool.shutdown();
    pool.shutdown();
    assert!(pool.is_shut_down());

    let outcomes = tokio::time::timeout(Duration::from_secs(5), batch.collect())
        .await
        .expect("shutdown settles the batch");
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes
        .iter()
        .all(|(_, outcome)| matches!(outcome, TaskOutcome::Cancelled)));

    let err = pool
        .submit_batch(
            vec![MockFlow::new(1, Behavior::Fail)],
            Duration::from_secs(1),
            &Span::none(),
        )
        .unwrap_err();
    assert_eq!(err.info().code, "pool.shut_down");
}

#[tokio::test]
async fn dropping_the_pool_settles_outstanding_tasks() {
    let batch = {
        let pool = WorkerPool::new(2);
        pool.submit_batch(
            vec![MockFlow::new(10_000, Behavior::Pass(1.0))],
            Duration::from_secs(60),
            &Span::none(),
        )
        .expect("submit")
    };
    let outcomes = tokio::time::timeout(Duration::from_secs(5), batch.collect())
        .await
        .expect("drop settles the batch");
    assert!(matches!(outcomes[0].1, TaskOutcome::Cancelled));
}
