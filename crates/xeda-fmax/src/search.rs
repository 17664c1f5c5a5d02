//! Adaptive search for the highest passing clock frequency.

use std::fmt;
use std::time::Instant;

use tracing::{info, warn, Span};
use xeda_core::rng::RngHandle;
use xeda_core::XedaError;
use xeda_flow::{format_results, Flow};
use xeda_pool::{TaskOutcome, WorkerPool};

use crate::best::BestTracker;
use crate::candidates::{generate, CandidateBatch, SearchInterval, Trial, TriedSet};
use crate::config::FmaxConfig;

const NS_MHZ: f64 = 1000.0;
const PROGRESS_KEYS: [&str; 5] = ["clock_period", "clock_frequency", "lut", "ff", "slice"];

/// Builds the flow that evaluates one candidate.
pub trait TrialFactory {
    /// Flow type produced for every trial.
    type Flow: Flow;

    /// Flow running at `trial.clock_period`.
    fn build(&self, trial: &Trial) -> Result<Self::Flow, XedaError>;
}

/// Why a search run stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// The window became narrower than the resolution.
    WindowClosed,
    /// Candidate spacing fell below half the resolution.
    Converged,
    /// Too many consecutive iterations without improvement.
    NoImprovementLimit,
    /// The operator interrupted the run.
    Interrupted,
    /// Every candidate the window could still produce was already tried.
    Exhausted,
    /// A run-level failure (trial setup or pool) stopped the search.
    Failed(XedaError),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::WindowClosed => f.write_str("search window closed"),
            Termination::Converged => f.write_str("candidate spacing converged"),
            Termination::NoImprovementLimit => f.write_str("no-improvement limit reached"),
            Termination::Interrupted => f.write_str("interrupted"),
            Termination::Exhausted => f.write_str("no untried candidates left"),
            Termination::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Reduction of one iteration's outcomes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IterationReport {
    /// 1-based iteration number.
    pub iteration: u32,
    /// Batch index of the last candidate that improved the best.
    pub improved_index: Option<usize>,
    /// Trials that finished with a passing result.
    pub passed: usize,
    /// Trials that finished with a failing result.
    pub failed: usize,
    /// Trials that crashed or returned an error.
    pub errored: usize,
    /// Trials that timed out or were cancelled.
    pub cancelled: usize,
    /// Frequencies of the trials that finished with a failing result.
    pub failing: Vec<f64>,
    /// Set when this iteration ends the search.
    pub termination: Option<Termination>,
}

/// Search state. Mutated only by the coordinating task, one iteration at a
/// time.
#[derive(Debug)]
pub struct FmaxSearch {
    config: FmaxConfig,
    max_workers: usize,
    interval: SearchInterval,
    tried: TriedSet,
    no_improvements: u32,
    tracker: BestTracker,
    iterations: u32,
    rng: RngHandle,
    started: Instant,
}

impl FmaxSearch {
    /// Starts a search over the configured window.
    pub fn new(config: FmaxConfig, max_workers: usize, rng: RngHandle) -> Result<Self, XedaError> {
        config.validate()?;
        let interval = SearchInterval {
            lo: config.low_freq,
            hi: config.high_freq,
        };
        Ok(Self {
            config,
            max_workers: max_workers.max(2),
            interval,
            tried: TriedSet::default(),
            no_improvements: 0,
            tracker: BestTracker::new(),
            iterations: 0,
            rng,
            started: Instant::now(),
        })
    }

    /// Search configuration.
    pub fn config(&self) -> &FmaxConfig {
        &self.config
    }

    /// Candidates generated per iteration.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Current window.
    pub fn interval(&self) -> SearchInterval {
        self.interval
    }

    /// Every frequency submitted so far.
    pub fn tried(&self) -> &TriedSet {
        &self.tried
    }

    /// Consecutive iterations without improvement.
    pub fn no_improvements(&self) -> u32 {
        self.no_improvements
    }

    /// Completed iterations.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Best-result tracker.
    pub fn tracker(&self) -> &BestTracker {
        &self.tracker
    }

    /// Seed of the jitter RNG.
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Whole minutes since the search started.
    pub fn elapsed_minutes(&self) -> u64 {
        self.started.elapsed().as_secs() / 60
    }

    /// True once the window is narrower than the resolution.
    pub fn window_closed(&self) -> bool {
        self.interval.lo >= self.interval.hi - self.config.resolution
    }

    /// Next batch of candidates, recorded as tried. Fails with the
    /// termination that applies when no batch can be produced.
    pub fn next_candidates(&mut self) -> Result<CandidateBatch, Termination> {
        if self.window_closed() {
            return Err(Termination::WindowClosed);
        }
        let batch = generate(
            &mut self.interval,
            &self.tried,
            self.max_workers,
            &self.config,
            &mut self.rng,
        )
        .ok_or(Termination::Exhausted)?;
        self.tried.record(&batch);
        Ok(batch)
    }

    /// Reduces a batch's outcomes (in arrival order) and adjusts the window.
    pub fn absorb(
        &mut self,
        batch: &CandidateBatch,
        outcomes: Vec<(usize, TaskOutcome)>,
    ) -> IterationReport {
        let mut report = self.open_report();
        for (index, outcome) in outcomes {
            self.observe(batch, &mut report, index, outcome);
        }
        self.settle(batch, report)
    }

    fn open_report(&self) -> IterationReport {
        IterationReport {
            iteration: self.iterations + 1,
            ..IterationReport::default()
        }
    }

    /// Folds one outcome into the report. A passing trial replaces the best
    /// immediately, so it survives an interrupt that drops the rest of the
    /// batch.
    fn observe(
        &mut self,
        batch: &CandidateBatch,
        report: &mut IterationReport,
        index: usize,
        outcome: TaskOutcome,
    ) {
        let Some(trial) = batch.trials.get(index) else {
            warn!(index, "outcome for an unknown candidate");
            return;
        };
        match outcome {
            TaskOutcome::Success(completed) => {
                if !completed.results.success() {
                    report.failed += 1;
                    report.failing.push(trial.frequency);
                    return;
                }
                report.passed += 1;
                if self
                    .tracker
                    .record(trial.frequency, &completed.results, &completed.settings)
                {
                    report.improved_index = Some(index);
                }
            }
            TaskOutcome::WorkerCrashed(crash) => {
                warn!(index, frequency = trial.frequency, message = %crash.message, "trial crashed");
                report.errored += 1;
            }
            TaskOutcome::TaskError(err) => {
                warn!(index, frequency = trial.frequency, error = %err, "trial failed");
                report.errored += 1;
            }
            TaskOutcome::Timeout | TaskOutcome::Cancelled => report.cancelled += 1,
        }
    }

    fn settle(&mut self, batch: &CandidateBatch, mut report: IterationReport) -> IterationReport {
        self.iterations += 1;
        report.termination = self.adjust(batch, report.improved_index, &report.failing);
        report
    }

    fn adjust(
        &mut self,
        batch: &CandidateBatch,
        improved_index: Option<usize>,
        failing: &[f64],
    ) -> Option<Termination> {
        let resolution = self.config.resolution;
        let delta = self.config.delta();
        let tuning = self.config.tuning.clone();

        if batch.step < 0.5 * resolution {
            return Some(Termination::Converged);
        }

        match (improved_index, self.tracker.best()) {
            (Some(index), Some(best)) => {
                self.no_improvements = 0;
                let best_frequency = best.frequency;
                let wns = best.results.wns();
                self.interval.lo = best_frequency + delta + delta * self.rng.unit();

                let frequencies = batch.frequencies();
                let last = frequencies.last().copied().unwrap_or(best_frequency);
                if index + 2 >= frequencies.len() || last - best_frequency <= batch.step {
                    let lo_point = if frequencies.len() > 4 {
                        frequencies[1]
                    } else {
                        frequencies[0]
                    };
                    let mut target =
                        best_frequency + f64::min(self.max_workers as f64, best_frequency - lo_point);
                    if let Some(wns) = wns {
                        let min_period = NS_MHZ / best_frequency - wns - tuning.slack_epsilon;
                        if min_period > 0.0 {
                            target = target.max((NS_MHZ / min_period).ceil());
                        }
                    }
                    self.interval.hi = target;
                } else if tuning.pull_hi_to_failure {
                    let first_failure = failing
                        .iter()
                        .copied()
                        .filter(|&frequency| frequency > best_frequency)
                        .fold(f64::INFINITY, f64::min);
                    if first_failure.is_finite() {
                        self.interval.hi = self.interval.hi.min(first_failure + delta);
                    }
                }
                self.interval.hi +=
                    tuning.headroom_resolutions * resolution + batch.step + self.rng.unit();
            }
            _ => {
                self.no_improvements += 1;
                if self.no_improvements >= self.config.max_no_improvements {
                    return Some(Termination::NoImprovementLimit);
                }
                let shrink = tuning.shrink_base + f64::from(self.no_improvements);
                match self.tracker.frequency() {
                    None => {
                        self.interval.hi = self.interval.lo + resolution;
                        self.interval.lo /= shrink;
                    }
                    Some(best_frequency) => {
                        self.interval.hi = (best_frequency + self.interval.hi) / 2.0 + delta;
                        self.interval.lo =
                            (self.interval.lo + best_frequency) / 2.0 + delta * self.rng.unit();
                    }
                }
            }
        }

        self.interval.hi += self.rng.unit() * delta;
        None
    }

    /// Generates, dispatches and reduces one iteration.
    ///
    /// A timeout forfeits the rest of its batch: every sibling still
    /// pending is cancelled and the iteration is reduced with what finished.
    pub async fn run_iteration<T: TrialFactory>(
        &mut self,
        factory: &T,
        pool: &WorkerPool,
        span: &Span,
    ) -> Result<IterationReport, XedaError> {
        let batch = match self.next_candidates() {
            Ok(batch) => batch,
            Err(termination) => {
                if termination == Termination::Exhausted {
                    warn!(parent: span, lo = self.interval.lo, hi = self.interval.hi, tried = self.tried.len(), "no untried candidates left");
                }
                return Ok(IterationReport {
                    iteration: self.iterations,
                    termination: Some(termination),
                    ..IterationReport::default()
                });
            }
        };
        let listed: Vec<String> = batch
            .trials
            .iter()
            .map(|trial| format!("{:.2}", trial.frequency))
            .collect();
        info!(parent: span, iteration = self.iterations + 1, frequencies = ?listed, "trying frequencies (MHz)");

        let flows = batch
            .trials
            .iter()
            .map(|trial| factory.build(trial))
            .collect::<Result<Vec<_>, _>>()?;
        let mut running = pool.submit_batch(flows, self.config.timeout(), span)?;

        let mut report = self.open_report();
        while let Some((index, outcome)) = running.next_outcome().await {
            let timed_out = matches!(outcome, TaskOutcome::Timeout);
            self.observe(&batch, &mut report, index, outcome);
            if timed_out {
                let cancelled = running.cancel_remaining();
                warn!(
                    parent: span,
                    index,
                    timeout_secs = self.config.timeout_secs,
                    cancelled,
                    "trial exceeded its timeout, cancelling the rest of the batch"
                );
            }
        }

        let report = self.settle(&batch, report);
        self.log_progress(&report, span);
        Ok(report)
    }

    fn log_progress(&self, report: &IterationReport, span: &Span) {
        if report.improved_index.is_none() {
            info!(parent: span, no_improvements = self.no_improvements, "no improvement during this iteration");
        }
        info!(
            parent: span,
            iteration = report.iteration,
            minutes = self.elapsed_minutes(),
            passed = report.passed,
            failed = report.failed,
            errored = report.errored,
            cancelled = report.cancelled,
            lo = self.interval.lo,
            hi = self.interval.hi,
            "end of iteration"
        );
        if let Some(best) = self.tracker.best() {
            info!(
                parent: span,
                "\n{}",
                format_results(&best.results, Some("Best so far"), Some(&PROGRESS_KEYS[..]))
            );
        }
    }

    /// Iterates until a termination condition holds.
    pub async fn run<T: TrialFactory>(
        &mut self,
        factory: &T,
        pool: &WorkerPool,
        span: &Span,
    ) -> Termination {
        loop {
            match self.run_iteration(factory, pool, span).await {
                Ok(IterationReport {
                    termination: Some(termination),
                    ..
                }) => return termination,
                Ok(_) => {}
                Err(err) => return Termination::Failed(err),
            }
        }
    }
}
