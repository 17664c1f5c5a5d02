//! Canonical clock periods and per-iteration candidate generation.
//!
//! A frequency's identity is its clock period in nanoseconds rounded to three
//! decimals (whole picoseconds). Two frequencies with the same rounded period
//! are the same trial.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use xeda_core::rng::RngHandle;

use crate::config::FmaxConfig;

const NS_MHZ: f64 = 1000.0;
const PERIOD_SCALE: f64 = 1000.0;
const FREQUENCY_SCALE: f64 = 1_000_000.0;
const MAX_WIDENINGS: usize = 10_000;

/// Clock period (ns) of `frequency` (MHz), rounded half away from zero to
/// three decimals.
pub fn canonical_period(frequency: f64) -> f64 {
    (NS_MHZ / frequency * PERIOD_SCALE).round() / PERIOD_SCALE
}

/// Frequency whose period is exactly the canonical period of `frequency`.
pub fn canonical_frequency(frequency: f64) -> f64 {
    NS_MHZ / canonical_period(frequency)
}

/// Identity of a trial: its canonical period in whole picoseconds.
pub fn period_key(frequency: f64) -> i64 {
    (NS_MHZ / frequency * PERIOD_SCALE).round() as i64
}

fn frequency_key(frequency: f64) -> i64 {
    (frequency * FREQUENCY_SCALE).round() as i64
}

/// `count` evenly spaced points over `[lo, hi]` and their spacing.
pub fn linspace(lo: f64, hi: f64, count: usize) -> (Vec<f64>, f64) {
    match count {
        0 => (Vec::new(), hi - lo),
        1 => (vec![lo], hi - lo),
        _ => {
            let step = (hi - lo) / (count - 1) as f64;
            let points = (0..count)
                .map(|i| if i + 1 == count { hi } else { lo + step * i as f64 })
                .collect();
            (points, step)
        }
    }
}

/// One candidate frequency of an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Position within the iteration's batch.
    pub index: usize,
    /// Canonical frequency (MHz).
    pub frequency: f64,
    /// Canonical clock period (ns) injected into the trial's settings.
    pub clock_period: f64,
}

impl Trial {
    /// Canonicalises `frequency` into a trial at `index`.
    pub fn new(index: usize, frequency: f64) -> Self {
        Self {
            index,
            frequency: canonical_frequency(frequency),
            clock_period: canonical_period(frequency),
        }
    }
}

/// Candidates of one iteration, ascending in frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateBatch {
    /// Distinct, never tried candidates.
    pub trials: Vec<Trial>,
    /// Spacing of the evenly spaced points the trials came from (MHz).
    pub step: f64,
}

impl CandidateBatch {
    /// Builds a batch from raw frequencies, canonicalising each one.
    pub fn from_frequencies(frequencies: &[f64], step: f64) -> Self {
        let trials = frequencies
            .iter()
            .enumerate()
            .map(|(index, &frequency)| Trial::new(index, frequency))
            .collect();
        Self { trials, step }
    }

    /// Candidate frequencies in batch order.
    pub fn frequencies(&self) -> Vec<f64> {
        self.trials.iter().map(|trial| trial.frequency).collect()
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    /// True when the batch holds no candidates.
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}

/// Every frequency and period submitted during a search run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriedSet {
    frequencies: BTreeSet<i64>,
    periods: BTreeSet<i64>,
}

impl TriedSet {
    /// Whether `frequency` (or another frequency with its period) was tried.
    pub fn contains(&self, frequency: f64) -> bool {
        self.periods.contains(&period_key(frequency))
            || self.frequencies.contains(&frequency_key(frequency))
    }

    /// Marks every trial of `batch` as tried.
    pub fn record(&mut self, batch: &CandidateBatch) {
        for trial in &batch.trials {
            self.frequencies.insert(frequency_key(trial.frequency));
            self.periods.insert(period_key(trial.frequency));
        }
    }

    /// Number of distinct periods tried.
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    /// True before the first batch is recorded.
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

/// Mutable search window in MHz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchInterval {
    /// Lower bound.
    pub lo: f64,
    /// Upper bound.
    pub hi: f64,
}

/// Generates the next batch of distinct, untried candidates.
///
/// Too many collisions with earlier trials widen `interval` by a small
/// random amount and try again, so the window may move. Returns `None` when
/// widening never yields enough untried candidates.
pub fn generate(
    interval: &mut SearchInterval,
    tried: &TriedSet,
    max_workers: usize,
    config: &FmaxConfig,
    rng: &mut RngHandle,
) -> Option<CandidateBatch> {
    let max_workers = max_workers.max(1);
    let shortfall_allowed = f64::max(2.0, max_workers as f64 / 4.0);
    let delta = config.delta();

    for _ in 0..MAX_WIDENINGS {
        let (points, step) = linspace(interval.lo, interval.hi, max_workers);
        let mut seen = BTreeSet::new();
        let frequencies: Vec<f64> = points
            .into_iter()
            .filter(|&frequency| frequency > 0.0)
            .map(canonical_frequency)
            .filter(|&frequency| frequency.is_finite() && !tried.contains(frequency))
            .filter(|&frequency| seen.insert(period_key(frequency)))
            .collect();

        let shortfall = (max_workers - frequencies.len()) as f64;
        if !frequencies.is_empty() && shortfall <= shortfall_allowed {
            return Some(CandidateBatch::from_frequencies(&frequencies, step));
        }
        interval.hi += rng.unit() * delta;
        interval.lo += config.tuning.low_jitter_scale * rng.unit() * delta;
    }

    None
}
