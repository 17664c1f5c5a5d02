use std::collections::BTreeSet;

use proptest::prelude::*;
use xeda_core::rng::RngHandle;
use xeda_fmax::{
    canonical_frequency, canonical_period, generate, period_key, CandidateBatch, FmaxConfig,
    FmaxSearch, SearchInterval, Termination, TriedSet,
};

fn config(lo: f64, hi: f64) -> FmaxConfig {
    FmaxConfig {
        low_freq: lo,
        high_freq: hi,
        ..FmaxConfig::default()
    }
}

#[test]
fn canonical_period_rounds_to_picoseconds() {
    assert_eq!(canonical_period(250.0), 4.0);
    assert_eq!(canonical_period(600.0), 1.667);
    assert_eq!(canonical_period(3.0), 333.333);
    assert_eq!(period_key(600.0), 1667);
    assert_eq!(period_key(canonical_frequency(600.0)), 1667);
}

#[test]
fn frequencies_sharing_a_period_are_the_same_trial() {
    assert_eq!(period_key(599.9), period_key(600.0));
    let batch = CandidateBatch::from_frequencies(&[599.9, 600.0], 0.1);
    assert_eq!(batch.trials[0].clock_period, batch.trials[1].clock_period);
}

#[test]
fn first_iteration_over_default_window_yields_four_distinct_candidates() {
    let mut search =
        FmaxSearch::new(config(1.0, 600.0), 4, RngHandle::from_seed(11)).expect("search");
    let batch = search.next_candidates().expect("open window");

    assert_eq!(batch.len(), 4);
    let keys: BTreeSet<i64> = batch.trials.iter().map(|t| period_key(t.frequency)).collect();
    assert_eq!(keys.len(), 4);
    for (index, trial) in batch.trials.iter().enumerate() {
        assert_eq!(trial.index, index);
        assert!((1.0..=600.0).contains(&trial.frequency));
        assert_eq!(trial.clock_period, canonical_period(trial.frequency));
    }
    assert_eq!(search.tried().len(), 4);
}

#[test]
fn repeated_generation_widens_instead_of_repeating() {
    let mut search =
        FmaxSearch::new(config(100.0, 200.0), 4, RngHandle::from_seed(3)).expect("search");
    let first = search.next_candidates().expect("batch");
    let before = search.interval();
    let second = search.next_candidates().expect("batch");
    let after = search.interval();

    assert!(after.hi > before.hi);
    for trial in &second.trials {
        assert!(first
            .trials
            .iter()
            .all(|earlier| period_key(earlier.frequency) != period_key(trial.frequency)));
    }
}

#[test]
fn closed_window_yields_no_batch() {
    let mut search =
        FmaxSearch::new(config(100.0, 100.05), 4, RngHandle::from_seed(1)).expect("search");
    assert_eq!(search.next_candidates().unwrap_err(), Termination::WindowClosed);
    assert!(search.tried().is_empty());
}

#[test]
fn colliding_periods_exhaust_generation() {
    // Every frequency near 59 GHz rounds to a 0.017 ns period.
    let mut interval = SearchInterval {
        lo: 59_000.0,
        hi: 59_000.0,
    };
    let mut rng = RngHandle::from_seed(4);
    let batch = generate(&mut interval, &TriedSet::default(), 4, &FmaxConfig::default(), &mut rng);
    assert!(batch.is_none());
    assert!(interval.hi > 59_000.0);
    assert!(interval.hi < 59_500.0);
}

proptest! {
    #[test]
    fn canonicalisation_is_idempotent(frequency in 0.5f64..5000.0) {
        let once = canonical_frequency(frequency);
        prop_assert_eq!(canonical_frequency(once), once);
        prop_assert_eq!(canonical_period(once), canonical_period(frequency));
        prop_assert_eq!(period_key(once), period_key(frequency));
    }

    #[test]
    fn no_period_is_submitted_twice(
        lo in 1.0f64..400.0,
        width in 20.0f64..500.0,
        workers in 2usize..8,
        seed in any::<u64>(),
    ) {
        let mut search =
            FmaxSearch::new(config(lo, lo + width), workers, RngHandle::from_seed(seed))
                .expect("search");
        let mut submitted = BTreeSet::new();
        for _ in 0..4 {
            let batch = search.next_candidates().expect("batch");
            prop_assert!(!batch.is_empty());
            prop_assert!(batch.len() <= workers);
            for trial in &batch.trials {
                prop_assert!(submitted.insert(period_key(trial.frequency)));
            }
        }
        prop_assert_eq!(search.tried().len(), submitted.len());
    }
}
