#![deny(missing_docs)]
#![doc = "Adaptive maximum-frequency search over parallel flow trials."]

pub mod best;
pub mod candidates;
pub mod config;
pub mod launch;
pub mod search;

pub use best::{Best, BestTracker, FmaxArtifact, RunSummary};
pub use candidates::{
    canonical_frequency, canonical_period, generate, period_key, CandidateBatch, SearchInterval,
    Trial, TriedSet,
};
pub use config::{FmaxConfig, SearchTuning};
pub use launch::{launch, ArtifactTarget, FmaxOutcome, RunnerTrialFactory};
pub use search::{FmaxSearch, IterationReport, Termination, TrialFactory};
