//! Best passing trial and the artefact persisted at the end of a run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xeda_core::errors::{io_error, XedaError};
use xeda_core::provenance::RunProvenance;
use xeda_core::serde::to_pretty_json_bytes;
use xeda_core::settings::FlowSettings;
use xeda_flow::FlowResults;

use crate::candidates::canonical_period;

/// Snapshot of the best passing trial. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Best {
    /// Trial frequency (MHz).
    pub frequency: f64,
    /// Results of the trial.
    pub results: FlowResults,
    /// Settings the trial ran with.
    pub settings: FlowSettings,
}

/// Keeps the highest passing frequency seen during a run.
#[derive(Debug, Clone, Default)]
pub struct BestTracker {
    best: Option<Best>,
}

impl BestTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an independent copy of the trial if it beats the current
    /// best strictly. Returns whether it did.
    pub fn record(&mut self, frequency: f64, results: &FlowResults, settings: &FlowSettings) -> bool {
        if self
            .best
            .as_ref()
            .is_some_and(|best| frequency <= best.frequency)
        {
            return false;
        }
        self.best = Some(Best {
            frequency,
            results: results.clone(),
            settings: settings.clone(),
        });
        true
    }

    /// Current best, if any trial passed.
    pub fn best(&self) -> Option<&Best> {
        self.best.as_ref()
    }

    /// Best frequency, if any trial passed.
    pub fn frequency(&self) -> Option<f64> {
        self.best.as_ref().map(|best| best.frequency)
    }

    /// Builds the persisted artefact, or `None` when no trial passed.
    pub fn finalize(&self, run: RunSummary) -> Option<FmaxArtifact> {
        let best = self.best.as_ref()?;
        Some(FmaxArtifact {
            design: run.design,
            flow: run.flow,
            timestamp: run.timestamp,
            frequency: best.frequency,
            clock_period: canonical_period(best.frequency),
            iterations: run.iterations,
            runtime_minutes: run.runtime_minutes,
            results: best.results.clone(),
            settings: best.settings.clone(),
            provenance: run.provenance,
        })
    }
}

/// Run metadata attached to the artefact.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Design name.
    pub design: String,
    /// Flow name.
    pub flow: String,
    /// Run timestamp used in the file name.
    pub timestamp: String,
    /// Completed search iterations.
    pub iterations: u32,
    /// Wall-clock runtime in whole minutes.
    pub runtime_minutes: u64,
    /// Provenance of the run.
    pub provenance: RunProvenance,
}

/// Persisted outcome of a search run that found a passing trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FmaxArtifact {
    /// Design name.
    pub design: String,
    /// Flow name.
    pub flow: String,
    /// Run timestamp.
    pub timestamp: String,
    /// Best passing frequency (MHz).
    pub frequency: f64,
    /// Canonical clock period of that frequency (ns).
    pub clock_period: f64,
    /// Completed search iterations.
    pub iterations: u32,
    /// Wall-clock runtime in whole minutes.
    pub runtime_minutes: u64,
    /// Full results of the best trial.
    pub results: FlowResults,
    /// Settings of the best trial.
    pub settings: FlowSettings,
    /// Provenance of the run.
    pub provenance: RunProvenance,
}

impl FmaxArtifact {
    /// `fmax_<design>_<flow>_<timestamp>.json`
    pub fn file_name(&self) -> String {
        format!("fmax_{}_{}_{}.json", self.design, self.flow, self.timestamp)
    }

    /// Writes the artefact into `dir`, creating it if needed.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, XedaError> {
        std::fs::create_dir_all(dir).map_err(|err| io_error("fmax.artifact_dir", err))?;
        let path = dir.join(self.file_name());
        let bytes = to_pretty_json_bytes(self)?;
        std::fs::write(&path, bytes).map_err(|err| io_error("fmax.artifact_write", err))?;
        Ok(path)
    }
}
