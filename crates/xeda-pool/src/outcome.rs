//! Tagged per-task outcomes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use xeda_core::settings::FlowSettings;
use xeda_core::XedaError;
use xeda_flow::FlowResults;

/// What a finished flow hands back to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed {
    /// Parsed results, including `success`.
    pub results: FlowResults,
    /// Settings the flow ran with.
    pub settings: FlowSettings,
    /// Directory the flow ran in.
    pub run_dir: PathBuf,
}

/// Details of a worker that died without producing an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashInfo {
    /// Panic payload, when it was a string.
    pub message: String,
}

/// Outcome of one task of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The flow ran and its reports were parsed. The result may still be a
    /// failing one; see [`FlowResults::success`].
    Success(Completed),
    /// The per-task timeout elapsed; the task was aborted.
    Timeout,
    /// The worker panicked.
    WorkerCrashed(CrashInfo),
    /// The flow returned an error.
    TaskError(XedaError),
    /// Aborted before completion by batch cancellation or pool shutdown.
    Cancelled,
}

impl TaskOutcome {
    /// True for outcomes of tasks that were stopped rather than finished.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Timeout | TaskOutcome::Cancelled)
    }

    /// Completed payload, if the flow finished.
    pub fn completed(&self) -> Option<&Completed> {
        match self {
            TaskOutcome::Success(completed) => Some(completed),
            _ => None,
        }
    }

    /// Whether the flow finished and reported a passing result.
    pub fn passed(&self) -> bool {
        self.completed()
            .is_some_and(|completed| completed.results.success())
    }
}
