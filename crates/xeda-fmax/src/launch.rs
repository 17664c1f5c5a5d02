//! Interrupt-aware driver: search, shut the pool down, persist the best.

use std::future::Future;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{info, info_span, warn};
use xeda_core::errors::XedaError;
use xeda_core::hash::stable_hash_string;
use xeda_core::provenance::RunProvenance;
use xeda_flow::{format_results, FlowKind, FlowRunner, ToolFlow};
use xeda_pool::WorkerPool;

use crate::best::{FmaxArtifact, RunSummary};
use crate::candidates::Trial;
use crate::search::{FmaxSearch, Termination, TrialFactory};

/// Builds trial flows through a [`FlowRunner`], one run directory per trial.
#[derive(Debug, Clone)]
pub struct RunnerTrialFactory {
    runner: FlowRunner,
    kind: FlowKind,
}

impl RunnerTrialFactory {
    /// Factory for `flow`; switches the runner to hash-suffixed run dirs.
    pub fn new(mut runner: FlowRunner, flow: &str) -> Result<Self, XedaError> {
        let kind = FlowKind::from_name(flow)?;
        runner.set_parallel_runs(true);
        Ok(Self { runner, kind })
    }

    /// Runner the trials are instantiated through.
    pub fn runner(&self) -> &FlowRunner {
        &self.runner
    }
}

impl TrialFactory for RunnerTrialFactory {
    type Flow = ToolFlow;

    fn build(&self, trial: &Trial) -> Result<ToolFlow, XedaError> {
        let mut settings = self.runner.settings().clone();
        settings
            .flow_section_mut(self.kind.name())
            .insert("clock_period".into(), Value::from(trial.clock_period));
        self.runner.instantiate_with(self.kind, &settings)
    }
}

/// Where and under which names the artefact is written.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactTarget {
    /// Directory receiving the artefact.
    pub dir: PathBuf,
    /// Design name.
    pub design: String,
    /// Flow name.
    pub flow: String,
    /// Run timestamp.
    pub timestamp: String,
}

/// Result of a whole search run.
#[derive(Debug, Clone, PartialEq)]
pub struct FmaxOutcome {
    /// Why the search stopped.
    pub termination: Termination,
    /// Completed iterations.
    pub iterations: u32,
    /// Artefact of the best trial, when one passed.
    pub artifact: Option<FmaxArtifact>,
    /// Where the artefact was written.
    pub artifact_path: Option<PathBuf>,
}

/// Runs the search until it terminates or `interrupt` resolves.
///
/// Whatever ends the search, the pool is shut down (cancelling every
/// outstanding trial) before the best result is finalized and written.
pub async fn launch<T, I>(
    mut search: FmaxSearch,
    factory: &T,
    pool: WorkerPool,
    interrupt: I,
    target: ArtifactTarget,
) -> Result<FmaxOutcome, XedaError>
where
    T: TrialFactory,
    I: Future<Output = ()>,
{
    let span = info_span!("fmax", design = %target.design, flow = %target.flow);
    info!(
        parent: &span,
        lo = search.interval().lo,
        hi = search.interval().hi,
        resolution = search.config().resolution,
        max_workers = pool.max_workers(),
        timeout_secs = search.config().timeout_secs,
        seed = search.seed(),
        "starting fmax search"
    );

    let termination = tokio::select! {
        termination = search.run(factory, &pool, &span) => termination,
        _ = interrupt => {
            warn!(parent: &span, "interrupted, cancelling outstanding trials");
            Termination::Interrupted
        }
    };
    drop(pool);
    info!(parent: &span, %termination, iterations = search.iterations(), "fmax search finished");

    let settings_hash = match search.tracker().best() {
        Some(best) => stable_hash_string(&best.settings)?,
        None => String::new(),
    };
    let artifact = search.tracker().finalize(RunSummary {
        design: target.design.clone(),
        flow: target.flow.clone(),
        timestamp: target.timestamp.clone(),
        iterations: search.iterations(),
        runtime_minutes: search.elapsed_minutes(),
        provenance: RunProvenance::now(settings_hash, search.seed()),
    });

    let artifact_path = match &artifact {
        Some(artifact) => {
            let path = artifact.write(&target.dir)?;
            info!(
                parent: &span,
                "\n{}",
                format_results(&artifact.results, Some("Best results"), None)
            );
            info!(
                parent: &span,
                frequency = artifact.frequency,
                path = %path.display(),
                "best result written"
            );
            Some(path)
        }
        None => {
            warn!(parent: &span, "No successful results");
            None
        }
    };

    Ok(FmaxOutcome {
        termination,
        iterations: search.iterations(),
        artifact,
        artifact_path,
    })
}
