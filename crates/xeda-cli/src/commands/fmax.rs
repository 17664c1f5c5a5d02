use std::error::Error;
use std::thread;

use clap::Args;
use tracing::{info, warn};
use xeda_core::{run_timestamp, RngHandle};
use xeda_flow::{format_results, FlowKind};
use xeda_fmax::{launch, ArtifactTarget, FmaxConfig, FmaxSearch, RunnerTrialFactory, Termination};
use xeda_pool::{max_workers_for, WorkerPool};

use super::ProjectArgs;

#[derive(Args, Debug)]
pub struct FmaxArgs {
    /// Flow whose timing decides pass or fail.
    pub flow: String,
    #[command(flatten)]
    pub project: ProjectArgs,
    /// CPUs shared by concurrent trials (default: available parallelism).
    #[arg(long)]
    pub max_cpus: Option<usize>,
    /// Seed for the search jitter.
    #[arg(long)]
    pub seed: Option<u64>,
}

const PRINTED_KEYS: [&str; 5] = ["clock_period", "clock_frequency", "lut", "ff", "slice"];

pub async fn run(args: &FmaxArgs) -> Result<(), Box<dyn Error>> {
    let kind = FlowKind::from_name(&args.flow)?;
    let runner = args.project.runner(kind.name())?;
    let config = FmaxConfig::from_flow_section(runner.settings().flow_section(kind.name()))?;

    let total_cpus = args.max_cpus.unwrap_or_else(|| {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let threads_per_flow = config.nthreads.min(runner.options().max_threads).max(1);
    let max_workers = max_workers_for(total_cpus, threads_per_flow);
    info!(total_cpus, threads_per_flow, max_workers, "sizing worker pool");

    let rng = match args.seed {
        Some(seed) => RngHandle::from_seed(seed),
        None => RngHandle::from_entropy(),
    };
    let target = ArtifactTarget {
        dir: runner.options().runs_root.clone(),
        design: runner
            .settings()
            .design_name()
            .unwrap_or("design")
            .to_string(),
        flow: kind.name().to_string(),
        timestamp: run_timestamp(),
    };
    let search = FmaxSearch::new(config, max_workers, rng)?;
    let factory = RunnerTrialFactory::new(runner, kind.name())?;
    let pool = WorkerPool::new(max_workers);
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler available; never interrupt.
            std::future::pending::<()>().await;
        }
    };

    let outcome = launch(search, &factory, pool, interrupt, target).await?;
    match &outcome.artifact {
        Some(artifact) => {
            println!(
                "{}",
                format_results(&artifact.results, Some("Best results"), Some(&PRINTED_KEYS[..]))
            );
            println!(
                "Fmax: {:.3} MHz (clock period {:.3} ns)",
                artifact.frequency, artifact.clock_period
            );
            if let Some(path) = &outcome.artifact_path {
                println!("Best result written to {}", path.display());
            }
        }
        None => {
            warn!(flow = %args.flow, "no trial passed");
            println!("No successful results");
        }
    }
    match outcome.termination {
        Termination::Failed(err) => Err(Box::new(err)),
        _ => Ok(()),
    }
}
