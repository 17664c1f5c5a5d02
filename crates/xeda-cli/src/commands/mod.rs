pub mod flows;
pub mod fmax;
pub mod run;

use std::path::PathBuf;

use clap::Args;
use xeda_core::XedaError;
use xeda_flow::{FlowRunner, RunnerOptions, SettingsRequest};

use crate::project::load_project;

/// Options shared by every command that resolves project settings.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project file (TOML, JSON or YAML).
    #[arg(long, default_value = "xeda.toml")]
    pub project: PathBuf,
    /// Design to select when the project declares several.
    #[arg(long)]
    pub design: Option<String>,
    /// Global override `key.sub=value`; may be repeated or comma-separated.
    #[arg(long = "override", value_name = "S")]
    pub overrides: Vec<String>,
    /// Override applied under `flows.<FLOW>`.
    #[arg(long = "flow-override", value_name = "S")]
    pub flow_overrides: Vec<String>,
    /// Root directory for run directories and artefacts.
    #[arg(long, default_value = "xeda_run")]
    pub runs_dir: PathBuf,
    /// Upper bound on the threads granted to a single flow.
    #[arg(long, default_value_t = 4)]
    pub max_threads: usize,
}

impl ProjectArgs {
    /// Loads the project file and builds a runner for `flow`.
    pub fn runner(&self, flow: &str) -> Result<FlowRunner, XedaError> {
        let project = load_project(&self.project)?;
        let request = SettingsRequest {
            design: self.design.clone(),
            overrides: self.overrides.clone(),
            flow: Some(flow.to_string()),
            flow_overrides: self.flow_overrides.clone(),
        };
        let settings = FlowRunner::resolve_settings(&project, &request)?;
        let options = RunnerOptions {
            runs_root: self.runs_dir.clone(),
            max_threads: self.max_threads.max(1),
            parallel_runs: false,
        };
        Ok(FlowRunner::new(settings, options))
    }
}
