use std::error::Error;

use clap::Args;
use tracing::warn;
use xeda_flow::format_results;

use super::ProjectArgs;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Flow to run.
    pub flow: String,
    #[command(flatten)]
    pub project: ProjectArgs,
}

pub async fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let runner = args.project.runner(&args.flow)?;
    let results = runner.launch(&args.flow).await?;
    println!("{}", format_results(&results, Some(&args.flow), None));
    if !results.success() {
        warn!(flow = %args.flow, "flow failed");
        return Err(format!("flow {} did not succeed", args.flow).into());
    }
    Ok(())
}
