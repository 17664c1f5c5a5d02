use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    flows::{self, FlowsArgs},
    fmax::{self, FmaxArgs},
    run::{self, RunArgs},
};

mod commands;
mod logging;
mod project;

#[derive(Parser, Debug)]
#[command(name = "xeda", version, about = "Hardware flow orchestrator")]
struct Cli {
    /// Log at debug level.
    #[arg(long, global = true, conflicts_with = "quiet")]
    debug: bool,
    /// Only log warnings and errors.
    #[arg(long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single flow, resolving its dependencies first.
    Run(RunArgs),
    /// Search for the highest clock frequency at which a flow meets timing.
    Fmax(FmaxArgs),
    /// List the supported flow kinds.
    Flows(FlowsArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init(logging::level_for(cli.debug, cli.quiet));
    match cli.command {
        Command::Run(args) => run::run(&args).await,
        Command::Fmax(args) => fmax::run(&args).await,
        Command::Flows(args) => flows::run(&args),
    }
}
