mod common;
mod run_divergence;
mod run_flow;
mod run_simulate;

use crate::common::*;
use run_divergence::*;
use run_flow::*;
use run_simulate::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about, term_width = 80)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Kernel Rényi divergence between two point sets
    Divergence(DivergenceCmdArgs),
    /// Move particles towards a target by gradient descent on the divergence
    Flow(FlowArgs),
    /// Write a Gaussian point cloud
    Simulate(SimulateArgs),
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.commands {
        Commands::Divergence(args) => {
            run_divergence(args)?;
        }
        Commands::Flow(args) => {
            run_flow(args)?;
        }
        Commands::Simulate(args) => {
            run_simulate(args)?;
        }
    }

    info!("Done");
    Ok(())
}
