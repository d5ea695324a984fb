use crate::common::*;

use candle_core::Tensor;
use matrix_util::traits::SampleOps;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[arg(short = 'n', long, default_value_t = 500, help = "Number of points")]
    n: usize,

    #[arg(short = 'd', long, default_value_t = 2, help = "Dimension")]
    d: usize,

    #[arg(long, default_value_t = 0.0, help = "Mean of every coordinate")]
    shift: f32,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    seed: u64,

    #[arg(short = 'o', long, required = true, help = "Output file (.tsv, .csv, optionally .gz)")]
    output: Box<str>,
}

/// Write a Gaussian point cloud `N(shift, I)`
pub fn run_simulate(args: &SimulateArgs) -> anyhow::Result<()> {
    if args.n == 0 || args.d == 0 {
        return Err(anyhow::anyhow!("need at least one point and one dimension"));
    }
    let x = Tensor::rnorm_seeded(args.n, args.d, args.shift, args.seed)?;
    write_points(&x, &args.output)
}
