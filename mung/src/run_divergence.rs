use crate::common::*;

use candle_core::DType;

#[derive(Args, Debug)]
pub struct DivergenceCmdArgs {
    #[arg(
        short = 'r',
        long,
        required = true,
        help = "Real point set (.tsv, .csv, optionally .gz)",
        long_help = "Real point set, one sample per row. \n\
		     Columns are separated by commas for .csv(.gz) \n\
		     and by tabs otherwise."
    )]
    real: Box<str>,

    #[arg(
        short = 'g',
        long,
        required = true,
        help = "Generated point set, same number of columns"
    )]
    generated: Box<str>,

    #[command(flatten)]
    kernel: KernelArgs,

    #[command(flatten)]
    divergence: DivergenceArgs,

    #[command(flatten)]
    compute: ComputeArgs,
}

/// Evaluate one divergence between two point-set files and print it
pub fn run_divergence(args: &DivergenceCmdArgs) -> anyhow::Result<()> {
    let dev = args.compute.setup()?;
    let dtype = args.compute.dtype();

    let x_real = read_points(&args.real, &dev, dtype)?;
    let x_gen = read_points(&args.generated, &dev, dtype)?;

    let kernel = args.kernel.to_config().build()?;
    let config = args.divergence.to_config();
    let strategy = config.resolve();

    let div = strategy.loss(&x_real, &x_gen, &kernel, config.alpha)?;
    let div = div.to_dtype(DType::F64)?.to_scalar::<f64>()?;

    info!("alpha = {}, divergence = {}", config.alpha, div);
    println!("{}", div);
    Ok(())
}
