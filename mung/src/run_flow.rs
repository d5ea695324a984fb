use crate::common::*;

use candle_core::Tensor;
use candle_renyi::{FlowConfig, FlowTrace, LinearDecay, ParticleFlow};
use matrix_util::traits::SampleOps;
use std::io::Write;

#[derive(Args, Debug)]
pub struct FlowArgs {
    #[arg(short = 'r', long, required = true, help = "Target point set (.tsv, .csv, optionally .gz)")]
    real: Box<str>,

    #[arg(
        short = 'i',
        long,
        help = "Initial particles",
        long_help = "Initial particles, same number of columns as the target. \n\
		     Without this, particles are drawn from N(0, I) \n\
		     with the target's shape (or --num-particles rows)."
    )]
    init: Option<Box<str>>,

    #[arg(long, help = "Number of particles when drawing them")]
    num_particles: Option<usize>,

    #[arg(
        short = 'o',
        long,
        required = true,
        help = "Output file for the moved particles",
        long_help = "Output file for the moved particles. \n\
		     The loss trace goes to `{output}.trace.json`."
    )]
    output: Box<str>,

    #[command(flatten)]
    kernel: KernelArgs,

    #[command(flatten)]
    divergence: DivergenceArgs,

    #[command(flatten)]
    compute: ComputeArgs,

    #[arg(long, default_value_t = 500, help = "Number of steps")]
    iters: usize,

    #[arg(long, default_value_t = 1e-2, help = "AdamW learning rate")]
    lr: f64,

    #[arg(long, default_value_t = 200, help = "Rows drawn from each point set per step")]
    batch_size: usize,

    #[arg(long, default_value_t = 50, help = "Log every this many steps (with --verbose)")]
    print_every: usize,

    #[arg(
        long,
        help = "Alpha at the start of the decay window",
        long_help = "Alpha before --alpha-decay-start; it moves linearly \n\
		     to --alpha until --alpha-decay-end."
    )]
    alpha_initial: Option<f64>,

    #[arg(long, help = "First step of the alpha decay")]
    alpha_decay_start: Option<usize>,

    #[arg(long, help = "Last step of the alpha decay")]
    alpha_decay_end: Option<usize>,

    #[arg(
        long,
        help = "Gaussian bandwidth at the start of the decay window",
        long_help = "Bandwidth before --sigma-decay-start; it moves linearly \n\
		     to the first --kernel-sigma until --sigma-decay-end. \n\
		     Other bandwidths of a multi-scale kernel keep their ratios."
    )]
    kernel_initial_sigma: Option<f64>,

    #[arg(long, help = "First step of the bandwidth decay")]
    sigma_decay_start: Option<usize>,

    #[arg(long, help = "Last step of the bandwidth decay")]
    sigma_decay_end: Option<usize>,

    #[arg(
        long,
        default_value_t = false,
        help = "Also learn mixture weights of the particles",
        long_help = "Also learn softmax mixture weights of the particles. \n\
		     Every step then uses all particles, and the weights \n\
		     go to `{output}.weights.tsv`."
    )]
    learn_weights: bool,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    seed: u64,

    #[arg(short, long, default_value_t = false, help = "Log the divergence while training")]
    verbose: bool,
}

impl FlowArgs {
    fn to_config(&self) -> FlowConfig {
        let divergence = self.divergence.to_config();

        let alpha_schedule = match (self.alpha_decay_start, self.alpha_decay_end) {
            (Some(start), Some(end)) => Some(LinearDecay::from_window(
                Some(start),
                Some(end),
                self.alpha_initial.unwrap_or(divergence.alpha),
                divergence.alpha,
            )),
            _ => None,
        };

        let sigma = match (self.kernel_initial_sigma, self.kernel_sigma()) {
            (Some(initial), Some(last)) => Some(LinearDecay::from_window(
                self.sigma_decay_start,
                self.sigma_decay_end,
                initial,
                last,
            )),
            _ => None,
        };

        FlowConfig {
            learning_rate: self.lr,
            num_iters: self.iters,
            batch_size: self.batch_size,
            print_every: self.print_every,
            alpha_schedule,
            sigma,
            kernel: self.kernel.to_config(),
            divergence,
            learn_weights: self.learn_weights,
            seed: self.seed,
            verbose: self.verbose,
            show_progress: true,
        }
    }

    /// first bandwidth of a Gaussian kernel
    fn kernel_sigma(&self) -> Option<f64> {
        match self.kernel.kernel {
            KernelKind::Gaussian => self.kernel.kernel_sigma.first().copied(),
            _ => None,
        }
    }
}

fn write_trace(trace: &FlowTrace, file: &str) -> anyhow::Result<()> {
    let mut buf = io::open_buf_writer(file)?;
    serde_json::to_writer_pretty(&mut buf, trace)?;
    buf.flush()?;
    info!("wrote {}", file);
    Ok(())
}

/// Move particles towards the target point set and write them out
pub fn run_flow(args: &FlowArgs) -> anyhow::Result<()> {
    let dev = args.compute.setup()?;
    let dtype = args.compute.dtype();

    let target = read_points(&args.real, &dev, dtype)?;
    let (m, d) = target.dims2()?;

    let init = match &args.init {
        Some(file) => read_points(file, &dev, dtype)?,
        None => {
            let n = args.num_particles.unwrap_or(m);
            info!("drawing {} particles from N(0, I)", n);
            Tensor::rnorm_seeded(n, d, 0.0, args.seed)?
                .to_dtype(dtype)?
                .to_device(&dev)?
        }
    };

    let config = args.to_config();
    if config.sigma.is_none() && args.kernel_initial_sigma.is_some() {
        log::warn!("--kernel-initial-sigma only applies to the gaussian kernel");
    }

    let mut flow = ParticleFlow::new(&init, config)?;
    let trace = flow.train(&target)?;

    write_points(flow.particles(), &args.output)?;
    if args.learn_weights {
        let weights_n1 = flow.weights()?.t()?;
        write_points(&weights_n1, &format!("{}.weights.tsv", args.output))?;
    }
    write_trace(&trace, &format!("{}.trace.json", args.output))?;
    Ok(())
}
