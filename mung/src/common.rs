pub use matrix_util::common_io as io;

pub use clap::{Args, Parser, Subcommand, ValueEnum};
pub use log::info;

use candle_core::{DType, Device, Tensor};
use candle_renyi::{DivergenceConfig, Estimator, KernelConfig, Unbiased};
use matrix_util::traits::IoOps;
use rayon::ThreadPoolBuilder;

/// Compute device for tensor work
#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

impl ComputeDevice {
    pub fn to_device(&self, device_no: usize) -> anyhow::Result<Device> {
        Ok(match self {
            ComputeDevice::Metal => Device::new_metal(device_no)?,
            ComputeDevice::Cuda => Device::new_cuda(device_no)?,
            ComputeDevice::Cpu => Device::Cpu,
        })
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum KernelKind {
    Gaussian,
    Poly,
    Cosine,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum EstimatorKind {
    Naive,
    Stable,
}

impl From<EstimatorKind> for Estimator {
    fn from(kind: EstimatorKind) -> Self {
        match kind {
            EstimatorKind::Naive => Estimator::Naive,
            EstimatorKind::Stable => Estimator::Stable,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum UnbiasedKind {
    None,
    Eq,
    Algo,
}

impl From<UnbiasedKind> for Unbiased {
    fn from(kind: UnbiasedKind) -> Self {
        match kind {
            UnbiasedKind::None => Unbiased::None,
            UnbiasedKind::Eq => Unbiased::Eq,
            UnbiasedKind::Algo => Unbiased::Algo,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct KernelArgs {
    #[arg(long, value_enum, default_value = "gaussian", help = "Kernel family")]
    pub kernel: KernelKind,

    #[arg(
        long = "kernel-sigma",
        value_delimiter = ',',
        default_values_t = vec![1.6],
        help = "Gaussian bandwidth(s)",
        long_help = "Gaussian bandwidth. Repeat the flag or give a \n\
		     comma-separated list for a multi-scale kernel, \n\
		     the average of one Gaussian per bandwidth. \n\
		     Example: --kernel-sigma 0.5,1,2"
    )]
    pub kernel_sigma: Vec<f64>,

    #[arg(long, default_value_t = 2.0, help = "Polynomial degree")]
    pub kernel_degree: f64,

    #[arg(long, default_value_t = 1.0, help = "Polynomial offset c in (x.y + c)^degree")]
    pub kernel_constant: f64,

    #[arg(long, default_value_t = 1e-6, help = "Floor of the cosine kernel")]
    pub min_cosine: f64,
}

impl KernelArgs {
    pub fn to_config(&self) -> KernelConfig {
        match self.kernel {
            KernelKind::Gaussian => KernelConfig::Gaussian {
                sigmas: self.kernel_sigma.clone(),
            },
            KernelKind::Poly => KernelConfig::Polynomial {
                degree: self.kernel_degree,
                constant: self.kernel_constant,
            },
            KernelKind::Cosine => KernelConfig::Cosine {
                min_cosine: self.min_cosine,
            },
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DivergenceArgs {
    #[arg(short = 'a', long, default_value_t = 0.5, help = "Rényi order alpha")]
    pub alpha: f64,

    #[arg(long, default_value_t = false, help = "Average D(p|q) and D(q|p)")]
    pub symmetric: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "One Gram matrix over the stacked point sets"
    )]
    pub use_full: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Leave-one-out self mass",
        long_help = "Drop each point's own kernel value from its self mass \n\
		     and renormalize by the remaining weight."
    )]
    pub use_avg: bool,

    #[arg(
        long,
        value_enum,
        default_value = "none",
        help = "Sample-splitting bias correction",
        long_help = "Sample-splitting bias correction. \n\
		     none: D(x,y) on the whole batches \n\
		     eq: 2 D(x,y) - D(y,y') \n\
		     algo: cross terms of all halves minus within-set terms. \n\
		     Batches are split in halves and must have even size."
    )]
    pub unbiased: UnbiasedKind,

    #[arg(long, value_enum, default_value = "stable", help = "Estimator variant")]
    pub estimator: EstimatorKind,
}

impl DivergenceArgs {
    pub fn to_config(&self) -> DivergenceConfig {
        DivergenceConfig {
            alpha: self.alpha,
            estimator: self.estimator.into(),
            symmetric: self.symmetric,
            use_full: self.use_full,
            use_avg: self.use_avg,
            unbiased: self.unbiased.into(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ComputeArgs {
    #[arg(long, value_enum, default_value = "cpu", help = "Compute device")]
    pub device: ComputeDevice,

    #[arg(long, default_value_t = 0, help = "Device number for cuda or metal")]
    pub device_no: usize,

    #[arg(long, default_value_t = false, help = "Compute in double precision")]
    pub double: bool,

    #[arg(long, help = "Maximum number of threads (default: all CPUs)")]
    pub threads: Option<usize>,
}

impl ComputeArgs {
    pub fn dtype(&self) -> DType {
        if self.double {
            DType::F64
        } else {
            DType::F32
        }
    }

    /// Size the global thread pool and open the device
    pub fn setup(&self) -> anyhow::Result<Device> {
        let max_threads = match self.threads {
            Some(t) => t.clamp(1, num_cpus::get()),
            None => num_cpus::get(),
        };

        ThreadPoolBuilder::new()
            .num_threads(max_threads)
            .build_global()?;

        info!("will use {} threads", rayon::current_num_threads());

        self.device.to_device(self.device_no)
    }
}

/// Read a point set (one sample per row) from `.tsv`, `.csv` or
/// their `.gz` versions
pub fn read_points(file: &str, dev: &Device, dtype: DType) -> anyhow::Result<Tensor> {
    let x = Tensor::read_file_delim(file, io::delimiter_for(file), None)?;
    let (n, d) = x.dims2()?;
    info!("read {} points of dimension {} from {}", n, d, file);
    Ok(x.to_dtype(dtype)?.to_device(dev)?)
}

/// Write a point set, delimited by the file extension
pub fn write_points(x: &Tensor, file: &str) -> anyhow::Result<()> {
    io::mkdir(file)?;
    x.write_file_delim(file, io::delimiter_for(file))?;
    info!("wrote {}", file);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        kernel: KernelArgs,
        #[command(flatten)]
        divergence: DivergenceArgs,
    }

    #[test]
    fn defaults_map_to_library_defaults() {
        let cli = TestCli::parse_from(["mung"]);
        assert_eq!(cli.kernel.to_config(), KernelConfig::default());
        assert_eq!(cli.divergence.to_config(), DivergenceConfig::default());
    }

    #[test]
    fn flags_reach_the_configs() {
        let cli = TestCli::parse_from([
            "mung",
            "--kernel-sigma",
            "0.5,1",
            "--kernel-sigma",
            "4",
            "--alpha",
            "2",
            "--symmetric",
            "--use-avg",
            "--unbiased",
            "algo",
            "--estimator",
            "naive",
        ]);
        assert_eq!(
            cli.kernel.to_config(),
            KernelConfig::Gaussian {
                sigmas: vec![0.5, 1.0, 4.0]
            }
        );
        let cfg = cli.divergence.to_config();
        assert_eq!(cfg.alpha, 2.0);
        assert!(cfg.symmetric && cfg.use_avg && !cfg.use_full);
        assert_eq!(cfg.unbiased, Unbiased::Algo);
        assert_eq!(cfg.estimator, Estimator::Naive);

        let cli = TestCli::parse_from(["mung", "--kernel", "poly", "--kernel-degree", "3"]);
        assert_eq!(
            cli.kernel.to_config(),
            KernelConfig::Polynomial {
                degree: 3.0,
                constant: 1.0
            }
        );
    }

    #[test]
    fn points_round_trip_through_csv_gz() -> anyhow::Result<()> {
        let file = io::create_temp_dir_file("csv.gz")?;
        let file = file.to_str().ok_or_else(|| anyhow::anyhow!("temp path"))?;

        let x = Tensor::new(&[[1f64, 0.1], [-3.0, 1.0 / 3.0]], &Device::Cpu)?;
        write_points(&x, file)?;
        let y = read_points(file, &Device::Cpu, DType::F64)?;

        assert_eq!(y.dtype(), DType::F64);
        assert_eq!(x.to_vec2::<f64>()?, y.to_vec2::<f64>()?);
        Ok(())
    }
}
