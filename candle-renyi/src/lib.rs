pub mod candle_aux_ops;
pub mod divergence;
pub mod estimator;
pub mod flow;
pub mod kernel;
pub mod schedule;

pub use candle_aux_ops::{log_sum_exp, uniform_weights};
pub use divergence::{
    renyi_mixture_divergence, renyi_mixture_divergence_stable, renyi_sim_divergence,
    renyi_sim_entropy, MixtureOptions,
};
pub use estimator::{combine_unbiased, DivergenceConfig, Estimator, RenyiDivergence, Unbiased};
pub use flow::{FlowConfig, FlowTrace, ParticleFlow};
pub use kernel::{
    generic_kernel, CosineKernel, FnKernel, GaussianKernel, Kernel, KernelConfig,
    PolynomialKernel,
};
pub use schedule::LinearDecay;

pub use candle_core;
pub use candle_nn;
