use crate::candle_aux_ops::uniform_weights;
use crate::estimator::{DivergenceConfig, Unbiased};
use crate::kernel::{Kernel, KernelConfig};
use crate::schedule::LinearDecay;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::ops::softmax;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Particle flow settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowConfig {
    pub learning_rate: f64,
    pub num_iters: usize,
    /// rows drawn from each point set per step
    pub batch_size: usize,
    pub print_every: usize,
    /// Rényi order over steps; `None` trains at `divergence.alpha`
    pub alpha_schedule: Option<LinearDecay>,
    /// Gaussian bandwidth over steps; `None` keeps the configured kernel
    pub sigma: Option<LinearDecay>,
    pub kernel: KernelConfig,
    pub divergence: DivergenceConfig,
    /// also learn softmax mixture weights of the particles; every
    /// step then uses all particles
    pub learn_weights: bool,
    pub seed: u64,
    pub verbose: bool,
    pub show_progress: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-2,
            num_iters: 500,
            batch_size: 200,
            print_every: 50,
            alpha_schedule: None,
            sigma: None,
            kernel: KernelConfig::default(),
            divergence: DivergenceConfig::default(),
            learn_weights: false,
            seed: 42,
            verbose: false,
            show_progress: true,
        }
    }
}

impl FlowConfig {
    /// Rényi order at a global step
    pub fn alpha_at(&self, step: usize) -> f64 {
        match &self.alpha_schedule {
            Some(schedule) => schedule.get_y(step),
            None => self.divergence.alpha,
        }
    }
}

/// Loss per step; skipped steps had a non-finite loss and no update
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FlowTrace {
    pub losses: Vec<f32>,
    pub skipped: usize,
}

/// Moves a free point set towards a target point set by gradient
/// descent on the configured kernel Rényi divergence
pub struct ParticleFlow {
    particles: Var,
    /// mixture weight logits (1 x n) when weights are learned
    logits: Option<Var>,
    config: FlowConfig,
}

impl ParticleFlow {
    /// * `init_nd` - starting particles (n x d), also fixes device and dtype
    /// * `config` - flow settings
    pub fn new(init_nd: &Tensor, config: FlowConfig) -> anyhow::Result<Self> {
        let particles = Var::from_tensor(&init_nd.contiguous()?)?;
        let logits = if config.learn_weights {
            if config.divergence.unbiased != Unbiased::None {
                anyhow::bail!("learned weights need the plain divergence, not a split batch");
            }
            let n = particles.dim(0)?;
            Some(Var::zeros((1, n), particles.dtype(), particles.device())?)
        } else {
            None
        };
        Ok(Self {
            particles,
            logits,
            config,
        })
    }

    pub fn particles(&self) -> &Tensor {
        self.particles.as_tensor()
    }

    pub fn device(&self) -> &Device {
        self.particles.device()
    }

    pub fn dtype(&self) -> DType {
        self.particles.dtype()
    }

    /// Mixture weights of the particles (1 x n); uniform unless learned
    pub fn weights(&self) -> candle_core::Result<Tensor> {
        match &self.logits {
            Some(logits) => softmax(logits.as_tensor(), 1),
            None => uniform_weights(self.particles.dim(0)?, self.dtype(), self.device()),
        }
    }

    /// Kernel for this step when the bandwidth follows a schedule
    fn scheduled_kernel(&self, step: usize) -> candle_core::Result<Option<Box<dyn Kernel>>> {
        match &self.config.sigma {
            Some(sigma) => Ok(Some(
                self.config.kernel.with_sigma(sigma.get_y(step)).build()?,
            )),
            None => Ok(None),
        }
    }

    /// Rows for one step; an even count when the loss splits batches
    fn rows_per_step(&self, n: usize) -> usize {
        let rows = self.config.batch_size.min(n);
        match self.config.divergence.unbiased {
            Unbiased::None => rows,
            _ => rows - rows % 2,
        }
    }

    fn minibatch(x_nd: &Tensor, rows: usize, rng: &mut StdRng) -> candle_core::Result<Tensor> {
        let n = x_nd.dim(0)?;
        if rows >= n {
            return Ok(x_nd.clone());
        }
        let idx: Vec<u32> = sample(rng, n, rows).into_iter().map(|i| i as u32).collect();
        let idx = Tensor::from_vec(idx, rows, x_nd.device())?;
        x_nd.index_select(&idx, 0)
    }

    /// Run the flow against `target_nd`
    ///
    /// * `target_nd` - real samples (m x d) on any device; moved to the
    ///   particles' device and dtype
    pub fn train(&mut self, target_nd: &Tensor) -> anyhow::Result<FlowTrace> {
        let target = target_nd
            .to_device(self.device())?
            .to_dtype(self.dtype())?;

        let (n, d) = self.particles.dims2()?;
        let (m, dt) = target.dims2()?;
        if d != dt {
            anyhow::bail!("particles have {} features, target has {}", d, dt);
        }

        let strategy = self.config.divergence.resolve();
        let rows_gen = self.rows_per_step(n);
        let rows_real = self.rows_per_step(m);
        if strategy.unbiased() != Unbiased::None && rows_gen.min(rows_real) < 2 {
            anyhow::bail!("unbiased losses need at least two rows per batch");
        }

        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut vars = vec![self.particles.clone()];
        if let Some(logits) = &self.logits {
            vars.push(logits.clone());
        }
        let mut adam = AdamW::new(vars, params)?;
        let fixed_kernel = self.config.kernel.build()?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let pb = ProgressBar::new(self.config.num_iters as u64);
        if !self.config.show_progress || self.config.verbose {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        info!(
            "particle flow: {} particles, {} targets, {} features, {} steps",
            n, m, d, self.config.num_iters
        );

        let mut trace = FlowTrace::default();

        for step in 0..self.config.num_iters {
            let alpha = self.config.alpha_at(step);
            let scheduled = self.scheduled_kernel(step)?;
            let kernel: &dyn Kernel = match &scheduled {
                Some(k) => &**k,
                None => &*fixed_kernel,
            };

            let x_real = Self::minibatch(&target, rows_real, &mut rng)?;

            let loss = match &self.logits {
                Some(logits) => {
                    let w_gen = softmax(logits.as_tensor(), 1)?;
                    let w_real = uniform_weights(x_real.dim(0)?, x_real.dtype(), x_real.device())?;
                    let x_gen = self.particles.as_tensor();
                    strategy.divergence(&w_real, &x_real, &w_gen, x_gen, kernel, alpha)?
                }
                None => {
                    let x_gen = Self::minibatch(self.particles.as_tensor(), rows_gen, &mut rng)?;
                    strategy.loss(&x_real, &x_gen, kernel, alpha)?
                }
            };
            let loss_val = loss.to_dtype(DType::F32)?.to_scalar::<f32>()?;

            if loss_val.is_finite() {
                adam.backward_step(&loss)?;
            } else {
                trace.skipped += 1;
                warn!("[{}] non-finite loss {}, step skipped", step + 1, loss_val);
            }
            trace.losses.push(loss_val);

            pb.inc(1);
            if self.config.verbose && self.config.print_every > 0 && step % self.config.print_every == 0 {
                info!("[{}] alpha = {:.4}, divergence = {:.6}", step + 1, alpha, loss_val);
            }
        }
        pb.finish_and_clear();

        if trace.skipped > 0 {
            warn!("{} of {} steps skipped", trace.skipped, self.config.num_iters);
        }
        if let Some(last) = trace.losses.last() {
            info!("final divergence: {:.6}", last);
        }
        Ok(trace)
    }
}
