use crate::candle_aux_ops::{split_halves, uniform_weights};
use crate::divergence::{renyi_mixture_divergence, renyi_mixture_divergence_stable, MixtureOptions};
use crate::kernel::Kernel;

use candle_core::{Result, Tensor};
use log::debug;
use serde::{Deserialize, Serialize};

/// Which estimator evaluates each divergence term
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Estimator {
    /// kernel values in linear domain
    Naive,
    /// log kernel values, log-sum-exp everywhere
    #[default]
    Stable,
}

/// Sample-splitting correction of the plug-in bias
///
/// The real and generated batches are split into halves `x'`, `x` and
/// `y'`, `y` (first half primed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unbiased {
    /// D(x, y) on the whole batches
    #[default]
    None,
    /// 2 D(x,y) - D(y,y')
    Eq,
    /// D(x,y) + D(x,y') + D(x',y) + D(x',y') - 2 D(y,y') - 2 D(x,x')
    Algo,
}

/// Divergence settings as read from a configuration; resolved once
/// into a [`RenyiDivergence`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DivergenceConfig {
    pub alpha: f64,
    pub estimator: Estimator,
    pub symmetric: bool,
    pub use_full: bool,
    pub use_avg: bool,
    pub unbiased: Unbiased,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            estimator: Estimator::default(),
            symmetric: false,
            use_full: false,
            use_avg: false,
            unbiased: Unbiased::default(),
        }
    }
}

impl DivergenceConfig {
    pub fn resolve(&self) -> RenyiDivergence {
        let strategy = RenyiDivergence {
            estimator: self.estimator,
            opts: MixtureOptions {
                symmetric: self.symmetric,
                use_full: self.use_full,
                use_avg: self.use_avg,
            },
            unbiased: self.unbiased,
        };
        debug!("divergence strategy: {:?}", strategy);
        strategy
    }
}

/// A resolved divergence loss: estimator variant, symmetry and Gram
/// switches, and the unbiased combinator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenyiDivergence {
    estimator: Estimator,
    opts: MixtureOptions,
    unbiased: Unbiased,
}

impl RenyiDivergence {
    pub fn estimator(&self) -> Estimator {
        self.estimator
    }

    pub fn options(&self) -> &MixtureOptions {
        &self.opts
    }

    pub fn unbiased(&self) -> Unbiased {
        self.unbiased
    }

    /// Rows per divergence term for a batch of `batch_size`; the
    /// unbiased combinators work on halves
    pub fn term_rows(&self, batch_size: usize) -> usize {
        match self.unbiased {
            Unbiased::None => batch_size,
            Unbiased::Eq | Unbiased::Algo => batch_size / 2,
        }
    }

    /// One divergence term between weighted point sets
    pub fn divergence<K: Kernel + ?Sized>(
        &self,
        w_p: &Tensor,
        x_nd: &Tensor,
        w_q: &Tensor,
        y_md: &Tensor,
        kernel: &K,
        alpha: f64,
    ) -> Result<Tensor> {
        match self.estimator {
            Estimator::Naive => {
                renyi_mixture_divergence(w_p, x_nd, w_q, y_md, kernel, alpha, &self.opts)
            }
            Estimator::Stable => {
                renyi_mixture_divergence_stable(w_p, x_nd, w_q, y_md, kernel, alpha, &self.opts)
            }
        }
    }

    /// One divergence term between uniformly weighted point sets
    pub fn uniform_divergence<K: Kernel + ?Sized>(
        &self,
        x_nd: &Tensor,
        y_md: &Tensor,
        kernel: &K,
        alpha: f64,
    ) -> Result<Tensor> {
        let w_p = uniform_weights(x_nd.dim(0)?, x_nd.dtype(), x_nd.device())?;
        let w_q = uniform_weights(y_md.dim(0)?, y_md.dtype(), y_md.device())?;
        self.divergence(&w_p, x_nd, &w_q, y_md, kernel, alpha)
    }

    /// Divergence loss between a real batch and a generated batch,
    /// wrapped in the configured unbiased combinator
    ///
    /// * `x_real` - real samples (rows); even number of rows when unbiased
    /// * `x_gen` - generated samples (rows)
    /// * `kernel` - similarity kernel
    /// * `alpha` - Rényi order at this step
    pub fn loss<K: Kernel + ?Sized>(
        &self,
        x_real: &Tensor,
        x_gen: &Tensor,
        kernel: &K,
        alpha: f64,
    ) -> Result<Tensor> {
        combine_unbiased(self.unbiased, x_real, x_gen, |x, y| {
            self.uniform_divergence(x, y, kernel, alpha)
        })
    }
}

/// Apply a sample-splitting combinator to a divergence function `d`
///
/// * `mode` - combinator
/// * `x_real` - real batch, split into `(x', x)` unless `mode` is `None`
/// * `x_gen` - generated batch, split into `(y', y)` likewise
/// * `d` - divergence between two point sets
///
pub fn combine_unbiased<D>(mode: Unbiased, x_real: &Tensor, x_gen: &Tensor, d: D) -> Result<Tensor>
where
    D: Fn(&Tensor, &Tensor) -> Result<Tensor>,
{
    match mode {
        Unbiased::None => d(x_real, x_gen),
        Unbiased::Eq => {
            let (_, x) = split_halves(x_real)?;
            let (y_prime, y) = split_halves(x_gen)?;
            (d(&x, &y)? * 2.0)?.sub(&d(&y, &y_prime)?)
        }
        Unbiased::Algo => {
            let (x_prime, x) = split_halves(x_real)?;
            let (y_prime, y) = split_halves(x_gen)?;
            let cross = d(&x, &y)?
                .add(&d(&x, &y_prime)?)?
                .add(&d(&x_prime, &y)?)?
                .add(&d(&x_prime, &y_prime)?)?;
            let within = d(&y, &y_prime)?.add(&d(&x, &x_prime)?)?;
            cross.sub(&(within * 2.0)?)
        }
    }
}
