use crate::candle_aux_ops::{log_sum_exp, point_set_dims};

use candle_core::{bail, Result, Tensor};
use serde::{Deserialize, Serialize};

/// A positive similarity kernel evaluated on two point sets at once.
///
/// Implementors are immutable value objects: bandwidths, degrees and
/// constants are fixed at construction, so one kernel can be shared
/// across threads and reused for every evaluation of a training run.
pub trait Kernel: Send + Sync {
    /// Gram matrix `K[i,j] = k(x_i, y_j)`
    ///
    /// # Arguments
    /// * `x_nd` - point set (n x d)
    /// * `y_md` - point set (m x d)
    ///
    /// # Returns
    /// Similarities, shape (n, m)
    fn gram(&self, x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor>;

    /// Log Gram matrix `log K[i,j]`, shape (n, m)
    ///
    /// The default takes the log of [`Kernel::gram`]; kernels whose
    /// values can underflow override this with a direct log-domain
    /// evaluation.
    fn log_gram(&self, x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor> {
        self.gram(x_nd, y_md)?.log()
    }
}

impl<K: Kernel + ?Sized> Kernel for &K {
    fn gram(&self, x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor> {
        (**self).gram(x_nd, y_md)
    }

    fn log_gram(&self, x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor> {
        (**self).log_gram(x_nd, y_md)
    }
}

impl<K: Kernel + ?Sized> Kernel for Box<K> {
    fn gram(&self, x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor> {
        (**self).gram(x_nd, y_md)
    }

    fn log_gram(&self, x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor> {
        (**self).log_gram(x_nd, y_md)
    }
}

/// Validate two point sets and, if either is empty, return the
/// zero-sized (n x m) Gram matrix
fn check_pair(x_nd: &Tensor, y_md: &Tensor) -> Result<Option<Tensor>> {
    let (n, dx) = point_set_dims(x_nd, "x")?;
    let (m, dy) = point_set_dims(y_md, "y")?;
    if dx != dy {
        bail!("feature dimensions differ: x has {}, y has {}", dx, dy);
    }
    if n == 0 || m == 0 {
        return Ok(Some(Tensor::zeros(
            (n, m),
            x_nd.dtype(),
            x_nd.device(),
        )?));
    }
    Ok(None)
}

/// Pairwise squared Euclidean distances
///
/// D[i,j] = |x_i|^2 + |y_j|^2 - 2 x_i.y_j
///
/// Only one (n x m) product is formed; cancellation below zero is
/// clamped to zero.
///
/// * `x_nd` - point set (n x d)
/// * `y_md` - point set (m x d)
///
pub fn sq_dist(x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor> {
    if let Some(empty) = check_pair(x_nd, y_md)? {
        return Ok(empty);
    }
    let xx_n1 = x_nd.sqr()?.sum_keepdim(1)?;
    let yy_1m = y_md.sqr()?.sum_keepdim(1)?.t()?;
    let xy_nm = x_nd.matmul(&y_md.t()?)?;

    xx_n1
        .broadcast_add(&yy_1m)?
        .sub(&(xy_nm * 2.0)?)?
        .maximum(0.0)
}

/// Apply a per-pair similarity to all pairs of two point sets
///
/// `f` receives broadcast views `u` (n x 1 x d) and `v` (1 x m x d)
/// and must reduce the feature axis, returning (n x m). It is called
/// once, so the whole grid is one batched tensor expression.
///
/// * `x_nd` - point set (n x d)
/// * `y_md` - point set (m x d)
/// * `f` - per-pair similarity on broadcast views
///
pub fn generic_kernel<F>(x_nd: &Tensor, y_md: &Tensor, f: F) -> Result<Tensor>
where
    F: Fn(&Tensor, &Tensor) -> Result<Tensor>,
{
    if let Some(empty) = check_pair(x_nd, y_md)? {
        return Ok(empty);
    }
    let (n, m) = (x_nd.dim(0)?, y_md.dim(0)?);

    let u_n1d = x_nd.unsqueeze(1)?;
    let v_1md = y_md.unsqueeze(0)?;
    let k_nm = f(&u_n1d, &v_1md)?;

    if k_nm.dims() != [n, m] {
        bail!(
            "pairwise similarity returned shape {:?}, expected ({}, {})",
            k_nm.dims(),
            n,
            m
        );
    }
    Ok(k_nm)
}

/// Cosine similarity over the last axis of two broadcastable tensors
///
/// cos(u,v) = u.v / max(|u| |v|, 1e-8)
///
pub fn cosine_similarity(u: &Tensor, v: &Tensor) -> Result<Tensor> {
    let last = u.rank() - 1;
    let dot = u.broadcast_mul(v)?.sum(last)?;
    let norm_u = u.sqr()?.sum(last)?.sqrt()?;
    let norm_v = v.sqr()?.sum(last)?.sqrt()?;
    let denom = norm_u.broadcast_mul(&norm_v)?.maximum(1e-8)?;
    dot.broadcast_div(&denom)
}

/// Multi-scale Gaussian (RBF) kernel
///
/// k(x,y) = 1/S sum_s exp(-|x-y|^2 / (2 sigma_s^2))
///
/// `sigma = 0` divides by zero and propagates inf/NaN.
#[derive(Clone, Debug)]
pub struct GaussianKernel {
    sigmas: Vec<f64>,
}

impl GaussianKernel {
    pub fn new(sigma: f64) -> Self {
        Self {
            sigmas: vec![sigma],
        }
    }

    /// Average of Gaussian kernels over several bandwidths
    pub fn multi_scale(sigmas: &[f64]) -> Result<Self> {
        if sigmas.is_empty() {
            bail!("need at least one bandwidth");
        }
        Ok(Self {
            sigmas: sigmas.to_vec(),
        })
    }

    pub fn sigmas(&self) -> &[f64] {
        &self.sigmas
    }

    /// -D / (2 sigma^2) for each bandwidth
    fn log_terms(&self, dist_nm: &Tensor) -> Result<Vec<Tensor>> {
        self.sigmas
            .iter()
            .map(|&s| dist_nm.affine(-0.5 / (s * s), 0.0))
            .collect()
    }
}

impl Kernel for GaussianKernel {
    fn gram(&self, x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor> {
        let dist_nm = sq_dist(x_nd, y_md)?;
        let mut terms = self.log_terms(&dist_nm)?.into_iter();
        let mut acc = match terms.next() {
            Some(t) => t.exp()?,
            None => bail!("need at least one bandwidth"),
        };
        for t in terms {
            acc = acc.add(&t.exp()?)?;
        }
        acc / (self.sigmas.len() as f64)
    }

    /// log k = lse_s(-D / (2 sigma_s^2)) - log S
    fn log_gram(&self, x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor> {
        let dist_nm = sq_dist(x_nd, y_md)?;
        let mut terms = self.log_terms(&dist_nm)?;
        if terms.len() == 1 {
            return Ok(terms.remove(0));
        }
        let stacked = Tensor::stack(&terms, 0)?;
        log_sum_exp(&stacked, 0)? - (self.sigmas.len() as f64).ln()
    }
}

/// Polynomial kernel
///
/// k(x,y) = (x.y + c)^degree
///
/// Non-integer degrees and the log domain need `x.y + c > 0`;
/// otherwise NaN propagates.
#[derive(Clone, Debug)]
pub struct PolynomialKernel {
    degree: f64,
    constant: f64,
}

impl PolynomialKernel {
    pub fn new(degree: f64, constant: f64) -> Self {
        Self { degree, constant }
    }

    fn base(&self, x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor> {
        x_nd.matmul(&y_md.t()?)? + self.constant
    }
}

impl Kernel for PolynomialKernel {
    fn gram(&self, x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor> {
        if let Some(empty) = check_pair(x_nd, y_md)? {
            return Ok(empty);
        }
        let base = self.base(x_nd, y_md)?;
        let deg = self.degree;
        if deg >= 1.0 && deg.fract() == 0.0 && deg <= 16.0 {
            // exact integer power, valid for negative bases too
            let mut ret = base.clone();
            for _ in 1..(deg as usize) {
                ret = ret.mul(&base)?;
            }
            Ok(ret)
        } else {
            base.powf(deg)
        }
    }

    fn log_gram(&self, x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor> {
        if let Some(empty) = check_pair(x_nd, y_md)? {
            return Ok(empty);
        }
        self.base(x_nd, y_md)?.log()? * self.degree
    }
}

/// Cosine similarity shifted into (0, 1]
///
/// k(x,y) = (cos(x,y) + 1 + eps) / (2 + eps)
///
#[derive(Clone, Debug)]
pub struct CosineKernel {
    min_cosine: f64,
}

impl CosineKernel {
    pub fn new(min_cosine: f64) -> Self {
        Self { min_cosine }
    }
}

impl Default for CosineKernel {
    fn default() -> Self {
        Self { min_cosine: 1e-6 }
    }
}

impl Kernel for CosineKernel {
    fn gram(&self, x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor> {
        let eps = self.min_cosine;
        generic_kernel(x_nd, y_md, |u, v| {
            cosine_similarity(u, v)?.affine(1.0 / (2.0 + eps), (1.0 + eps) / (2.0 + eps))
        })
    }
}

/// A kernel backed by an arbitrary per-pair similarity, evaluated
/// through [`generic_kernel`]
pub struct FnKernel<F> {
    pair_fn: F,
}

impl<F> FnKernel<F>
where
    F: Fn(&Tensor, &Tensor) -> Result<Tensor> + Send + Sync,
{
    pub fn new(pair_fn: F) -> Self {
        Self { pair_fn }
    }
}

impl<F> Kernel for FnKernel<F>
where
    F: Fn(&Tensor, &Tensor) -> Result<Tensor> + Send + Sync,
{
    fn gram(&self, x_nd: &Tensor, y_md: &Tensor) -> Result<Tensor> {
        generic_kernel(x_nd, y_md, &self.pair_fn)
    }
}

/// Kernel family and parameters, as read from a configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum KernelConfig {
    Gaussian { sigmas: Vec<f64> },
    Polynomial { degree: f64, constant: f64 },
    Cosine { min_cosine: f64 },
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig::Gaussian { sigmas: vec![1.6] }
    }
}

impl KernelConfig {
    pub fn build(&self) -> Result<Box<dyn Kernel>> {
        Ok(match self {
            KernelConfig::Gaussian { sigmas } => Box::new(GaussianKernel::multi_scale(sigmas)?),
            KernelConfig::Polynomial { degree, constant } => {
                Box::new(PolynomialKernel::new(*degree, *constant))
            }
            KernelConfig::Cosine { min_cosine } => Box::new(CosineKernel::new(*min_cosine)),
        })
    }

    /// Same family with the Gaussian bandwidths rescaled so that the
    /// first one equals `sigma`; other families are returned as is
    pub fn with_sigma(&self, sigma: f64) -> Self {
        match self {
            KernelConfig::Gaussian { sigmas } => {
                let first = sigmas.first().copied().unwrap_or(sigma);
                let ratio = if first != 0.0 { sigma / first } else { 1.0 };
                KernelConfig::Gaussian {
                    sigmas: sigmas.iter().map(|s| s * ratio).collect(),
                }
            }
            other => other.clone(),
        }
    }
}
