//! Similarity-sensitive Rényi divergence between two weighted point sets.
//!
//! With `p = sum_i w_p[i] δ(x_i)`, `q = sum_j w_q[j] δ(y_j)` and a kernel `k`,
//! each point `x_i` of `p` carries
//!
//! - a self mass  `a_i = sum_j k(x_i, x_j) w_p[j]`  (row of `K_pp w_pᵀ`)
//! - a cross mass `b_i = sum_j k(x_i, y_j) w_q[j]`  (row of `K_pq w_qᵀ`)
//!
//! whose `w_p`-averages are the quadratic forms `m_p = w_p K_pp w_pᵀ` and
//! `m_pq = w_p K_pq w_qᵀ`. The divergence of order `α` is
//!
//! ```text
//! D(p‖q) = 1/(α-1) log sum_i w_p[i] (a_i / b_i)^(α-1)     (α ≠ 1)
//! D(p‖q) = sum_i w_p[i] (log a_i - log b_i)               (α = 1)
//! ```
//!
//! The `α = 1` case is its own closed form; the power form is never
//! evaluated near `α = 1`.

use crate::candle_aux_ops::{log_sum_exp, point_set_dims, weight_batch};
use crate::kernel::Kernel;

use candle_core::{bail, DType, Device, Result, Tensor};

/// Estimator switches shared by the naive and the log-domain variants
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MixtureOptions {
    /// average `D(p‖q)` and `D(q‖p)`
    pub symmetric: bool,
    /// evaluate one Gram matrix on the stacked `[X; Y]` and slice the
    /// blocks out of it
    pub use_full: bool,
    /// leave-one-out self mass: drop `k(x_i, x_i)` from `a_i` and
    /// renormalize by `1 - w_p[i]`
    ///
    /// Consistent when `X` and `Y` are independent samples. The cross
    /// mass keeps its diagonal, so `D(p‖p)` on one and the same sample
    /// is negative under this flag, and so is the within-set term of
    /// the unbiased combinators.
    pub use_avg: bool,
}

/// The closed-form branch is taken at exactly `α = 1`
fn is_shannon(alpha: f64) -> bool {
    alpha == 1.0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Domain {
    Linear,
    Log,
}

struct GramBlocks {
    /// k(X, X): n x n
    pp: Tensor,
    /// k(X, Y): n x m
    pq: Tensor,
}

fn evaluate<K: Kernel + ?Sized>(
    kernel: &K,
    x: &Tensor,
    y: &Tensor,
    domain: Domain,
) -> Result<Tensor> {
    match domain {
        Domain::Linear => kernel.gram(x, y),
        Domain::Log => kernel.log_gram(x, y),
    }
}

fn gram_blocks<K: Kernel + ?Sized>(
    kernel: &K,
    x_nd: &Tensor,
    y_md: &Tensor,
    domain: Domain,
    use_full: bool,
) -> Result<GramBlocks> {
    if use_full {
        let (n, m) = (x_nd.dim(0)?, y_md.dim(0)?);
        let z = Tensor::cat(&[x_nd, y_md], 0)?;
        let full = evaluate(kernel, &z, &z, domain)?;
        let rows = full.narrow(0, 0, n)?;
        Ok(GramBlocks {
            pp: rows.narrow(1, 0, n)?.contiguous()?,
            pq: rows.narrow(1, n, m)?.contiguous()?,
        })
    } else {
        Ok(GramBlocks {
            pp: evaluate(kernel, x_nd, x_nd, domain)?,
            pq: evaluate(kernel, x_nd, y_md, domain)?,
        })
    }
}

/// `1 - I` (n x n) in the given dtype
fn off_diagonal(n: usize, dtype: DType, device: &Device) -> Result<Tensor> {
    let data: Vec<f64> = (0..n * n)
        .map(|k| if k / n == k % n { 0.0 } else { 1.0 })
        .collect();
    Tensor::from_vec(data, (n, n), device)?.to_dtype(dtype)
}

/// `-inf` on the diagonal, zero elsewhere (n x n)
fn log_off_diagonal(n: usize, dtype: DType, device: &Device) -> Result<Tensor> {
    let data: Vec<f64> = (0..n * n)
        .map(|k| if k / n == k % n { f64::NEG_INFINITY } else { 0.0 })
        .collect();
    Tensor::from_vec(data, (n, n), device)?.to_dtype(dtype)
}

/// Validate shapes and return the weight batch size
fn check_inputs(w_p: &Tensor, x_nd: &Tensor, w_q: &Tensor, y_md: &Tensor) -> Result<usize> {
    let (n, dx) = point_set_dims(x_nd, "x")?;
    let (m, dy) = point_set_dims(y_md, "y")?;
    if dx != dy {
        bail!("feature dimensions differ: x has {}, y has {}", dx, dy);
    }
    let bp = weight_batch(w_p, n, "p")?;
    let bq = weight_batch(w_q, m, "q")?;
    if bp != bq {
        bail!("weight batch sizes differ: p has {}, q has {}", bp, bq);
    }
    Ok(bp)
}

/// A single weight row gives a scalar; a batch gives a vector
fn finalize(div_b: Tensor, batch: usize) -> Result<Tensor> {
    if batch == 1 {
        div_b.reshape(())
    } else {
        Ok(div_b)
    }
}

/// D(p‖q) from linear-domain Gram blocks, shape (B,)
fn directional_naive<K: Kernel + ?Sized>(
    w_p: &Tensor,
    x_nd: &Tensor,
    w_q: &Tensor,
    y_md: &Tensor,
    kernel: &K,
    alpha: f64,
    opts: &MixtureOptions,
) -> Result<Tensor> {
    let blocks = gram_blocks(kernel, x_nd, y_md, Domain::Linear, opts.use_full)?;

    // self mass a: n x B
    let a_nb = if opts.use_avg {
        let n = x_nd.dim(0)?;
        let mask = off_diagonal(n, blocks.pp.dtype(), blocks.pp.device())?;
        let rest_nb = w_p.affine(-1.0, 1.0)?.t()?;
        blocks.pp.mul(&mask)?.matmul(&w_p.t()?)?.div(&rest_nb)?
    } else {
        blocks.pp.matmul(&w_p.t()?)?
    };

    // cross mass b: n x B
    let b_nb = blocks.pq.matmul(&w_q.t()?)?;

    mass_divergence(w_p, &a_nb, &b_nb, alpha)
}

/// D(p‖q) from self masses `a` and cross masses `b` (n x B), shape (B,)
fn mass_divergence(w_p: &Tensor, a_nb: &Tensor, b_nb: &Tensor, alpha: f64) -> Result<Tensor> {
    if is_shannon(alpha) {
        let log_ratio_bn = a_nb.log()?.sub(&b_nb.log()?)?.t()?;
        w_p.mul(&log_ratio_bn)?.sum(1)
    } else {
        let ratio_bn = a_nb.div(b_nb)?.powf(alpha - 1.0)?.t()?;
        w_p.mul(&ratio_bn)?.sum(1)?.log()? / (alpha - 1.0)
    }
}

/// Check a square Gram matrix against weight rows; returns the batch size
fn check_shared_support(k_nn: &Tensor, w_p: &Tensor, w_q: &Tensor) -> Result<usize> {
    let (n, m) = point_set_dims(k_nn, "gram")?;
    if n != m {
        bail!("gram matrix over one support must be square, got {} x {}", n, m);
    }
    let bp = weight_batch(w_p, n, "p")?;
    let bq = weight_batch(w_q, n, "q")?;
    if bp != bq {
        bail!("weight batch sizes differ: p has {}, q has {}", bp, bq);
    }
    Ok(bp)
}

/// D(p‖q) from log-domain Gram blocks, shape (B,)
fn directional_stable<K: Kernel + ?Sized>(
    w_p: &Tensor,
    x_nd: &Tensor,
    w_q: &Tensor,
    y_md: &Tensor,
    kernel: &K,
    alpha: f64,
    opts: &MixtureOptions,
) -> Result<Tensor> {
    let blocks = gram_blocks(kernel, x_nd, y_md, Domain::Log, opts.use_full)?;

    let log_w_p = w_p.log()?; // B x n
    let log_w_q = w_q.log()?; // B x m

    // log a[b,i] = lse_j( log K_pp[i,j] + log w_p[b,j] )
    let log_k_pp = if opts.use_avg {
        let n = x_nd.dim(0)?;
        let mask = log_off_diagonal(n, blocks.pp.dtype(), blocks.pp.device())?;
        blocks.pp.broadcast_add(&mask)?
    } else {
        blocks.pp
    };
    let log_a_bn = log_sum_exp(
        &log_k_pp
            .unsqueeze(0)?
            .broadcast_add(&log_w_p.unsqueeze(1)?)?,
        2,
    )?;
    let log_a_bn = if opts.use_avg {
        log_a_bn.sub(&w_p.affine(-1.0, 1.0)?.log()?)?
    } else {
        log_a_bn
    };

    // log b[b,i] = lse_j( log K_pq[i,j] + log w_q[b,j] )
    let log_b_bn = log_sum_exp(
        &blocks
            .pq
            .unsqueeze(0)?
            .broadcast_add(&log_w_q.unsqueeze(1)?)?,
        2,
    )?;

    let log_ratio_bn = log_a_bn.sub(&log_b_bn)?;

    if is_shannon(alpha) {
        w_p.mul(&log_ratio_bn)?.sum(1)
    } else {
        let terms_bn = log_w_p.add(&(log_ratio_bn * (alpha - 1.0))?)?;
        log_sum_exp(&terms_bn, 1)? / (alpha - 1.0)
    }
}

#[allow(clippy::too_many_arguments)]
fn combine<K, F>(
    directional: F,
    w_p: &Tensor,
    x_nd: &Tensor,
    w_q: &Tensor,
    y_md: &Tensor,
    kernel: &K,
    alpha: f64,
    opts: &MixtureOptions,
) -> Result<Tensor>
where
    K: Kernel + ?Sized,
    F: Fn(&Tensor, &Tensor, &Tensor, &Tensor, &K, f64, &MixtureOptions) -> Result<Tensor>,
{
    let batch = check_inputs(w_p, x_nd, w_q, y_md)?;

    let div_b = if opts.symmetric {
        let d_pq = directional(w_p, x_nd, w_q, y_md, kernel, alpha, opts)?;
        let d_qp = directional(w_q, y_md, w_p, x_nd, kernel, alpha, opts)?;
        (d_pq.add(&d_qp)? * 0.5)?
    } else {
        directional(w_p, x_nd, w_q, y_md, kernel, alpha, opts)?
    };

    finalize(div_b, batch)
}

/// Rényi mixture divergence evaluated directly on kernel values
///
/// Suitable when kernel values stay well inside floating point range;
/// see [`renyi_mixture_divergence_stable`] otherwise.
///
/// # Arguments
/// * `w_p` - weights of p, shape (1, n) or (B, n), rows sum to one
/// * `x_nd` - support of p (n x d)
/// * `w_q` - weights of q, shape (1, m) or (B, m)
/// * `y_md` - support of q (m x d)
/// * `kernel` - similarity kernel
/// * `alpha` - Rényi order; `1.0` selects the closed-form limit
/// * `opts` - symmetric / full Gram / leave-one-out switches
///
/// # Returns
/// A scalar for a single weight row, otherwise a (B,) vector.
/// Invalid `alpha` or degenerate kernels propagate NaN/inf.
pub fn renyi_mixture_divergence<K: Kernel + ?Sized>(
    w_p: &Tensor,
    x_nd: &Tensor,
    w_q: &Tensor,
    y_md: &Tensor,
    kernel: &K,
    alpha: f64,
    opts: &MixtureOptions,
) -> Result<Tensor> {
    combine(
        directional_naive::<K>,
        w_p,
        x_nd,
        w_q,
        y_md,
        kernel,
        alpha,
        opts,
    )
}

/// Rényi mixture divergence carried entirely in log space
///
/// Uses [`Kernel::log_gram`]; masses are log-sum-exps of log kernel
/// values and log weights, and the final sum over points is another
/// log-sum-exp, so nothing is exponentiated before the max is
/// subtracted. Same arguments and result as
/// [`renyi_mixture_divergence`].
pub fn renyi_mixture_divergence_stable<K: Kernel + ?Sized>(
    w_p: &Tensor,
    x_nd: &Tensor,
    w_q: &Tensor,
    y_md: &Tensor,
    kernel: &K,
    alpha: f64,
    opts: &MixtureOptions,
) -> Result<Tensor> {
    combine(
        directional_stable::<K>,
        w_p,
        x_nd,
        w_q,
        y_md,
        kernel,
        alpha,
        opts,
    )
}

/// Rényi divergence between two weightings of one shared support
///
/// D(p‖q) = 1/(α-1) log sum_i p_i ((K p)_i / (K q)_i)^(α-1)
///
/// Same quantity as [`renyi_mixture_divergence`] with `x_nd == y_md`,
/// but from a precomputed Gram matrix, so only the weights carry
/// gradients.
///
/// * `k_nn` - kernel values between the support points (n x n)
/// * `w_p` - weights (1, n) or (B, n)
/// * `w_q` - weights (1, n) or (B, n)
/// * `alpha` - Rényi order; `1.0` selects the closed-form limit
///
pub fn renyi_sim_divergence(k_nn: &Tensor, w_p: &Tensor, w_q: &Tensor, alpha: f64) -> Result<Tensor> {
    let batch = check_shared_support(k_nn, w_p, w_q)?;
    let a_nb = k_nn.matmul(&w_p.t()?)?;
    let b_nb = k_nn.matmul(&w_q.t()?)?;
    finalize(mass_divergence(w_p, &a_nb, &b_nb, alpha)?, batch)
}

/// Similarity-sensitive Rényi entropy of a weighting of a support
///
/// H(q) = 1/(1-α) log sum_i q_i (K q)_i^(α-1)     (α ≠ 1)
/// H(q) = -sum_i q_i log (K q)_i                   (α = 1)
///
/// With `K = I` this is the ordinary Rényi entropy of `q`.
///
/// * `k_nn` - kernel values between the support points (n x n)
/// * `w_q` - weights (1, n) or (B, n)
/// * `alpha` - Rényi order
///
pub fn renyi_sim_entropy(k_nn: &Tensor, w_q: &Tensor, alpha: f64) -> Result<Tensor> {
    let batch = check_shared_support(k_nn, w_q, w_q)?;
    let z_nb = k_nn.matmul(&w_q.t()?)?;
    let h_b = if is_shannon(alpha) {
        w_q.mul(&z_nb.log()?.t()?)?.sum(1)?.neg()?
    } else {
        let z_bn = z_nb.powf(alpha - 1.0)?.t()?;
        (w_q.mul(&z_bn)?.sum(1)?.log()? / (1.0 - alpha))?
    };
    finalize(h_b, batch)
}
