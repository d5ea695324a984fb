use candle_core::{bail, DType, Device, Result, Tensor};

/// Numerically stable `log(sum(exp(x)))` along `dim`, keeping the
/// reduced dimension
///
/// lse(x) = m + log sum_i exp(x_i - m),  m = max_i x_i
///
/// The max is detached, so gradients are exactly the softmax
/// weights. A slice that is entirely `-inf` returns `-inf`.
///
/// * `x` - tensor of log values
/// * `dim` - dimension to reduce
///
pub fn log_sum_exp_keepdim(x: &Tensor, dim: usize) -> Result<Tensor> {
    let max = x.max_keepdim(dim)?.detach();
    // compare in f64: f64::MAX overflows to inf in lower precisions
    let finite = max.abs()?.to_dtype(DType::F64)?.le(f64::MAX)?;
    let max = finite.where_cond(&max, &max.zeros_like()?)?;
    x.broadcast_sub(&max)?
        .exp()?
        .sum_keepdim(dim)?
        .log()?
        .broadcast_add(&max)
}

/// Same as [`log_sum_exp_keepdim`] but drops the reduced dimension
pub fn log_sum_exp(x: &Tensor, dim: usize) -> Result<Tensor> {
    log_sum_exp_keepdim(x, dim)?.squeeze(dim)
}

/// Uniform probability row `1 x n` with entries `1/n`
pub fn uniform_weights(n: usize, dtype: DType, device: &Device) -> Result<Tensor> {
    Tensor::ones((1, n), dtype, device)? / (n.max(1) as f64)
}

/// Check a point set is a rank-2 tensor and return `(n, d)`
pub fn point_set_dims(x: &Tensor, what: &str) -> Result<(usize, usize)> {
    match x.dims() {
        &[n, d] => Ok((n, d)),
        dims => bail!("{} must be a (samples x features) matrix, got shape {:?}", what, dims),
    }
}

/// Check a weight tensor is `B x n` for a point set with `n` rows and
/// return `B`
pub fn weight_batch(w: &Tensor, n: usize, what: &str) -> Result<usize> {
    match w.dims() {
        &[b, m] if m == n => Ok(b),
        dims => bail!(
            "{} weights must have shape (batch x {}), got {:?}",
            what,
            n,
            dims
        ),
    }
}

/// Split a batch along the rows into the first half and the second half
///
/// Returns `(first, second)`; an odd number of rows is an error
pub fn split_halves(x: &Tensor) -> Result<(Tensor, Tensor)> {
    let nn = x.dim(0)?;
    if nn % 2 != 0 {
        bail!("cannot split a batch of {} rows into two equal halves", nn);
    }
    let half = nn / 2;
    Ok((x.narrow(0, 0, half)?, x.narrow(0, half, half)?))
}
