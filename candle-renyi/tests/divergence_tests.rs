use candle_renyi::candle_core::{DType, Device, Result, Tensor, Var};
use candle_renyi::*;
use matrix_util::traits::ConvertMatOps;
use ndarray::Array2;

fn points(n: usize, d: usize, shift: f64) -> Result<Tensor> {
    Tensor::randn(0f64, 1f64, (n, d), &Device::Cpu)? + shift
}

fn scalar(t: &Tensor) -> Result<f64> {
    t.to_dtype(DType::F64)?.to_scalar::<f64>()
}

/// Loop-by-loop Gaussian mixture divergence with uniform weights;
/// `leave_one_out` drops `k(x_i, x_i)` from the self mass
fn reference_divergence(
    x: &Array2<f64>,
    y: &Array2<f64>,
    sigma: f64,
    alpha: f64,
    leave_one_out: bool,
) -> f64 {
    let k = |u: ndarray::ArrayView1<f64>, v: ndarray::ArrayView1<f64>| {
        let d2: f64 = u.iter().zip(v.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
        (-d2 / (2.0 * sigma * sigma)).exp()
    };
    let n = x.nrows();
    let m = y.nrows();
    let mut acc = 0.0;
    for i in 0..n {
        let a: f64 = if leave_one_out {
            (0..n)
                .filter(|&j| j != i)
                .map(|j| k(x.row(i), x.row(j)))
                .sum::<f64>()
                / (n - 1) as f64
        } else {
            (0..n).map(|j| k(x.row(i), x.row(j))).sum::<f64>() / n as f64
        };
        let b: f64 = (0..m).map(|j| k(x.row(i), y.row(j))).sum::<f64>() / m as f64;
        if alpha == 1.0 {
            acc += (a.ln() - b.ln()) / n as f64;
        } else {
            acc += (a / b).powf(alpha - 1.0) / n as f64;
        }
    }
    if alpha == 1.0 {
        acc
    } else {
        acc.ln() / (alpha - 1.0)
    }
}

#[test]
fn symmetric_divergence_ignores_argument_order() -> anyhow::Result<()> {
    let x = points(20, 5, 0.0)?;
    let y = points(14, 5, 1.0)?;
    let kern = GaussianKernel::new(1.5);

    for estimator in [Estimator::Naive, Estimator::Stable] {
        for alpha in [0.5, 1.0, 2.0] {
            let strategy = DivergenceConfig {
                alpha,
                estimator,
                symmetric: true,
                ..Default::default()
            }
            .resolve();
            let pq = scalar(&strategy.uniform_divergence(&x, &y, &kern, alpha)?)?;
            let qp = scalar(&strategy.uniform_divergence(&y, &x, &kern, alpha)?)?;
            assert_eq!(pq, qp);
        }
    }
    Ok(())
}

#[test]
fn self_divergence_vanishes() -> anyhow::Result<()> {
    let x = points(16, 4, 0.3)?;
    let w = uniform_weights(16, DType::F64, &Device::Cpu)?;
    let kernels: Vec<Box<dyn Kernel>> = vec![
        Box::new(GaussianKernel::new(1.0)),
        Box::new(GaussianKernel::multi_scale(&[0.5, 1.0, 4.0])?),
        Box::new(CosineKernel::default()),
    ];
    let opts = MixtureOptions::default();

    for kern in kernels.iter() {
        for alpha in [0.5, 1.0, 3.0] {
            let naive = renyi_mixture_divergence(&w, &x, &w, &x, kern, alpha, &opts)?;
            let stable = renyi_mixture_divergence_stable(&w, &x, &w, &x, kern, alpha, &opts)?;
            approx::assert_abs_diff_eq!(scalar(&naive)?, 0.0, epsilon = 1e-10);
            approx::assert_abs_diff_eq!(scalar(&stable)?, 0.0, epsilon = 1e-10);
        }
    }
    Ok(())
}

#[test]
fn stable_and_naive_agree_on_moderate_inputs() -> anyhow::Result<()> {
    let x = points(32, 8, 0.0)?;
    let y = points(32, 8, 0.5)?;
    let w = uniform_weights(32, DType::F64, &Device::Cpu)?;
    let kern = GaussianKernel::new(1.0);

    for opts in [
        MixtureOptions::default(),
        MixtureOptions {
            symmetric: true,
            use_full: true,
            use_avg: true,
        },
    ] {
        let naive = scalar(&renyi_mixture_divergence(&w, &x, &w, &y, &kern, 0.5, &opts)?)?;
        let stable = scalar(&renyi_mixture_divergence_stable(&w, &x, &w, &y, &kern, 0.5, &opts)?)?;
        assert!(naive.is_finite());
        approx::assert_relative_eq!(naive, stable, max_relative = 1e-4);
    }
    Ok(())
}

#[test]
fn matches_a_loop_reference() -> anyhow::Result<()> {
    let x_nd = points(12, 3, 0.0)?;
    let y_md = points(9, 3, 0.7)?;
    let x = Array2::<f64>::from_tensor(&x_nd)?;
    let y = Array2::<f64>::from_tensor(&y_md)?;
    let kern = GaussianKernel::new(1.2);
    let strategy = DivergenceConfig::default().resolve();

    for alpha in [0.25, 0.5, 1.0, 2.0] {
        let expected = reference_divergence(&x, &y, 1.2, alpha, false);
        let d = scalar(&strategy.uniform_divergence(&x_nd, &y_md, &kern, alpha)?)?;
        approx::assert_relative_eq!(d, expected, max_relative = 1e-9);
    }
    Ok(())
}

#[test]
fn leave_one_out_matches_a_loop_reference() -> anyhow::Result<()> {
    let x_nd = points(8, 4, 0.0)?;
    let y_md = points(10, 4, 0.6)?;
    let x = Array2::<f64>::from_tensor(&x_nd)?;
    let y = Array2::<f64>::from_tensor(&y_md)?;
    let kern = GaussianKernel::new(1.0);

    for estimator in [Estimator::Naive, Estimator::Stable] {
        let strategy = DivergenceConfig {
            estimator,
            use_avg: true,
            ..Default::default()
        }
        .resolve();

        for alpha in [0.5, 1.0, 2.0] {
            let expected = reference_divergence(&x, &y, 1.0, alpha, true);
            let d = scalar(&strategy.uniform_divergence(&x_nd, &y_md, &kern, alpha)?)?;
            approx::assert_relative_eq!(d, expected, max_relative = 1e-9);

            // one sample against itself: the cross mass keeps k(x_i, x_i)
            let expected = reference_divergence(&x, &x, 1.0, alpha, true);
            let d = scalar(&strategy.uniform_divergence(&x_nd, &x_nd, &kern, alpha)?)?;
            approx::assert_relative_eq!(d, expected, max_relative = 1e-9);
            assert!(d < 0.0);
        }
    }
    Ok(())
}

#[test]
fn gram_level_divergence_and_entropy_from_a_kernel() -> anyhow::Result<()> {
    let x = points(10, 3, 0.0)?;
    let kern = GaussianKernel::new(1.5);
    let k_nn = kern.gram(&x, &x)?;
    let w_q = uniform_weights(10, DType::F64, &Device::Cpu)?;
    let w_p = Tensor::new(
        &[[0.4f64, 0.2, 0.1, 0.1, 0.05, 0.05, 0.025, 0.025, 0.025, 0.025]],
        &Device::Cpu,
    )?;

    let d = scalar(&renyi_sim_divergence(&k_nn, &w_p, &w_q, 1.0)?)?;
    let expected = scalar(&renyi_mixture_divergence_stable(
        &w_p,
        &x,
        &w_q,
        &x,
        &kern,
        1.0,
        &MixtureOptions::default(),
    )?)?;
    approx::assert_relative_eq!(d, expected, max_relative = 1e-9);

    // a point mass has zero entropy; spreading mass raises it
    let mut one_hot = vec![0f64; 10];
    one_hot[3] = 1.0;
    let w_point = Tensor::from_vec(one_hot, (1, 10), &Device::Cpu)?;
    for alpha in [0.5, 1.0, 2.0] {
        let h_point = scalar(&renyi_sim_entropy(&k_nn, &w_point, alpha)?)?;
        let h_q = scalar(&renyi_sim_entropy(&k_nn, &w_q, alpha)?)?;
        approx::assert_abs_diff_eq!(h_point, 0.0, epsilon = 1e-12);
        assert!(h_q > 0.0);
    }
    Ok(())
}

#[test]
fn divergence_of_separated_clouds_is_positive() -> anyhow::Result<()> {
    let x = points(24, 2, 0.0)?;
    let near = points(24, 2, 0.2)?;
    let far = points(24, 2, 3.0)?;
    let kern = GaussianKernel::new(1.0);
    let strategy = DivergenceConfig::default().resolve();

    let d_near = scalar(&strategy.uniform_divergence(&x, &near, &kern, 0.5)?)?;
    let d_far = scalar(&strategy.uniform_divergence(&x, &far, &kern, 0.5)?)?;
    assert!(d_far > d_near);
    assert!(d_far > 0.0);
    Ok(())
}

#[test]
fn gram_shapes_and_symmetry() -> anyhow::Result<()> {
    let x = points(7, 3, 0.0)?;
    let y = points(5, 3, 1.0)?;
    let kernels: Vec<Box<dyn Kernel>> = vec![
        KernelConfig::Gaussian {
            sigmas: vec![0.5, 2.0],
        }
        .build()?,
        KernelConfig::Polynomial {
            degree: 2.0,
            constant: 1.0,
        }
        .build()?,
        KernelConfig::Cosine { min_cosine: 1e-6 }.build()?,
    ];

    for kern in kernels.iter() {
        assert_eq!(kern.gram(&x, &y)?.dims(), &[7, 5]);
        assert_eq!(kern.log_gram(&x, &y)?.dims(), &[7, 5]);

        let k_xx = kern.gram(&x, &x)?.to_vec2::<f64>()?;
        for i in 0..7 {
            for j in 0..7 {
                approx::assert_abs_diff_eq!(k_xx[i][j], k_xx[j][i], epsilon = 1e-10);
            }
        }
    }
    Ok(())
}

#[test]
fn empty_point_set_gives_empty_gram() -> anyhow::Result<()> {
    let x = points(4, 3, 0.0)?;
    let empty = Tensor::zeros((0, 3), DType::F64, &Device::Cpu)?;
    let kern = GaussianKernel::new(1.0);

    assert_eq!(kern.gram(&x, &empty)?.dims(), &[4, 0]);
    assert_eq!(kern.log_gram(&empty, &x)?.dims(), &[0, 4]);
    Ok(())
}

#[test]
fn unbiased_combinators_on_a_degenerate_split() -> anyhow::Result<()> {
    let x = points(8, 3, 0.0)?;
    let y = points(8, 3, 1.0)?;
    let x_real = Tensor::cat(&[&x, &x], 0)?;
    let x_gen = Tensor::cat(&[&y, &y], 0)?;
    let kern = GaussianKernel::new(1.0);
    let alpha = 0.5;

    let plain = DivergenceConfig::default().resolve();
    let d_xy = scalar(&plain.uniform_divergence(&x, &y, &kern, alpha)?)?;

    let eq = DivergenceConfig {
        unbiased: Unbiased::Eq,
        ..Default::default()
    }
    .resolve();
    let algo = DivergenceConfig {
        unbiased: Unbiased::Algo,
        ..Default::default()
    }
    .resolve();

    let d_eq = scalar(&eq.loss(&x_real, &x_gen, &kern, alpha)?)?;
    let d_algo = scalar(&algo.loss(&x_real, &x_gen, &kern, alpha)?)?;

    approx::assert_abs_diff_eq!(d_eq, 2.0 * d_xy, epsilon = 1e-10);
    approx::assert_abs_diff_eq!(d_algo, 4.0 * d_xy, epsilon = 1e-10);
    Ok(())
}

#[test]
fn odd_batches_are_rejected_when_unbiased() -> anyhow::Result<()> {
    let x = points(7, 2, 0.0)?;
    let y = points(8, 2, 0.0)?;
    let kern = GaussianKernel::new(1.0);
    let eq = DivergenceConfig {
        unbiased: Unbiased::Eq,
        ..Default::default()
    }
    .resolve();
    assert!(eq.loss(&x, &y, &kern, 0.5).is_err());
    Ok(())
}

#[test]
fn gradients_flow_to_both_point_sets() -> anyhow::Result<()> {
    let x = Var::from_tensor(&points(8, 4, 0.0)?)?;
    let y = Var::from_tensor(&points(8, 4, 0.5)?)?;
    let w = uniform_weights(8, DType::F64, &Device::Cpu)?;
    let kern = GaussianKernel::new(1.0);

    let d = renyi_mixture_divergence_stable(
        &w,
        x.as_tensor(),
        &w,
        y.as_tensor(),
        &kern,
        0.7,
        &MixtureOptions::default(),
    )?;
    let grads = d.backward()?;

    for var in [&x, &y] {
        let g = grads
            .get(var.as_tensor())
            .ok_or_else(|| anyhow::anyhow!("missing gradient"))?;
        assert_eq!(g.dims(), &[8, 4]);
        let g = g.flatten_all()?.to_vec1::<f64>()?;
        assert!(g.iter().all(|v| v.is_finite()));
        assert!(g.iter().any(|v| *v != 0.0));
    }
    Ok(())
}

#[test]
fn log_gram_survives_underflow() -> anyhow::Result<()> {
    let x = Tensor::new(&[[0f64, 0.0]], &Device::Cpu)?;
    let y = Tensor::new(&[[60f64, 0.0]], &Device::Cpu)?;
    let kern = GaussianKernel::new(1.0);

    assert_eq!(kern.gram(&x, &y)?.to_vec2::<f64>()?[0][0], 0.0);
    let log_k = kern.log_gram(&x, &y)?.to_vec2::<f64>()?[0][0];
    approx::assert_relative_eq!(log_k, -1800.0, max_relative = 1e-12);

    // far apart clouds: the log domain still gives a finite value
    let w = uniform_weights(1, DType::F64, &Device::Cpu)?;
    let d = renyi_mixture_divergence_stable(&w, &x, &w, &y, &kern, 0.5, &MixtureOptions::default())?;
    approx::assert_relative_eq!(scalar(&d)?, 1800.0, max_relative = 1e-12);
    Ok(())
}
