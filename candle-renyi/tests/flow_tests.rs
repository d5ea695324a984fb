use candle_renyi::candle_core::{DType, Device, Tensor};
use candle_renyi::*;
use matrix_util::traits::SampleOps;

fn flow_config(unbiased: Unbiased) -> FlowConfig {
    FlowConfig {
        learning_rate: 5e-2,
        num_iters: 150,
        batch_size: 64,
        print_every: 50,
        kernel: KernelConfig::Gaussian { sigmas: vec![2.0] },
        divergence: DivergenceConfig {
            unbiased,
            ..Default::default()
        },
        show_progress: false,
        ..Default::default()
    }
}

fn column_mean(x: &Tensor) -> anyhow::Result<Vec<f32>> {
    Ok(x.mean(0)?.to_vec1::<f32>()?)
}

#[test]
fn flow_moves_particles_towards_a_shifted_target() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let target = Tensor::rnorm_seeded(64, 2, 3.0, 1)?;
    let init = Tensor::rnorm_seeded(64, 2, 0.0, 2)?;

    let mut flow = ParticleFlow::new(&init, flow_config(Unbiased::None))?;
    let trace = flow.train(&target)?;

    assert_eq!(trace.losses.len(), 150);
    assert_eq!(trace.skipped, 0);

    let first = trace.losses[0];
    let last = trace.losses[trace.losses.len() - 1];
    assert!(last < first, "divergence went from {} to {}", first, last);

    let mean = column_mean(flow.particles())?;
    for m in mean {
        assert!(m > 1.5, "particle mean {} did not move", m);
    }
    Ok(())
}

#[test]
fn flow_with_unbiased_loss_runs_on_minibatches() -> anyhow::Result<()> {
    let target = Tensor::rnorm_seeded(80, 2, 2.0, 3)?;
    let init = Tensor::rnorm_seeded(50, 2, 0.0, 4)?;

    let mut config = flow_config(Unbiased::Algo);
    config.batch_size = 31;
    config.num_iters = 20;

    let mut flow = ParticleFlow::new(&init, config)?;
    let trace = flow.train(&target)?;

    assert_eq!(trace.losses.len(), 20);
    assert_eq!(flow.particles().dims(), &[50, 2]);
    Ok(())
}

#[test]
fn flow_follows_schedules_and_keeps_dtype() -> anyhow::Result<()> {
    let target = Tensor::rnorm_seeded(32, 3, 1.0, 5)?.to_dtype(DType::F64)?;
    let init = Tensor::rnorm_seeded(32, 3, 0.0, 6)?.to_dtype(DType::F64)?;

    let config = FlowConfig {
        num_iters: 10,
        alpha_schedule: Some(LinearDecay::new(0, 5, 2.0, 0.5)),
        sigma: Some(LinearDecay::new(0, 5, 4.0, 1.0)),
        ..flow_config(Unbiased::Eq)
    };

    let mut flow = ParticleFlow::new(&init, config)?;
    // an f32 target is converted to the particles' dtype
    flow.train(&target.to_dtype(DType::F32)?)?;
    assert_eq!(flow.dtype(), DType::F64);
    assert!(flow.device().is_cpu());
    Ok(())
}

#[test]
fn flow_rejects_mismatched_features() -> anyhow::Result<()> {
    let target = Tensor::zeros((10, 3), DType::F32, &Device::Cpu)?;
    let init = Tensor::zeros((10, 2), DType::F32, &Device::Cpu)?;
    let mut flow = ParticleFlow::new(&init, flow_config(Unbiased::None))?;
    assert!(flow.train(&target).is_err());
    Ok(())
}

#[test]
fn learned_weights_move_mass_to_particles_near_the_target() -> anyhow::Result<()> {
    let target = Tensor::rnorm_seeded(60, 2, 3.0, 7)?;
    let near = Tensor::rnorm_seeded(10, 2, 3.0, 8)?;
    let far = Tensor::rnorm_seeded(10, 2, -3.0, 9)?;
    let init = Tensor::cat(&[&near, &far], 0)?;

    let config = FlowConfig {
        num_iters: 60,
        learn_weights: true,
        divergence: DivergenceConfig {
            alpha: 1.0,
            ..Default::default()
        },
        ..flow_config(Unbiased::None)
    };

    let mut flow = ParticleFlow::new(&init, config)?;
    let trace = flow.train(&target)?;
    assert!(trace.losses[trace.losses.len() - 1] < trace.losses[0]);

    let w = flow.weights()?.to_vec2::<f32>()?.remove(0);
    assert_eq!(w.len(), 20);
    approx::assert_abs_diff_eq!(w.iter().sum::<f32>(), 1.0, epsilon = 1e-5);

    let near_mass: f32 = w[..10].iter().sum();
    assert!(near_mass > 0.6, "near particles hold {} of the mass", near_mass);
    Ok(())
}
