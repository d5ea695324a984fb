use crate::traits::*;
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

impl SampleOps for Tensor {
    type Mat = Self;
    type Scalar = f32;

    fn runif(nrow: usize, ncol: usize) -> anyhow::Result<Self::Mat> {
        Ok(Tensor::rand(0_f32, 1_f32, (nrow, ncol), &Device::Cpu)?)
    }

    fn rnorm(nrow: usize, ncol: usize) -> anyhow::Result<Self::Mat> {
        Ok(Tensor::randn(0_f32, 1_f32, (nrow, ncol), &Device::Cpu)?)
    }

    fn rnorm_seeded(
        nrow: usize,
        ncol: usize,
        mean: Self::Scalar,
        seed: u64,
    ) -> anyhow::Result<Self::Mat> {
        let pdf = Normal::new(mean, 1_f32)?;
        let mut rng = StdRng::seed_from_u64(seed);

        let data_vec: Vec<f32> = (0..(nrow * ncol)).map(|_| pdf.sample(&mut rng)).collect();

        Ok(Tensor::from_vec(data_vec, (nrow, ncol), &Device::Cpu)?)
    }
}
