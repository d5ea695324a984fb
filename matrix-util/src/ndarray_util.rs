use crate::traits::*;
use candle_core::{DType, Device, Tensor};
use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, StandardNormal};

impl ConvertMatOps for Array2<f64> {
    type Mat = Self;
    type Scalar = f64;

    fn from_tensor(tensor: &Tensor) -> anyhow::Result<Self::Mat> {
        let (nrow, ncol) = tensor.dims2()?;
        let data = tensor
            .to_dtype(DType::F64)?
            .flatten_all()?
            .to_vec1::<f64>()?;
        Ok(Array2::from_shape_vec((nrow, ncol), data)?)
    }

    fn to_tensor(&self, dev: &Device) -> anyhow::Result<Tensor> {
        let (nrow, ncol) = self.dim();
        let data = self.iter().copied().collect::<Vec<f64>>();
        Ok(Tensor::from_vec(data, (nrow, ncol), dev)?)
    }
}

impl SampleOps for Array2<f64> {
    type Mat = Self;
    type Scalar = f64;

    fn runif(nrow: usize, ncol: usize) -> anyhow::Result<Self::Mat> {
        let mut rng = rand::rng();
        Ok(Array2::from_shape_simple_fn((nrow, ncol), || {
            rng.random::<f64>()
        }))
    }

    fn rnorm(nrow: usize, ncol: usize) -> anyhow::Result<Self::Mat> {
        let mut rng = rand::rng();
        Ok(Array2::from_shape_simple_fn((nrow, ncol), || {
            StandardNormal.sample(&mut rng)
        }))
    }

    fn rnorm_seeded(
        nrow: usize,
        ncol: usize,
        mean: Self::Scalar,
        seed: u64,
    ) -> anyhow::Result<Self::Mat> {
        let pdf = Normal::new(mean, 1_f64)?;
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(Array2::from_shape_simple_fn((nrow, ncol), || {
            pdf.sample(&mut rng)
        }))
    }
}
