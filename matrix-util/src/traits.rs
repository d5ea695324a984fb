use crate::common_io::Delimiter;
use candle_core::{Device, Tensor};

/// Reading off from `Tensor`
pub trait ConvertMatOps {
    type Mat;
    type Scalar;

    fn from_tensor(_: &Tensor) -> anyhow::Result<Self::Mat>;
    fn to_tensor(&self, dev: &Device) -> anyhow::Result<Tensor>;
}

/// Operations to sample random point clouds, for `ndarray::Array2`
/// and `candle_core::Tensor`
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// Sample a matrix from a uniform distribution `U(0,1)`
    fn runif(nrow: usize, ncol: usize) -> anyhow::Result<Self::Mat>;

    /// Sample a matrix from a normal distribution `N(0,1)`
    fn rnorm(nrow: usize, ncol: usize) -> anyhow::Result<Self::Mat>;

    /// Sample a reproducible matrix from `N(mean, 1)` with a fixed seed
    fn rnorm_seeded(
        nrow: usize,
        ncol: usize,
        mean: Self::Scalar,
        seed: u64,
    ) -> anyhow::Result<Self::Mat>;
}

/// Read and write matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    fn read_file_delim(
        file: &str,
        delim: impl Into<Delimiter>,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat>;

    fn from_tsv(tsv_file: &str, skip: Option<usize>) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(tsv_file, "\t", skip)
    }

    fn from_csv(csv_file: &str, skip: Option<usize>) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(csv_file, ",", skip)
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }

    fn to_csv(&self, csv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(csv_file, ",")
    }
}
