use crate::common_io::{read_lines_of_types, write_lines, Delimiter};
use crate::traits::IoOps;
use candle_core::{DType, Device, Tensor};

impl IoOps for Tensor {
    type Scalar = f64;
    type Mat = Self;

    /// Read a point set (rows = samples) into an `f64` tensor on CPU;
    /// callers cast to the working precision
    fn read_file_delim(
        file: &str,
        delim: impl Into<Delimiter>,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat> {
        let hdr_line = match skip {
            Some(skip) => skip as i64,
            None => -1, // no skipping
        };

        let data = read_lines_of_types::<f64>(file, delim, hdr_line)?.lines;

        if data.is_empty() {
            return Err(anyhow::anyhow!("No data in file {}", file));
        }

        let ncols = data[0].len();
        let nrows = data.len();

        if let Some((i, row)) = data.iter().enumerate().find(|(_, r)| r.len() != ncols) {
            return Err(anyhow::anyhow!(
                "{}: row {} has {} columns, expected {}",
                file,
                i + 1,
                row.len(),
                ncols
            ));
        }

        let data = data.into_iter().flatten().collect::<Vec<_>>();

        Ok(Tensor::from_vec(data, (nrows, ncols), &Device::Cpu)?)
    }

    /// Write a 2D tensor of any float dtype, one row per line
    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()> {
        let (nrows, _) = self.dims2()?;

        let rows: Vec<Vec<f64>> = self.to_dtype(DType::F64)?.to_vec2()?;

        let lines: Vec<Box<str>> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|x| format!("{}", x))
                    .collect::<Vec<_>>()
                    .join(delim)
                    .into_boxed_str()
            })
            .collect();

        debug_assert_eq!(lines.len(), nrows);
        write_lines(&lines, file)?;

        Ok(())
    }
}
