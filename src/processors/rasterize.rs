//! Dense array construction from aligned samples.

use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayD, ArrayView2, IxDyn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::alignment::AlignmentMap;
use super::stats::{mean, median_in_place};
use crate::error::{HypertableError, Result};

/// How samples sharing a grid cell are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SquashMetric {
    #[default]
    Mean,
    Sum,
    Median,
}

impl SquashMetric {
    /// Combines finite values; NaN when there are none.
    pub fn combine(self, values: &mut [f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        match self {
            SquashMetric::Mean => mean(values),
            SquashMetric::Sum => values.iter().sum(),
            SquashMetric::Median => median_in_place(values),
        }
    }
}

impl fmt::Display for SquashMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SquashMetric::Mean => "mean",
            SquashMetric::Sum => "sum",
            SquashMetric::Median => "median",
        };
        f.write_str(name)
    }
}

impl FromStr for SquashMetric {
    type Err = HypertableError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(SquashMetric::Mean),
            "sum" => Ok(SquashMetric::Sum),
            "median" => Ok(SquashMetric::Median),
            other => Err(HypertableError::InvalidInput(format!(
                "unknown squash metric '{}' (expected mean, sum or median)",
                other
            ))),
        }
    }
}

/// Fills one output row from the samples of a cell.
fn fill_cell(out: &mut [f64], samples: &[usize], data: ArrayView2<f64>, metric: SquashMetric) {
    match samples {
        [] => out.fill(f64::NAN),
        [single] => {
            for (o, v) in out.iter_mut().zip(data.row(*single).iter()) {
                *o = *v;
            }
        }
        many => {
            let mut column = Vec::with_capacity(many.len());
            for (col, o) in out.iter_mut().enumerate() {
                column.clear();
                column.extend(
                    many.iter()
                        .map(|&s| data[[s, col]])
                        .filter(|v| !v.is_nan()),
                );
                *o = metric.combine(&mut column);
            }
        }
    }
}

/// Builds the dense array of shape `(n0, …, n_{N-1}, M)` for `data`.
///
/// `data` has one row per sample (the same samples the alignment map was
/// built from) and `M` columns. Cells without samples are NaN; cells with
/// several samples combine them column-wise with `metric`, ignoring NaN.
pub fn rasterize(
    data: ArrayView2<f64>,
    map: &AlignmentMap,
    shape: &[usize],
    metric: SquashMetric,
) -> Result<ArrayD<f64>> {
    if data.nrows() != map.num_samples() {
        return Err(HypertableError::DataShapeMismatch {
            expected: map.num_samples(),
            found: data.nrows(),
        });
    }
    let cells: usize = shape.iter().product();
    if cells != map.len() {
        return Err(HypertableError::InvalidInput(format!(
            "shape {:?} has {} cells but the alignment map has {}",
            shape,
            cells,
            map.len()
        )));
    }

    let m = data.ncols();
    let mut values = vec![f64::NAN; cells * m];
    if m > 0 {
        values
            .par_chunks_mut(m)
            .zip(map.cells().par_iter())
            .for_each(|(out, samples)| fill_cell(out, samples, data, metric));
    }

    let mut full_shape = shape.to_vec();
    full_shape.push(m);
    Ok(ArrayD::from_shape_vec(IxDyn(&full_shape), values)?)
}
