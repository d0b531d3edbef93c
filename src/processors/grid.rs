//! Raster grid construction from per-axis linspaces.

use ndarray::{Array2, ArrayView1, ArrayView2};

use super::linspace::Linspace;
use super::rotation::grid_volume;
use crate::error::{HypertableError, Result};

/// Every cell position of a regular grid, in row-major order.
///
/// Axis 0 varies slowest and the last axis fastest, matching the layout of
/// an `ndarray` of shape `(n0, n1, …)` in standard order.
#[derive(Debug, Clone)]
pub struct RasterGrid {
    axes: Vec<Vec<f64>>,
    shape: Vec<usize>,
    strides: Vec<usize>,
    points: Array2<f64>,
}

impl RasterGrid {
    /// Number of axes.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Ascending positions along one axis.
    #[inline]
    pub fn axis_positions(&self, axis: usize) -> &[f64] {
        &self.axes[axis]
    }

    /// The materialized grid, one row per cell.
    #[inline]
    pub fn points(&self) -> ArrayView2<'_, f64> {
        self.points.view()
    }

    /// Position of one cell.
    #[inline]
    pub fn cell_position(&self, cell: usize) -> ArrayView1<'_, f64> {
        self.points.row(cell)
    }

    /// Flat cell index of per-axis indices, `None` when out of range.
    pub fn cell_index(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.ndim() {
            return None;
        }
        let mut cell = 0;
        for ((&idx, &n), &stride) in indices.iter().zip(&self.shape).zip(&self.strides) {
            if idx >= n {
                return None;
            }
            cell += idx * stride;
        }
        Some(cell)
    }

    /// Per-axis indices of a flat cell index.
    pub fn cell_indices(&self, cell: usize) -> Vec<usize> {
        self.shape
            .iter()
            .zip(&self.strides)
            .map(|(&n, &stride)| (cell / stride) % n)
            .collect()
    }
}

/// Row-major strides for `shape`.
fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for k in (0..shape.len().saturating_sub(1)).rev() {
        strides[k] = strides[k + 1] * shape[k + 1];
    }
    strides
}

/// Materializes the Cartesian product of the per-axis linspaces.
///
/// The cell count is checked against `max_cells` before anything is
/// allocated.
pub fn build_raster_grid(linspaces: &[Linspace], max_cells: usize) -> Result<RasterGrid> {
    if linspaces.is_empty() {
        return Err(HypertableError::InvalidInput(
            "at least one linspace is required".to_string(),
        ));
    }

    let cells = grid_volume(linspaces);
    if cells > max_cells as u128 {
        return Err(HypertableError::OversizedGrid {
            cells,
            limit: max_cells,
        });
    }

    let axes: Vec<Vec<f64>> = linspaces.iter().map(Linspace::positions).collect();
    let shape: Vec<usize> = axes.iter().map(Vec::len).collect();
    let strides = row_major_strides(&shape);
    let ndim = shape.len();

    let points = Array2::from_shape_fn((cells as usize, ndim), |(cell, k)| {
        axes[k][(cell / strides[k]) % shape[k]]
    });

    Ok(RasterGrid {
        axes,
        shape,
        strides,
        points,
    })
}
