//! Snapping aligned sample coordinates onto raster grid cells.
//!
//! Each grid cell owns an axis-aligned tolerance box. A sample belongs to the
//! cell whose box contains it on every axis. Because the boxes are
//! axis-aligned the containment test separates per axis, so a sample is
//! located with one binary search per axis instead of a scan over all cells.
//!
//! A sample that lands in no box, or in several, is an error: it means the
//! inferred geometry or the tolerance does not fit the data, and silently
//! dropping or merging it would hide that.

use ndarray::ArrayView2;
use rayon::prelude::*;

use super::grid::RasterGrid;
use super::linspace::Linspace;
use crate::error::{HypertableError, Result};

/// Sample indices per grid cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentMap {
    cells: Vec<Vec<usize>>,
    skipped: Vec<usize>,
    samples: usize,
}

impl AlignmentMap {
    /// Sample lists indexed by flat cell index, each in ascending order.
    #[inline]
    pub fn cells(&self) -> &[Vec<usize>] {
        &self.cells
    }

    /// Samples of one cell.
    #[inline]
    pub fn get(&self, cell: usize) -> &[usize] {
        &self.cells[cell]
    }

    /// Number of grid cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of input samples, including skipped ones.
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.samples
    }

    /// Samples left out because a coordinate was not finite.
    #[inline]
    pub fn skipped(&self) -> &[usize] {
        &self.skipped
    }

    /// Cells that received no sample.
    pub fn missing_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_empty()).count()
    }

    /// Cells that received more than one sample.
    pub fn shared_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.len() > 1).count()
    }

    /// Cell of every sample, `None` for skipped samples.
    pub fn sample_cells(&self) -> Vec<Option<usize>> {
        let mut owners = vec![None; self.samples];
        for (cell, samples) in self.cells.iter().enumerate() {
            for &s in samples {
                owners[s] = Some(cell);
            }
        }
        owners
    }
}

/// Half-width of each axis' tolerance box.
///
/// For an axis with several cells this is `fraction` of half the step. A
/// single-cell axis accepts its whole extent, with a small floor so rounding
/// noise on a constant axis still matches.
pub fn alignment_tolerances(linspaces: &[Linspace], fraction: f64) -> Vec<f64> {
    linspaces
        .iter()
        .map(|ls| match ls.step() {
            Some(step) => 0.5 * step.abs() * fraction,
            None => (0.5 * ls.extent().abs()).max(1e-9 * (1.0 + ls.center().abs())),
        })
        .collect()
}

/// First position inside `[value - tol, value + tol]` and how many follow.
fn axis_matches(positions: &[f64], value: f64, tol: f64) -> (usize, usize) {
    let first = positions.partition_point(|&p| p < value - tol);
    let count = positions[first..]
        .iter()
        .take_while(|&&p| p <= value + tol)
        .count();
    (first, count)
}

/// Locates the cell of one sample.
fn locate(grid: &RasterGrid, sample: usize, coord: &[f64], tolerances: &[f64]) -> Result<usize> {
    let mut indices = Vec::with_capacity(coord.len());
    let mut matches: usize = 1;
    for (axis, (&value, &tol)) in coord.iter().zip(tolerances).enumerate() {
        let (first, count) = axis_matches(grid.axis_positions(axis), value, tol);
        matches = matches.saturating_mul(count);
        indices.push(first);
    }

    if matches != 1 {
        return Err(HypertableError::AlignmentMismatch { sample, matches });
    }
    grid.cell_index(&indices)
        .ok_or(HypertableError::AlignmentMismatch { sample, matches: 0 })
}

/// Maps every finite sample coordinate to exactly one grid cell.
///
/// `coords` must already be rotated into the grid frame. The first sample
/// (lowest index) that matches zero or several cells is reported.
pub fn align_coordinates(
    grid: &RasterGrid,
    coords: ArrayView2<f64>,
    tolerances: &[f64],
) -> Result<AlignmentMap> {
    if coords.ncols() != grid.ndim() || tolerances.len() != grid.ndim() {
        return Err(HypertableError::InvalidInput(format!(
            "coordinates have {} axes, grid has {}, tolerances {}",
            coords.ncols(),
            grid.ndim(),
            tolerances.len()
        )));
    }

    let located: Vec<Result<Option<usize>>> = (0..coords.nrows())
        .into_par_iter()
        .map(|sample| {
            let coord = coords.row(sample).to_vec();
            if coord.iter().any(|v| !v.is_finite()) {
                return Ok(None);
            }
            locate(grid, sample, &coord, tolerances).map(Some)
        })
        .collect();

    let mut cells = vec![Vec::new(); grid.len()];
    let mut skipped = Vec::new();
    for (sample, result) in located.into_iter().enumerate() {
        match result? {
            Some(cell) => cells[cell].push(sample),
            None => skipped.push(sample),
        }
    }

    if !skipped.is_empty() {
        log::warn!(
            "{} sample(s) with non-finite coordinates left out of the grid",
            skipped.len()
        );
    }

    Ok(AlignmentMap {
        cells,
        skipped,
        samples: coords.nrows(),
    })
}
