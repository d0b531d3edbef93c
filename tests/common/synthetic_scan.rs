//! Synthetic raster scans for integration tests.

use hypergrid::core::transforms::{finite_mean, rotate_coordinates};
use hypergrid::{AxisKey, DataTable};
use ndarray::Array2;

/// Cell positions of a regular grid, row-major (last axis fastest).
pub fn grid_coordinates(shape: &[usize], steps: &[f64], start: &[f64]) -> Array2<f64> {
    let cells: usize = shape.iter().product();
    let ndim = shape.len();
    let mut coords = Array2::zeros((cells, ndim));
    for cell in 0..cells {
        let mut rest = cell;
        for axis in (0..ndim).rev() {
            let idx = rest % shape[axis];
            rest /= shape[axis];
            coords[[cell, axis]] = start[axis] + idx as f64 * steps[axis];
        }
    }
    coords
}

/// Per-axis indices of every row of `grid_coordinates(shape, …)`.
pub fn grid_indices(shape: &[usize]) -> Vec<Vec<usize>> {
    let cells: usize = shape.iter().product();
    (0..cells)
        .map(|cell| {
            let mut rest = cell;
            let mut idx = vec![0; shape.len()];
            for axis in (0..shape.len()).rev() {
                idx[axis] = rest % shape[axis];
                rest /= shape[axis];
            }
            idx
        })
        .collect()
}

/// Rotates a scan about its own mean.
pub fn rotate_scan(coords: &Array2<f64>, angles: &[f64]) -> Array2<f64> {
    let origin = finite_mean(coords.view());
    rotate_coordinates(coords.view(), angles, &origin)
}

/// Adds deterministic stage noise, uniform within `±amplitude[axis]`.
pub fn jitter(coords: &Array2<f64>, amplitude: &[f64]) -> Array2<f64> {
    let mut noisy = coords.clone();
    for ((r, axis), v) in noisy.indexed_iter_mut() {
        let phase = r as f64 * 12.9898 + axis as f64 * 78.233;
        let unit = (phase.sin() * 43758.5453).fract();
        *v += unit * amplitude[axis];
    }
    noisy
}

/// Deterministic shuffle (multiplicative stride permutation).
pub fn shuffled_order(n: usize) -> Vec<usize> {
    let stride = (1..n).rev().find(|s| gcd(*s, n) == 1 && *s > n / 3).unwrap_or(1);
    (0..n).map(|i| (i * stride + 3) % n).collect()
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Builds a table from coordinate columns and value columns, rows taken in `order`.
pub fn scan_table(
    axis_names: &[&str],
    coords: &Array2<f64>,
    value_names: &[&str],
    values: &Array2<f64>,
    order: &[usize],
) -> DataTable {
    let mut columns = Vec::new();
    for (k, name) in axis_names.iter().enumerate() {
        columns.push((
            AxisKey::from(*name),
            order.iter().map(|&r| coords[[r, k]]).collect(),
        ));
    }
    for (k, name) in value_names.iter().enumerate() {
        columns.push((
            AxisKey::from(*name),
            order.iter().map(|&r| values[[r, k]]).collect(),
        ));
    }

    let coordinate_keys: Vec<AxisKey> = axis_names.iter().map(|n| AxisKey::from(*n)).collect();
    DataTable::new(columns)
        .expect("valid synthetic table")
        .without_data_columns(&coordinate_keys)
}

/// NaN-aware elementwise equality.
pub fn same_values<'a, I>(a: I, b: I) -> bool
where
    I: IntoIterator<Item = &'a f64>,
{
    a.into_iter()
        .zip(b)
        .all(|(x, y)| (x.is_nan() && y.is_nan()) || x == y)
}
