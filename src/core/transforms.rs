//! Coordinate transformations shared by geometry inference and rasterization.
//!
//! Rotations are expressed as one plane angle per unordered axis pair,
//! enumerated `(0,1), (0,2), …, (1,2), …` (outer index ascending). Coordinates
//! are row vectors; each plane rotation is applied by right-multiplication
//! about a pivot point, in pair order.

use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Number of plane rotations in `ndim` dimensions.
#[inline]
pub fn rotation_count(ndim: usize) -> usize {
    ndim * ndim.saturating_sub(1) / 2
}

/// Unordered axis pairs `(i, j)` with `i < j`, outer index ascending.
pub fn axis_pairs(ndim: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(rotation_count(ndim));
    for i in 0..ndim {
        for j in (i + 1)..ndim {
            pairs.push((i, j));
        }
    }
    pairs
}

/// Rotation matrix of a single `(i, j)` plane.
pub fn plane_rotation(ndim: usize, i: usize, j: usize, angle: f64) -> Array2<f64> {
    let mut matrix = Array2::eye(ndim);
    let (sin, cos) = angle.sin_cos();
    matrix[[i, i]] = cos;
    matrix[[j, j]] = cos;
    matrix[[i, j]] = -sin;
    matrix[[j, i]] = sin;
    matrix
}

/// Composite matrix of all plane rotations applied in pair order.
pub fn rotation_matrix(ndim: usize, rotations: &[f64]) -> Array2<f64> {
    debug_assert_eq!(
        rotations.len(),
        rotation_count(ndim),
        "one angle per axis pair is required"
    );

    axis_pairs(ndim)
        .into_iter()
        .zip(rotations.iter())
        .fold(Array2::eye(ndim), |acc, ((i, j), &angle)| {
            acc.dot(&plane_rotation(ndim, i, j, angle))
        })
}

/// Rotates every row of `coords` about `origin`.
///
/// Rows containing NaN stay NaN; other rows are unaffected by them.
pub fn rotate_coordinates(coords: ArrayView2<f64>, rotations: &[f64], origin: &[f64]) -> Array2<f64> {
    let matrix = rotation_matrix(coords.ncols(), rotations);
    apply_about(coords, &matrix, origin)
}

/// Inverse of [`rotate_coordinates`] for the same angles and origin.
pub fn unrotate_coordinates(coords: ArrayView2<f64>, rotations: &[f64], origin: &[f64]) -> Array2<f64> {
    let matrix = rotation_matrix(coords.ncols(), rotations);
    apply_about(coords, &matrix.t().to_owned(), origin)
}

fn apply_about(coords: ArrayView2<f64>, matrix: &Array2<f64>, origin: &[f64]) -> Array2<f64> {
    let origin = Array1::from(origin.to_vec());
    let centered = &coords - &origin;
    centered.dot(matrix) + &origin
}

/// Indices of rows whose components are all finite.
pub fn finite_rows(coords: ArrayView2<f64>) -> Vec<usize> {
    coords
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().all(|v| v.is_finite()))
        .map(|(i, _)| i)
        .collect()
}

/// Per-column mean over rows whose components are all finite.
///
/// Returns NaN for every column when no row is finite.
pub fn finite_mean(coords: ArrayView2<f64>) -> Vec<f64> {
    let rows = finite_rows(coords);
    let mut sums = vec![0.0; coords.ncols()];
    for &r in &rows {
        for (sum, v) in sums.iter_mut().zip(coords.row(r).iter()) {
            *sum += v;
        }
    }
    let n = rows.len() as f64;
    sums.into_iter().map(|s| s / n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_axis_pairs_order() {
        assert!(axis_pairs(1).is_empty());
        assert_eq!(axis_pairs(3), vec![(0, 1), (0, 2), (1, 2)]);
        assert_eq!(rotation_count(4), 6);
    }

    #[test]
    fn test_quarter_turn_row_convention() {
        let coords = array![[1.0, 0.0], [0.0, 1.0]];
        let rotated = rotate_coordinates(coords.view(), &[FRAC_PI_2], &[0.0, 0.0]);

        // Row vectors times [[c, -s], [s, c]] turn clockwise.
        assert_relative_eq!(rotated[[0, 0]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(rotated[[0, 1]], -1.0, epsilon = 1e-12);
        assert_relative_eq!(rotated[[1, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(rotated[[1, 1]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_about_origin_round_trips() {
        let coords = array![[1.0, 2.0, 3.0], [4.0, -1.0, 0.5], [0.0, 0.0, 7.0]];
        let rotations = [0.3, -0.2, 1.1];
        let origin = finite_mean(coords.view());

        let rotated = rotate_coordinates(coords.view(), &rotations, &origin);
        let back = unrotate_coordinates(rotated.view(), &rotations, &origin);

        for (a, b) in coords.iter().zip(back.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rotation_preserves_mean() {
        let coords = array![[0.0, 0.0], [2.0, 0.0], [2.0, 4.0]];
        let origin = finite_mean(coords.view());
        let rotated = rotate_coordinates(coords.view(), &[0.7], &origin);
        let after = finite_mean(rotated.view());
        assert_relative_eq!(after[0], origin[0], epsilon = 1e-12);
        assert_relative_eq!(after[1], origin[1], epsilon = 1e-12);
    }

    #[test]
    fn test_nan_rows_are_excluded_from_mean() {
        let coords = array![[1.0, 1.0], [f64::NAN, 5.0], [3.0, 3.0]];
        assert_eq!(finite_rows(coords.view()), vec![0, 2]);
        assert_eq!(finite_mean(coords.view()), vec![2.0, 2.0]);

        let rotated = rotate_coordinates(coords.view(), &[0.4], &[2.0, 2.0]);
        assert!(rotated.row(1).iter().all(|v| v.is_nan()));
        assert!(rotated.row(0).iter().all(|v| v.is_finite()));
    }
}
