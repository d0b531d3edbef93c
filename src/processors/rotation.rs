//! Rotation inference for scanned sample grids.
//!
//! A raster scan stored in a rotated stage frame has no axis-parallel
//! spacing. This module estimates the plane rotations that bring it back:
//!
//! 1. **Neighbour query**: `kiddo` KD-tree over the distinct sample
//!    positions, the few nearest distinct neighbours per sample (parallel,
//!    rayon)
//! 2. **Step proxy**: per-axis median of the absolute offsets to the nearest
//!    neighbour
//! 3. **Plane angles**: per axis pair, the median direction of the nearest
//!    neighbour offset lying mostly inside that plane
//! 4. **Candidates**: per axis pair, zero, the plane angle, `-atan2(s_i, s_j)`
//!    and `-atan2(s_j, s_i)`, each reduced by quarter turns into
//!    `[-π/4, π/4]` and collapsed when equal
//! 5. **Scoring**: every combination is applied about the coordinate mean and
//!    scored by the product of per-axis linspace counts (parallel, rayon);
//!    a combination whose linspaces cannot be estimated is skipped
//! 6. **Selection**: smallest grid volume, earliest candidate on ties
//!
//! # Recoverable rotations
//!
//! Reducing every candidate by quarter turns keeps the grid axes attached to
//! their own keys: a lattice turned by less than π/4 is never read back as a
//! permuted grid. Rotations confined to one axis plane, or to planes that
//! share no axis, are recovered exactly on noise-free scans in any supported
//! dimension. A composite of turns in planes sharing an axis is only
//! approximated, since each plane is measured independently. Turns of exactly
//! π/4 are ambiguous on a square lattice.
//!
//! # Complexity
//!
//! The candidate set is the Cartesian product over axis pairs, at most four
//! options per pair and usually two or three. That is up to `4^(N(N-1)/2)`
//! combinations, which is why the dimension count is capped at
//! [`MAX_DIMENSIONS`].

use std::f64::consts::FRAC_PI_2;
use std::num::NonZeroUsize;

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

use super::linspace::{estimate_linspace, Linspace};
use super::stats::median_in_place;
use crate::core::cancel::CancelToken;
use crate::core::transforms::{axis_pairs, finite_mean, finite_rows, rotate_coordinates};
use crate::error::{HypertableError, Result};

/// Largest supported number of coordinate axes.
pub const MAX_DIMENSIONS: usize = 4;

/// Two candidate angles closer than this collapse; smaller angles snap to zero.
const ANGLE_EPSILON: f64 = 1e-8;

/// Neighbours fetched per sample, per axis.
const NEIGHBOURS_PER_AXIS: usize = 4;

/// Share of an offset's squared length that must lie inside a plane for the
/// offset to measure that plane's angle.
const IN_PLANE_FRACTION: f64 = 0.5;

/// Outcome of the rotation search.
#[derive(Debug, Clone)]
pub struct RotationEstimate {
    /// Angles that rotate the sample coordinates into the grid frame.
    pub alignment: Vec<f64>,
    /// Per-axis linspaces of the aligned coordinates.
    pub linspaces: Vec<Linspace>,
    /// Rotation pivot: mean of the finite coordinates.
    pub origin: Vec<f64>,
    /// Product of the per-axis counts.
    pub volume: u128,
    /// Number of rotation candidates scored.
    pub candidates: usize,
}

/// Product of the per-axis counts, saturating instead of overflowing.
pub fn grid_volume(linspaces: &[Linspace]) -> u128 {
    linspaces
        .iter()
        .fold(1u128, |acc, ls| acc.saturating_mul(ls.count as u128))
}

/// Reduces `angle` by whole quarter turns into `[-π/4, π/4]`, snapping
/// values within [`ANGLE_EPSILON`] of zero to exactly zero.
pub fn reduce_quarter_turn(angle: f64) -> f64 {
    let reduced = angle - FRAC_PI_2 * (angle / FRAC_PI_2).round();
    if reduced.abs() <= ANGLE_EPSILON {
        0.0
    } else {
        reduced
    }
}

macro_rules! neighbour_offsets_k {
    ($points:expr, $k:literal) => {{
        let points: Vec<[f64; $k]> = $points
            .iter()
            .map(|p| {
                let mut arr = [0.0f64; $k];
                arr.copy_from_slice(p);
                arr
            })
            .collect();

        let tree: ImmutableKdTree<f64, $k> = ImmutableKdTree::new_from_slice(&points);
        let qty = NonZeroUsize::MIN.saturating_add(NEIGHBOURS_PER_AXIS * $k);

        points
            .par_iter()
            .map(|query| {
                // The query point itself comes back at distance zero.
                tree.nearest_n::<SquaredEuclidean>(query, qty)
                    .into_iter()
                    .filter(|nn| nn.distance > 0.0)
                    .map(|nn| {
                        let other = &points[nn.item as usize];
                        query
                            .iter()
                            .zip(other.iter())
                            .map(|(a, b)| a - b)
                            .collect::<Vec<f64>>()
                    })
                    .collect::<Vec<Vec<f64>>>()
            })
            .collect::<Vec<Vec<Vec<f64>>>>()
    }};
}

/// Signed offsets from each sample to its nearest distinct neighbours.
///
/// Duplicate positions are collapsed before the query so that a repeated
/// sample never counts as its own neighbour, but every sample still reports
/// the offsets of its position.
#[derive(Debug, Clone)]
pub struct NeighbourOffsets {
    ndim: usize,
    /// Offsets per distinct position, nearest first.
    per_position: Vec<Vec<Vec<f64>>>,
    /// Distinct position of every sample.
    owner: Vec<usize>,
}

impl NeighbourOffsets {
    pub fn query(coords: ArrayView2<f64>) -> Result<Self> {
        let ndim = coords.ncols();
        let rows: Vec<Vec<f64>> = coords.axis_iter(Axis(0)).map(|r| r.to_vec()).collect();

        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| {
            rows[a]
                .iter()
                .zip(rows[b].iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut distinct: Vec<Vec<f64>> = Vec::new();
        let mut owner = vec![0usize; rows.len()];
        for &i in &order {
            if distinct.last() != Some(&rows[i]) {
                distinct.push(rows[i].clone());
            }
            owner[i] = distinct.len() - 1;
        }

        let per_position = if distinct.len() < 2 {
            vec![Vec::new(); distinct.len()]
        } else {
            match ndim {
                1 => neighbour_offsets_k!(distinct, 1),
                2 => neighbour_offsets_k!(distinct, 2),
                3 => neighbour_offsets_k!(distinct, 3),
                4 => neighbour_offsets_k!(distinct, 4),
                _ => {
                    return Err(HypertableError::TooManyDimensions {
                        found: ndim,
                        max: MAX_DIMENSIONS,
                    })
                }
            }
        };

        Ok(Self {
            ndim,
            per_position,
            owner,
        })
    }

    /// Neighbour offsets of every sample, in sample order.
    pub fn per_sample(&self) -> impl Iterator<Item = &[Vec<f64>]> + '_ {
        self.owner.iter().map(|&d| self.per_position[d].as_slice())
    }

    /// Robust per-axis step proxy in the current (possibly rotated) frame:
    /// the median absolute offset to the nearest neighbour.
    pub fn steps(&self) -> Vec<f64> {
        let mut per_axis: Vec<Vec<f64>> = vec![Vec::with_capacity(self.owner.len()); self.ndim];
        for nearest in self.per_sample().filter_map(|offsets| offsets.first()) {
            for (axis, v) in nearest.iter().enumerate() {
                per_axis[axis].push(v.abs());
            }
        }
        per_axis.iter_mut().map(|values| finite_or_zero(median_in_place(values))).collect()
    }

    /// Lattice direction per axis pair, reduced into `[-π/4, π/4]`.
    ///
    /// Each sample contributes the angle of its nearest neighbour offset that
    /// lies mostly inside the plane; `None` when no sample has one.
    pub fn plane_angles(&self) -> Vec<Option<f64>> {
        axis_pairs(self.ndim)
            .into_iter()
            .map(|(i, j)| {
                let mut angles: Vec<f64> = self
                    .per_sample()
                    .filter_map(|offsets| {
                        offsets.iter().find_map(|d| {
                            let in_plane = d[i] * d[i] + d[j] * d[j];
                            let total: f64 = d.iter().map(|v| v * v).sum();
                            (in_plane > 0.0 && in_plane >= IN_PLANE_FRACTION * total)
                                .then(|| reduce_quarter_turn(d[j].atan2(d[i])))
                        })
                    })
                    .collect();
                let m = median_in_place(&mut angles);
                m.is_finite().then_some(m)
            })
            .collect()
    }
}

#[inline]
fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Per-axis step proxy of `coords`; see [`NeighbourOffsets::steps`].
pub fn neighbour_steps(coords: ArrayView2<f64>) -> Result<Vec<f64>> {
    Ok(NeighbourOffsets::query(coords)?.steps())
}

/// Candidate angles per axis pair, in pair enumeration order.
///
/// `plane_angles` holds the measured direction per pair, if any.
pub fn pair_candidates(steps: &[f64], plane_angles: &[Option<f64>]) -> Vec<Vec<f64>> {
    axis_pairs(steps.len())
        .into_iter()
        .enumerate()
        .map(|(p, (i, j))| {
            let raw = [
                Some(0.0),
                plane_angles.get(p).copied().flatten(),
                Some(-steps[i].atan2(steps[j])),
                Some(-steps[j].atan2(steps[i])),
            ];
            let mut options: Vec<f64> = Vec::with_capacity(raw.len());
            for angle in raw.into_iter().flatten().map(reduce_quarter_turn) {
                if angle.is_finite() && options.iter().all(|o| (o - angle).abs() > ANGLE_EPSILON) {
                    options.push(angle);
                }
            }
            options
        })
        .collect()
}

/// Cartesian product of the per-pair candidates; the first pair varies slowest.
pub fn candidate_rotations(per_pair: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut combos: Vec<Vec<f64>> = vec![Vec::new()];
    for options in per_pair {
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                options.iter().map(move |&angle| {
                    let mut combo = prefix.clone();
                    combo.push(angle);
                    combo
                })
            })
            .collect();
    }
    combos
}

/// Linspaces of `coords` after applying `rotations` about `origin`.
pub fn score_rotation(
    coords: ArrayView2<f64>,
    rotations: &[f64],
    origin: &[f64],
    edge_fraction: f64,
) -> Result<Vec<Linspace>> {
    let rotated = rotate_coordinates(coords, rotations, origin);
    rotated
        .axis_iter(Axis(1))
        .map(|column| estimate_linspace(&column.to_vec(), edge_fraction))
        .collect()
}

/// Infers the rotation that best aligns `coords` to an axis-parallel grid.
///
/// Rows with a non-finite component are ignored. The returned `alignment`
/// angles map sample coordinates into the grid frame about `origin`.
pub fn estimate_rotation(
    coords: ArrayView2<f64>,
    edge_fraction: f64,
    cancel: &CancelToken,
) -> Result<RotationEstimate> {
    let ndim = coords.ncols();
    if ndim == 0 {
        return Err(HypertableError::InvalidInput(
            "at least one coordinate axis is required".to_string(),
        ));
    }
    if ndim > MAX_DIMENSIONS {
        return Err(HypertableError::TooManyDimensions {
            found: ndim,
            max: MAX_DIMENSIONS,
        });
    }

    let valid = finite_rows(coords);
    if valid.len() < 2 {
        return Err(HypertableError::InsufficientSamples { found: valid.len() });
    }
    if valid.len() < coords.nrows() {
        log::warn!(
            "ignoring {} sample(s) with non-finite coordinates",
            coords.nrows() - valid.len()
        );
    }
    let valid_coords: Array2<f64> = coords.select(Axis(0), &valid);
    let origin = finite_mean(valid_coords.view());

    let neighbours = NeighbourOffsets::query(valid_coords.view())?;
    let steps = neighbours.steps();
    let plane_angles = neighbours.plane_angles();
    log::debug!("neighbour step proxy {:?}, plane angles {:?}", steps, plane_angles);
    cancel.check()?;

    let candidates = candidate_rotations(&pair_candidates(&steps, &plane_angles));
    log::debug!("scoring {} rotation candidate(s)", candidates.len());

    let scored: Vec<Result<Vec<Linspace>>> = candidates
        .par_iter()
        .map(|rotations| {
            cancel.check()?;
            score_rotation(valid_coords.view(), rotations, &origin, edge_fraction)
        })
        .collect();

    let mut best: Option<(usize, u128, Vec<Linspace>)> = None;
    let mut first_error: Option<HypertableError> = None;
    for (idx, result) in scored.into_iter().enumerate() {
        let linspaces = match result {
            Ok(linspaces) => linspaces,
            Err(HypertableError::Cancelled) => return Err(HypertableError::Cancelled),
            Err(e) => {
                log::debug!("candidate {:?} is unusable: {}", candidates[idx], e);
                first_error.get_or_insert(e);
                continue;
            }
        };
        let volume = grid_volume(&linspaces);
        log::debug!("candidate {:?} -> volume {}", candidates[idx], volume);
        if best.as_ref().map_or(true, |(_, v, _)| volume < *v) {
            best = Some((idx, volume, linspaces));
        }
    }

    let (idx, volume, linspaces) = match best {
        Some(best) => best,
        None => {
            return Err(first_error.unwrap_or_else(|| {
                HypertableError::InvalidInput("no rotation candidates were produced".to_string())
            }))
        }
    };

    Ok(RotationEstimate {
        alignment: candidates[idx].clone(),
        linspaces,
        origin,
        volume,
        candidates: candidates.len(),
    })
}
