//! Regular-spacing estimation along a single axis.
//!
//! Scan coordinates along one axis are a handful of evenly spaced positions
//! repeated many times, blurred by stage noise and occasionally missing a
//! row. The estimator sorts the values, separates the consecutive gaps into
//! "noise" and "real step" with an Otsu split, and derives `(start, stop,
//! count)` from the step and the averaged extremes.

use serde::{Deserialize, Serialize};

use super::stats::{mean, median, median_in_place, variance};
use crate::error::{HypertableError, Result};

/// Number of evenly spaced thresholds tried by the Otsu split.
const OTSU_CANDIDATES: usize = 10;

/// A lower gap class whose median is below this fraction of the upper
/// class median is treated as duplicate/noise gaps.
const NOISE_RATIO: f64 = 0.5;

/// Evenly spaced positions `start..=stop` with `count` entries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Linspace {
    pub start: f64,
    pub stop: f64,
    pub count: usize,
}

impl Linspace {
    pub fn new(start: f64, stop: f64, count: usize) -> Self {
        Self {
            start,
            stop,
            count: count.max(1),
        }
    }

    /// A single-cell linspace at `value`.
    #[inline]
    pub fn single(value: f64) -> Self {
        Self::new(value, value, 1)
    }

    /// Distance between neighbouring positions, `None` for a single cell.
    #[inline]
    pub fn step(&self) -> Option<f64> {
        if self.count > 1 {
            Some((self.stop - self.start) / (self.count - 1) as f64)
        } else {
            None
        }
    }

    #[inline]
    pub fn center(&self) -> f64 {
        0.5 * (self.start + self.stop)
    }

    #[inline]
    pub fn extent(&self) -> f64 {
        self.stop - self.start
    }

    /// The `count` positions; a single cell sits at the centre.
    pub fn positions(&self) -> Vec<f64> {
        match self.step() {
            None => vec![self.center()],
            Some(step) => {
                let mut positions: Vec<f64> =
                    (0..self.count).map(|i| self.start + step * i as f64).collect();
                if let Some(last) = positions.last_mut() {
                    *last = self.stop;
                }
                positions
            }
        }
    }
}

/// Otsu threshold over `values`: the candidate minimizing the weighted
/// intra-class variance of the `>= t` and `< t` classes. Ties keep the
/// smallest threshold.
pub fn otsu_threshold(values: &[f64]) -> f64 {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(max > min) {
        return min;
    }

    let total = values.len() as f64;
    let mut best = (min, f64::INFINITY);
    for k in 0..OTSU_CANDIDATES {
        let t = min + (max - min) * k as f64 / (OTSU_CANDIDATES - 1) as f64;
        let (upper, lower): (Vec<f64>, Vec<f64>) = values.iter().partition(|&&v| v >= t);
        let score = (upper.len() as f64 / total) * variance(&upper)
            + (lower.len() as f64 / total) * variance(&lower);
        if score < best.1 {
            best = (t, score);
        }
    }
    best.0
}

/// Extents at or below this fraction of the coordinate magnitude are
/// rounding noise, not a second grid position.
const EXTENT_EPSILON: f64 = 1e-9;

#[inline]
fn negligible_extent(min: f64, max: f64) -> bool {
    max - min <= EXTENT_EPSILON * min.abs().max(max.abs()).max(1.0)
}

/// Means of the runs of `sorted` separated by gaps of at least `split`.
fn cluster_means(sorted: &[f64], split: f64) -> Vec<f64> {
    let mut means = Vec::new();
    let mut first = 0;
    for i in 1..=sorted.len() {
        if i == sorted.len() || sorted[i] - sorted[i - 1] >= split {
            means.push(mean(&sorted[first..i]));
            first = i;
        }
    }
    means
}

/// Estimates the grid step of sorted, finite values.
///
/// Gaps are split into noise and real steps with [`otsu_threshold`]; the step
/// is the median spacing between the means of the resulting position
/// clusters, so the spread inside a cluster does not shorten it.
///
/// Fails with [`HypertableError::DegenerateAxis`] when there are fewer than
/// two distinct values.
pub fn estimate_step(sorted: &[f64]) -> Result<f64> {
    let diffs: Vec<f64> = sorted.windows(2).map(|w| w[1] - w[0]).collect();
    let distinct = 1 + diffs.iter().filter(|&&d| d > 0.0).count();
    if sorted.is_empty() || distinct < 2 {
        return Err(HypertableError::DegenerateAxis {
            values: distinct.min(sorted.len()),
        });
    }

    let threshold = otsu_threshold(&diffs);
    let (mut upper, lower): (Vec<f64>, Vec<f64>) = diffs.iter().partition(|&&d| d >= threshold);
    let upper_median = median_in_place(&mut upper);

    let split = if lower.is_empty() || median(&lower) < NOISE_RATIO * upper_median {
        threshold
    } else {
        // Both classes look like real steps (e.g. a dropped row doubling a gap).
        f64::MIN_POSITIVE
    };

    let centres = cluster_means(sorted, split);
    let mut spacing: Vec<f64> = centres.windows(2).map(|w| w[1] - w[0]).collect();
    let step = median_in_place(&mut spacing);
    Ok(if step.is_finite() && step > 0.0 {
        step
    } else {
        upper_median
    })
}

/// Estimates `(start, stop, count)` for one axis of sample coordinates.
///
/// Non-finite values are ignored. An axis whose values agree up to rounding
/// noise yields a single cell at their mean. `edge_fraction` is the fraction
/// of a step around the minimum and maximum whose values are averaged into
/// `start` and `stop`.
pub fn estimate_linspace(values: &[f64], edge_fraction: f64) -> Result<Linspace> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return Err(HypertableError::InsufficientSamples { found: 0 });
    }
    sorted.sort_unstable_by(f64::total_cmp);

    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    if negligible_extent(min, max) {
        return Ok(Linspace::single(mean(&sorted)));
    }

    let step = match estimate_step(&sorted) {
        Ok(step) => step,
        Err(HypertableError::DegenerateAxis { values }) => {
            log::debug!("axis has {} distinct value(s), using a single cell", values);
            return Ok(Linspace::single(mean(&sorted)));
        }
        Err(e) => return Err(e),
    };

    // Inclusive bounds: the extremes always take part.
    let reach = step * edge_fraction;
    let low: Vec<f64> = sorted.iter().copied().take_while(|&v| v <= min + reach).collect();
    let high: Vec<f64> = sorted.iter().rev().copied().take_while(|&v| v >= max - reach).collect();
    let start = mean(&low);
    let stop = mean(&high);

    if negligible_extent(start, stop) {
        return Ok(Linspace::new(start, stop, 1));
    }

    let ratio = ((stop - start) / step).round();
    if !ratio.is_finite() {
        return Err(HypertableError::InvalidInput(format!(
            "non-finite step ratio for extent {} and step {}",
            stop - start,
            step
        )));
    }

    Ok(Linspace::new(start, stop, ratio as usize + 1))
}
