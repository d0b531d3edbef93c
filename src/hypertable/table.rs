//! A sample table viewed through a reconstructed grid.

use std::ops::Range;
use std::sync::Arc;

use ndarray::{Array2, ArrayD, ArrayView2, Axis};

use super::{AxisKey, DimensionDomain};
use crate::config::ReconstructionConfig;
use crate::core::cancel::CancelToken;
use crate::core::loaders::SampleTable;
use crate::core::transforms::{rotate_coordinates, unrotate_coordinates};
use crate::error::{HypertableError, Result};
use crate::processors::alignment::{align_coordinates, alignment_tolerances, AlignmentMap};
use crate::processors::grid::{build_raster_grid, RasterGrid};
use crate::processors::rasterize::{rasterize, SquashMetric};

/// The grid frame a domain was inferred in.
///
/// Squashed views keep their parent's frame: samples are rotated with every
/// original axis before the squashed columns are dropped.
#[derive(Debug, Clone)]
struct GridFrame {
    dim_keys: Vec<AxisKey>,
    alignment: Vec<f64>,
    origin: Vec<f64>,
    center: Vec<f64>,
}

impl GridFrame {
    fn of(domain: &DimensionDomain) -> Self {
        Self {
            dim_keys: domain.dim_keys().to_vec(),
            alignment: domain.alignment_angles(),
            origin: domain.origin().to_vec(),
            center: domain.real_center().to_vec(),
        }
    }

    /// Frame column of every key in `keys`.
    fn columns(&self, keys: &[AxisKey]) -> Result<Vec<usize>> {
        keys.iter()
            .map(|key| {
                self.dim_keys
                    .iter()
                    .position(|k| k == key)
                    .ok_or_else(|| HypertableError::InvalidAxis(key.clone()))
            })
            .collect()
    }
}

/// A table bound to the grid its coordinate columns were sampled on.
///
/// Only the geometry is cached; every array access re-runs alignment and
/// rasterization against the current table contents.
#[derive(Debug)]
pub struct Hypertable<T: SampleTable> {
    table: Arc<T>,
    domain: DimensionDomain,
    frame: GridFrame,
    config: ReconstructionConfig,
}

impl<T: SampleTable> Clone for Hypertable<T> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            domain: self.domain.clone(),
            frame: self.frame.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: SampleTable> Hypertable<T> {
    /// Infers the grid of the `dim_keys` columns and binds it to `table`.
    pub fn from_table(
        table: Arc<T>,
        dim_keys: Vec<AxisKey>,
        config: &ReconstructionConfig,
    ) -> Result<Self> {
        Self::from_table_with_cancel(table, dim_keys, config, &CancelToken::new())
    }

    /// Like [`from_table`](Self::from_table), aborting once `cancel` is set.
    pub fn from_table_with_cancel(
        table: Arc<T>,
        dim_keys: Vec<AxisKey>,
        config: &ReconstructionConfig,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let domain = DimensionDomain::from_table(table.as_ref(), dim_keys, config, cancel)?;
        Ok(Self {
            table,
            frame: GridFrame::of(&domain),
            domain,
            config: config.clone(),
        })
    }

    /// Binds an existing domain to `table`.
    pub fn new(table: Arc<T>, domain: DimensionDomain, config: ReconstructionConfig) -> Result<Self> {
        let names = table.column_names();
        if let Some(missing) = domain.dim_keys().iter().find(|k| !names.contains(k)) {
            return Err(HypertableError::InvalidAxis(missing.clone()));
        }
        Ok(Self {
            table,
            frame: GridFrame::of(&domain),
            domain,
            config,
        })
    }

    /// Same table and frame, different domain.
    fn with_domain(&self, domain: DimensionDomain) -> Self {
        Self {
            table: Arc::clone(&self.table),
            domain,
            frame: self.frame.clone(),
            config: self.config.clone(),
        }
    }

    #[inline]
    pub fn table(&self) -> &Arc<T> {
        &self.table
    }

    #[inline]
    pub fn domain(&self) -> &DimensionDomain {
        &self.domain
    }

    #[inline]
    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Sample coordinates for the domain's axes, one row per sample.
    pub fn coordinates(&self) -> Result<Array2<f64>> {
        self.table.coordinate_matrix(self.domain.dim_keys())
    }

    /// Sample coordinates rotated into the grid frame, restricted to the
    /// domain's axes.
    pub fn aligned_coordinates(&self) -> Result<Array2<f64>> {
        let coords = self.table.coordinate_matrix(&self.frame.dim_keys)?;
        let rotated = rotate_coordinates(coords.view(), &self.frame.alignment, &self.frame.origin);
        let columns = self.frame.columns(self.domain.dim_keys())?;
        Ok(rotated.select(Axis(1), &columns))
    }

    pub fn raster_grid(&self) -> Result<RasterGrid> {
        build_raster_grid(&self.domain.linspaces(), self.config.max_grid_cells)
    }

    /// Cell of every sample under the current domain.
    pub fn alignment(&self) -> Result<AlignmentMap> {
        let grid = self.raster_grid()?;
        self.align_to(&grid)
    }

    fn align_to(&self, grid: &RasterGrid) -> Result<AlignmentMap> {
        let aligned = self.aligned_coordinates()?;
        let tolerances =
            alignment_tolerances(&self.domain.linspaces(), self.config.tolerance_fraction);
        align_coordinates(grid, aligned.view(), &tolerances)
    }

    /// Dense `(n0, …, n_{N-1}, M)` array of a sample-aligned matrix.
    pub fn rasterize(&self, matrix: ArrayView2<f64>) -> Result<ArrayD<f64>> {
        self.rasterize_with_cancel(matrix, &CancelToken::new())
    }

    pub fn rasterize_with_cancel(
        &self,
        matrix: ArrayView2<f64>,
        cancel: &CancelToken,
    ) -> Result<ArrayD<f64>> {
        if matrix.nrows() != self.table.num_rows() {
            return Err(HypertableError::DataShapeMismatch {
                expected: self.table.num_rows(),
                found: matrix.nrows(),
            });
        }
        let map = self.alignment()?;
        cancel.check()?;

        log::debug!(
            "rasterizing {} column(s) onto {:?}: {} empty cell(s), {} shared",
            matrix.ncols(),
            self.domain.shape(),
            map.missing_cells(),
            map.shared_cells()
        );
        rasterize(matrix, &map, self.domain.shape(), self.domain.squash_metric())
    }

    /// Dense array of the table's data matrix.
    pub fn data(&self) -> Result<ArrayD<f64>> {
        let matrix = self.table.data_matrix();
        self.rasterize(matrix.view())
    }

    /// Sample-frame position of every grid cell, in row-major cell order.
    ///
    /// Squashed axes sit at the centre of their former extent.
    pub fn cell_coordinates(&self) -> Result<Array2<f64>> {
        let grid = self.raster_grid()?;
        let columns = self.frame.columns(self.domain.dim_keys())?;

        let mut full = Array2::from_shape_fn((grid.len(), self.frame.dim_keys.len()), |(_, c)| {
            self.frame.center[c]
        });
        for (k, &c) in columns.iter().enumerate() {
            full.column_mut(c).assign(&grid.points().column(k));
        }

        let sample_frame =
            unrotate_coordinates(full.view(), &self.frame.alignment, &self.frame.origin);
        Ok(sample_frame.select(Axis(1), &columns))
    }

    /// Hypertable over the same table with `key` squashed out of the grid.
    pub fn squash_dimension(&self, key: &AxisKey) -> Result<Self> {
        Ok(self.with_domain(self.domain.squash_dimension(key)?))
    }

    /// Hypertable keeping only `keys`, in the current axis order.
    pub fn squash_to(&self, keys: &[AxisKey]) -> Result<Self> {
        Ok(self.with_domain(self.domain.squash_to(keys)?))
    }

    /// Hypertable over the samples whose cells fall inside `ranges`.
    ///
    /// `ranges` holds one half-open cell index range per axis. The selected
    /// rows are copied into a new table whose domain is inferred afresh, so
    /// the sub-grid gets its own centre and extent.
    pub fn select(&self, ranges: &[Range<usize>]) -> Result<Self> {
        let shape = self.domain.shape();
        if ranges.len() != shape.len() {
            return Err(HypertableError::InvalidInput(format!(
                "{} index range(s) for {} axes",
                ranges.len(),
                shape.len()
            )));
        }
        for (axis, (range, &len)) in ranges.iter().zip(shape).enumerate() {
            if range.is_empty() || range.end > len {
                return Err(HypertableError::InvalidInput(format!(
                    "index range {:?} is empty or outside axis '{}' of length {}",
                    range,
                    self.domain.dim_keys()[axis],
                    len
                )));
            }
        }

        let map = self.alignment()?;
        let mut rows = Vec::new();
        let mut index = vec![0usize; shape.len()];
        for samples in map.cells() {
            if index.iter().zip(ranges).all(|(i, range)| range.contains(i)) {
                rows.extend_from_slice(samples);
            }
            for axis in (0..shape.len()).rev() {
                index[axis] += 1;
                if index[axis] < shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        rows.sort_unstable();
        log::debug!("selected {} of {} sample(s)", rows.len(), self.table.num_rows());

        // Squashed axes take part in the fresh inference, then drop out again.
        let table = Arc::new(self.table.select_rows(&rows));
        let selected = Self::from_table(table, self.frame.dim_keys.clone(), &self.config)?
            .with_squash_metric(self.domain.squash_metric());
        if selected.domain.ndim() == self.domain.ndim() {
            Ok(selected)
        } else {
            selected.squash_to(self.domain.dim_keys())
        }
    }

    pub fn with_squash_metric(&self, metric: SquashMetric) -> Self {
        self.with_domain(self.domain.with_squash_metric(metric))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::core::loaders::DataTable;
    use crate::hypertable::axis_keys;

    /// 4 × 3 axis-aligned grid with one intensity column `x + 10 y`.
    fn table_4x3() -> Arc<DataTable> {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        let mut vs = Vec::new();
        for i in 0..4 {
            for j in 0..3 {
                xs.push(i as f64);
                ys.push(j as f64 * 2.0);
                vs.push(i as f64 + 10.0 * j as f64);
            }
        }
        let table = DataTable::new(vec![
            (AxisKey::from("x"), xs),
            (AxisKey::from("y"), ys),
            (AxisKey::from("v"), vs),
        ])
        .unwrap()
        .without_data_columns(&axis_keys(&["x", "y"]));
        Arc::new(table)
    }

    #[test]
    fn test_from_table_infers_shape() {
        let ht = Hypertable::from_table(
            table_4x3(),
            axis_keys(&["x", "y"]),
            &ReconstructionConfig::default(),
        )
        .unwrap();
        assert_eq!(ht.domain().shape(), &[4, 3]);

        let data = ht.data().unwrap();
        assert_eq!(data.shape(), &[4, 3, 1]);
        assert_eq!(data[[2, 1, 0]], 12.0);
        assert_eq!(data[[3, 2, 0]], 23.0);
    }

    #[test]
    fn test_unknown_axis() {
        let result = Hypertable::from_table(
            table_4x3(),
            axis_keys(&["x", "nope"]),
            &ReconstructionConfig::default(),
        );
        assert!(matches!(result, Err(HypertableError::InvalidAxis(ref k)) if k.as_str() == "nope"));
    }

    #[test]
    fn test_squash_dimension_averages_the_dropped_axis() {
        let ht = Hypertable::from_table(
            table_4x3(),
            axis_keys(&["x", "y"]),
            &ReconstructionConfig::default(),
        )
        .unwrap();

        let squashed = ht.squash_dimension(&AxisKey::from("y")).unwrap();
        let data = squashed.data().unwrap();
        assert_eq!(data.shape(), &[4, 1]);
        for i in 0..4 {
            assert_relative_eq!(data[[i, 0]], (i as f64 + 10.0), epsilon = 1e-12);
        }

        let summed = squashed.with_squash_metric(SquashMetric::Sum).data().unwrap();
        assert_relative_eq!(summed[[0, 0]], 30.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cell_coordinates_match_grid_positions() {
        let ht = Hypertable::from_table(
            table_4x3(),
            axis_keys(&["x", "y"]),
            &ReconstructionConfig::default(),
        )
        .unwrap();
        let cells = ht.cell_coordinates().unwrap();
        assert_eq!(cells.nrows(), 12);
        assert_relative_eq!(cells[[5, 0]], 1.0, epsilon = 1e-9);
        assert_relative_eq!(cells[[5, 1]], 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rasterize_checks_rows_and_cancellation() {
        let ht = Hypertable::from_table(
            table_4x3(),
            axis_keys(&["x", "y"]),
            &ReconstructionConfig::default(),
        )
        .unwrap();

        let short = Array2::<f64>::zeros((3, 1));
        assert!(matches!(
            ht.rasterize(short.view()),
            Err(HypertableError::DataShapeMismatch { expected: 12, found: 3 })
        ));

        let token = CancelToken::new();
        token.cancel();
        let matrix = ht.table().data_matrix();
        assert!(matches!(
            ht.rasterize_with_cancel(matrix.view(), &token),
            Err(HypertableError::Cancelled)
        ));
    }

    #[test]
    fn test_select_sub_grid() {
        let ht = Hypertable::from_table(
            table_4x3(),
            axis_keys(&["x", "y"]),
            &ReconstructionConfig::default(),
        )
        .unwrap();

        let sub = ht.select(&[1..3, 0..2]).unwrap();
        assert_eq!(sub.table().num_rows(), 4);
        assert_eq!(sub.domain().shape(), &[2, 2]);
        assert_eq!(sub.domain().real_center(), &[1.5, 1.0][..]);

        let data = sub.data().unwrap();
        assert_eq!(data[[0, 0, 0]], 1.0);
        assert_eq!(data[[1, 1, 0]], 12.0);

        // A single row of cells keeps a one-pixel axis.
        let row = ht.select(&[0..4, 2..3]).unwrap();
        assert_eq!(row.domain().shape(), &[4, 1]);
        assert_eq!(row.data().unwrap()[[3, 0, 0]], 23.0);
    }

    #[test]
    fn test_select_rejects_bad_ranges() {
        let ht = Hypertable::from_table(
            table_4x3(),
            axis_keys(&["x", "y"]),
            &ReconstructionConfig::default(),
        )
        .unwrap();

        assert!(matches!(ht.select(&[0..2]), Err(HypertableError::InvalidInput(_))));
        assert!(matches!(ht.select(&[0..2, 1..4]), Err(HypertableError::InvalidInput(_))));
        assert!(matches!(ht.select(&[2..2, 0..1]), Err(HypertableError::InvalidInput(_))));
    }

    #[test]
    fn test_new_rejects_domain_with_unknown_keys() {
        let domain = DimensionDomain::new(
            axis_keys(&["q"]),
            vec![0.0],
            vec![1.0],
            vec![],
            vec![2],
            vec![0.0],
            SquashMetric::Mean,
        )
        .unwrap();
        assert!(matches!(
            Hypertable::new(table_4x3(), domain, ReconstructionConfig::default()),
            Err(HypertableError::InvalidAxis(_))
        ));
    }
}
