//! Immutable description of a reconstructed sampling grid.

use std::fmt;

use ndarray::ArrayView2;
use serde::Serialize;

use super::AxisKey;
use crate::config::ReconstructionConfig;
use crate::core::cancel::CancelToken;
use crate::core::loaders::SampleTable;
use crate::core::transforms::{axis_pairs, rotation_count};
use crate::error::{HypertableError, Result};
use crate::processors::linspace::Linspace;
use crate::processors::rasterize::SquashMetric;
use crate::processors::rotation::{estimate_rotation, RotationEstimate};

/// Geometry of a regular grid in a table's coordinate space.
///
/// Centre and area are expressed in the grid frame, that is after the sample
/// coordinates have been rotated by [`alignment_angles`](Self::alignment_angles)
/// about [`origin`](Self::origin). `rotations` holds one plane angle per axis
/// pair and maps the grid frame back to the sample frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionDomain {
    dim_keys: Vec<AxisKey>,
    real_center: Vec<f64>,
    real_area: Vec<f64>,
    rotations: Vec<f64>,
    pixel_area: Vec<usize>,
    origin: Vec<f64>,
    squash_metric: SquashMetric,
}

fn check_unique(keys: &[AxisKey]) -> Result<()> {
    for (i, key) in keys.iter().enumerate() {
        if keys[..i].contains(key) {
            return Err(HypertableError::DuplicateAxis(key.clone()));
        }
    }
    Ok(())
}

impl DimensionDomain {
    /// Validating constructor.
    pub fn new(
        dim_keys: Vec<AxisKey>,
        real_center: Vec<f64>,
        real_area: Vec<f64>,
        rotations: Vec<f64>,
        pixel_area: Vec<usize>,
        origin: Vec<f64>,
        squash_metric: SquashMetric,
    ) -> Result<Self> {
        let n = dim_keys.len();
        if n == 0 {
            return Err(HypertableError::InvalidInput(
                "a domain needs at least one axis".to_string(),
            ));
        }
        let lengths = [real_center.len(), real_area.len(), pixel_area.len(), origin.len()];
        if lengths.iter().any(|&len| len != n) {
            return Err(HypertableError::InvalidInput(format!(
                "{} axes but centre/area/pixel/origin lengths are {:?}",
                n, lengths
            )));
        }
        if rotations.len() != rotation_count(n) {
            return Err(HypertableError::InvalidInput(format!(
                "{} axes need {} rotation angle(s), got {}",
                n,
                rotation_count(n),
                rotations.len()
            )));
        }
        if pixel_area.contains(&0) {
            return Err(HypertableError::InvalidInput(
                "every axis needs at least one pixel".to_string(),
            ));
        }
        if real_area.iter().any(|a| !(a.is_finite() && *a >= 0.0)) {
            return Err(HypertableError::InvalidInput(format!(
                "grid extents must be finite and non-negative, got {:?}",
                real_area
            )));
        }
        if real_center
            .iter()
            .chain(&rotations)
            .chain(&origin)
            .any(|v| !v.is_finite())
        {
            return Err(HypertableError::InvalidInput(
                "centre, rotation and origin values must be finite".to_string(),
            ));
        }
        check_unique(&dim_keys)?;

        Ok(Self {
            dim_keys,
            real_center,
            real_area,
            rotations,
            pixel_area,
            origin,
            squash_metric,
        })
    }

    /// Domain described by a rotation search result.
    pub fn from_estimate(
        dim_keys: Vec<AxisKey>,
        estimate: &RotationEstimate,
        squash_metric: SquashMetric,
    ) -> Result<Self> {
        Self::new(
            dim_keys,
            estimate.linspaces.iter().map(Linspace::center).collect(),
            estimate.linspaces.iter().map(Linspace::extent).collect(),
            estimate.alignment.iter().map(|a| -a).collect(),
            estimate.linspaces.iter().map(|ls| ls.count).collect(),
            estimate.origin.clone(),
            squash_metric,
        )
    }

    /// Infers the domain of a coordinate matrix whose columns are `dim_keys`.
    pub fn from_coordinates(
        dim_keys: Vec<AxisKey>,
        coords: ArrayView2<f64>,
        config: &ReconstructionConfig,
        cancel: &CancelToken,
    ) -> Result<Self> {
        if dim_keys.len() != coords.ncols() {
            return Err(HypertableError::InvalidInput(format!(
                "{} axis key(s) for {} coordinate column(s)",
                dim_keys.len(),
                coords.ncols()
            )));
        }
        check_unique(&dim_keys)?;

        let estimate = estimate_rotation(coords, config.edge_fraction, cancel)?;
        if estimate.volume > config.max_grid_cells as u128 {
            return Err(HypertableError::OversizedGrid {
                cells: estimate.volume,
                limit: config.max_grid_cells,
            });
        }

        let domain = Self::from_estimate(dim_keys, &estimate, config.squash_metric)?;
        log::info!(
            "inferred {:?} grid over {:?} from {} candidate rotation(s)",
            domain.shape(),
            domain.dim_keys,
            estimate.candidates
        );
        Ok(domain)
    }

    /// Infers the domain of the `dim_keys` columns of `table`.
    pub fn from_table<T: SampleTable + ?Sized>(
        table: &T,
        dim_keys: Vec<AxisKey>,
        config: &ReconstructionConfig,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let coords = table.coordinate_matrix(&dim_keys)?;
        Self::from_coordinates(dim_keys, coords.view(), config, cancel)
    }

    #[inline]
    pub fn dim_keys(&self) -> &[AxisKey] {
        &self.dim_keys
    }

    #[inline]
    pub fn real_center(&self) -> &[f64] {
        &self.real_center
    }

    #[inline]
    pub fn real_area(&self) -> &[f64] {
        &self.real_area
    }

    /// Plane angles mapping the grid frame back to the sample frame.
    #[inline]
    pub fn rotations(&self) -> &[f64] {
        &self.rotations
    }

    /// Plane angles mapping sample coordinates into the grid frame.
    pub fn alignment_angles(&self) -> Vec<f64> {
        self.rotations.iter().map(|r| -r).collect()
    }

    #[inline]
    pub fn pixel_area(&self) -> &[usize] {
        &self.pixel_area
    }

    /// Rotation pivot in the sample frame.
    #[inline]
    pub fn origin(&self) -> &[f64] {
        &self.origin
    }

    #[inline]
    pub fn squash_metric(&self) -> SquashMetric {
        self.squash_metric
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.dim_keys.len()
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.pixel_area
    }

    /// Number of grid cells.
    pub fn size(&self) -> usize {
        self.pixel_area.iter().product()
    }

    /// Product of the per-axis areas.
    pub fn real_size(&self) -> f64 {
        self.real_area.iter().product()
    }

    /// Area divided by pixel count, per axis.
    pub fn pixel_size(&self) -> Vec<f64> {
        self.real_area
            .iter()
            .zip(&self.pixel_area)
            .map(|(&area, &n)| area / n as f64)
            .collect()
    }

    pub fn linspaces(&self) -> Vec<Linspace> {
        self.real_center
            .iter()
            .zip(&self.real_area)
            .zip(&self.pixel_area)
            .map(|((&c, &a), &n)| Linspace::new(c - a / 2.0, c + a / 2.0, n))
            .collect()
    }

    /// Positional axis names `x0, x1, …`.
    pub fn dim_names(&self) -> Vec<String> {
        (0..self.ndim()).map(|i| format!("x{}", i)).collect()
    }

    /// Plane names `x0x1, x0x2, …` in rotation order.
    pub fn rotation_names(&self) -> Vec<String> {
        axis_pairs(self.ndim())
            .into_iter()
            .map(|(i, j)| format!("x{}x{}", i, j))
            .collect()
    }

    pub fn axis_index(&self, key: &AxisKey) -> Option<usize> {
        self.dim_keys.iter().position(|k| k == key)
    }

    /// Domain without `key` and without every rotation involving it.
    pub fn squash_dimension(&self, key: &AxisKey) -> Result<Self> {
        let index = self
            .axis_index(key)
            .ok_or_else(|| HypertableError::InvalidAxis(key.clone()))?;
        if self.ndim() == 1 {
            return Err(HypertableError::InvalidAxis(key.clone()));
        }

        fn without<T: Clone>(values: &[T], index: usize) -> Vec<T> {
            values
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, v)| v.clone())
                .collect()
        }

        let rotations = axis_pairs(self.ndim())
            .into_iter()
            .zip(&self.rotations)
            .filter(|((i, j), _)| *i != index && *j != index)
            .map(|(_, &angle)| angle)
            .collect();

        Self::new(
            without(&self.dim_keys, index),
            without(&self.real_center, index),
            without(&self.real_area, index),
            rotations,
            without(&self.pixel_area, index),
            without(&self.origin, index),
            self.squash_metric,
        )
    }

    /// Squashes every axis not listed in `keys`, keeping the current axis order.
    pub fn squash_to(&self, keys: &[AxisKey]) -> Result<Self> {
        if let Some(unknown) = keys.iter().find(|k| self.axis_index(k).is_none()) {
            return Err(HypertableError::InvalidAxis(unknown.clone()));
        }

        let mut domain = self.clone();
        for key in &self.dim_keys {
            if !keys.contains(key) {
                domain = domain.squash_dimension(key)?;
            }
        }
        Ok(domain)
    }

    pub fn with_squash_metric(&self, squash_metric: SquashMetric) -> Self {
        Self {
            squash_metric,
            ..self.clone()
        }
    }
}

impl fmt::Display for DimensionDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.dim_names();
        let pixel_size = self.pixel_size();
        let linspaces = self.linspaces();

        writeln!(
            f,
            "{:<6} {:<14} {:>12} {:>12} {:>7} {:>12} {:>12} {:>12}",
            "Dim", "Key", "Center", "Area", "Pixels", "Pixel Size", "Start", "Stop"
        )?;
        for i in 0..self.ndim() {
            writeln!(
                f,
                "{:<6} {:<14} {:>12.4} {:>12.4} {:>7} {:>12.4} {:>12.4} {:>12.4}",
                names[i],
                self.dim_keys[i].as_str(),
                self.real_center[i],
                self.real_area[i],
                self.pixel_area[i],
                pixel_size[i],
                linspaces[i].start,
                linspaces[i].stop,
            )?;
        }

        if !self.rotations.is_empty() {
            writeln!(f)?;
            writeln!(f, "{:<8} {:>12} {:>10}", "Plane", "Angle (rad)", "Degrees")?;
            for (name, angle) in self.rotation_names().iter().zip(&self.rotations) {
                writeln!(f, "{:<8} {:>12.6} {:>10.3}", name, angle, angle.to_degrees())?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Dimensions:  {}", self.ndim())?;
        writeln!(f, "Pixel count: {}", self.size())?;
        writeln!(f, "Real area:   {:.4}", self.real_size())?;
        write!(f, "Squash:      {}", self.squash_metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypertable::axis_keys;

    fn domain_3d() -> DimensionDomain {
        DimensionDomain::new(
            axis_keys(&["x", "y", "z"]),
            vec![1.0, 2.0, 3.0],
            vec![2.0, 4.0, 0.0],
            vec![0.1, 0.2, 0.3],
            vec![3, 5, 1],
            vec![1.0, 2.0, 3.0],
            SquashMetric::Mean,
        )
        .unwrap()
    }

    #[test]
    fn test_derived_geometry() {
        let domain = domain_3d();
        assert_eq!(domain.shape(), &[3, 5, 1]);
        assert_eq!(domain.size(), 15);
        assert_eq!(domain.ndim(), 3);
        assert_eq!(domain.real_size(), 0.0);
        assert_eq!(domain.pixel_size(), vec![2.0 / 3.0, 0.8, 0.0]);
        assert_eq!(domain.dim_names(), vec!["x0", "x1", "x2"]);
        assert_eq!(domain.rotation_names(), vec!["x0x1", "x0x2", "x1x2"]);
        assert_eq!(domain.alignment_angles(), vec![-0.1, -0.2, -0.3]);

        let linspaces = domain.linspaces();
        assert_eq!(linspaces[0], Linspace::new(0.0, 2.0, 3));
        assert_eq!(linspaces[1], Linspace::new(0.0, 4.0, 5));
        assert_eq!(linspaces[2], Linspace::new(3.0, 3.0, 1));
        assert_eq!(domain.axis_index(&AxisKey::from("z")), Some(2));
    }

    #[test]
    fn test_construction_is_validated() {
        let dup = DimensionDomain::new(
            axis_keys(&["x", "x"]),
            vec![0.0; 2],
            vec![1.0; 2],
            vec![0.0],
            vec![2, 2],
            vec![0.0; 2],
            SquashMetric::Mean,
        );
        assert!(matches!(dup, Err(HypertableError::DuplicateAxis(_))));

        let bad_rotations = DimensionDomain::new(
            axis_keys(&["x", "y"]),
            vec![0.0; 2],
            vec![1.0; 2],
            vec![],
            vec![2, 2],
            vec![0.0; 2],
            SquashMetric::Mean,
        );
        assert!(matches!(bad_rotations, Err(HypertableError::InvalidInput(_))));

        let zero_pixels = DimensionDomain::new(
            axis_keys(&["x"]),
            vec![0.0],
            vec![1.0],
            vec![],
            vec![0],
            vec![0.0],
            SquashMetric::Mean,
        );
        assert!(matches!(zero_pixels, Err(HypertableError::InvalidInput(_))));
    }

    #[test]
    fn test_negative_or_non_finite_geometry_is_rejected() {
        let build = |center: f64, area: f64, rotation: f64| {
            DimensionDomain::new(
                axis_keys(&["x", "y"]),
                vec![center, 0.0],
                vec![area, 1.0],
                vec![rotation],
                vec![3, 2],
                vec![0.0, 0.0],
                SquashMetric::Mean,
            )
        };

        assert!(matches!(build(0.0, -2.0, 0.0), Err(HypertableError::InvalidInput(_))));
        assert!(matches!(build(0.0, f64::INFINITY, 0.0), Err(HypertableError::InvalidInput(_))));
        assert!(matches!(build(f64::NAN, 2.0, 0.0), Err(HypertableError::InvalidInput(_))));
        assert!(matches!(build(0.0, 2.0, f64::NAN), Err(HypertableError::InvalidInput(_))));
        assert!(build(0.0, 0.0, 0.0).is_ok());
    }

    #[test]
    fn test_squash_middle_axis_drops_its_rotations() {
        let squashed = domain_3d().squash_dimension(&AxisKey::from("y")).unwrap();
        assert_eq!(squashed.dim_keys(), &axis_keys(&["x", "z"])[..]);
        assert_eq!(squashed.rotations(), &[0.2]);
        assert_eq!(squashed.real_center(), &[1.0, 3.0]);
        assert_eq!(squashed.pixel_area(), &[3, 1]);
        assert_eq!(squashed.origin(), &[1.0, 3.0]);
    }

    #[test]
    fn test_squash_first_axis() {
        let squashed = domain_3d().squash_dimension(&AxisKey::from("x")).unwrap();
        assert_eq!(squashed.rotations(), &[0.3]);
        assert_eq!(squashed.shape(), &[5, 1]);
    }

    #[test]
    fn test_squash_unknown_or_last_axis_fails() {
        let domain = domain_3d();
        assert!(matches!(
            domain.squash_dimension(&AxisKey::from("w")),
            Err(HypertableError::InvalidAxis(_))
        ));

        let single = domain.squash_to(&axis_keys(&["z"])).unwrap();
        assert_eq!(single.ndim(), 1);
        assert!(single.rotations().is_empty());
        assert!(matches!(
            single.squash_dimension(&AxisKey::from("z")),
            Err(HypertableError::InvalidAxis(_))
        ));
    }

    #[test]
    fn test_squash_to_keeps_axis_order() {
        let domain = domain_3d();
        let kept = domain.squash_to(&axis_keys(&["z", "x"])).unwrap();
        assert_eq!(kept.dim_keys(), &axis_keys(&["x", "z"])[..]);
        assert_eq!(kept.rotations(), &[0.2]);

        assert!(matches!(
            domain.squash_to(&axis_keys(&["x", "q"])),
            Err(HypertableError::InvalidAxis(_))
        ));
    }

    #[test]
    fn test_with_squash_metric() {
        let domain = domain_3d().with_squash_metric(SquashMetric::Median);
        assert_eq!(domain.squash_metric(), SquashMetric::Median);
        assert_eq!(domain.shape(), &[3, 5, 1]);
    }

    #[test]
    fn test_display_lists_axes_and_planes() {
        let text = domain_3d().to_string();
        assert!(text.contains("x0x2"));
        assert!(text.contains("Pixel count: 15"));
        assert!(text.lines().any(|l| l.starts_with("x1") && l.contains(" y ")));
    }
}
