//! Configuration types for grid reconstruction.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::processors::rasterize::SquashMetric;

/// Parameters controlling geometry inference and cell alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    /// How samples sharing a grid cell are combined
    #[serde(default)]
    pub squash_metric: SquashMetric,

    /// Alignment box half-width as a fraction of half the axis step
    #[serde(default = "default_tolerance_fraction")]
    pub tolerance_fraction: f64,

    /// Fraction of a step around the axis extremes averaged into start/stop
    #[serde(default = "default_edge_fraction")]
    pub edge_fraction: f64,

    /// Largest grid (in cells) a reconstruction may produce
    #[serde(default = "default_max_grid_cells")]
    pub max_grid_cells: usize,
}

fn default_tolerance_fraction() -> f64 {
    0.5
}

fn default_edge_fraction() -> f64 {
    0.2
}

fn default_max_grid_cells() -> usize {
    10_000_000
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            squash_metric: SquashMetric::default(),
            tolerance_fraction: default_tolerance_fraction(),
            edge_fraction: default_edge_fraction(),
            max_grid_cells: default_max_grid_cells(),
        }
    }
}

/// Configuration for CSV output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Decimal places written for coordinates and values
    #[serde(default = "default_precision")]
    pub precision: usize,

    /// Write rows for cells that received no sample
    #[serde(default = "default_write_empty_cells")]
    pub write_empty_cells: bool,
}

fn default_precision() -> usize {
    6
}

fn default_write_empty_cells() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            precision: default_precision(),
            write_empty_cells: default_write_empty_cells(),
        }
    }
}

/// Main configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub reconstruction: ReconstructionConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
