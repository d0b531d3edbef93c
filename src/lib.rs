//! Regular-grid reconstruction for scattered N-dimensional scan samples.
//!
//! This crate provides tools for:
//! - Inferring the rotated, regularly spaced grid behind a table of sample
//!   coordinates (parallel candidate search over a `kiddo` KD-tree)
//! - Snapping every sample onto exactly one grid cell
//! - Rasterizing per-sample data into dense `ndarray` arrays, NaN for missing
//!   cells and mean / sum / median for shared ones
//! - Squashing axes to aggregate over them
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hypergrid::{axis_keys, load_table_csv, Hypertable, ReconstructionConfig};
//!
//! let keys = axis_keys(&["map_x", "map_y"]);
//! let table = load_table_csv("scan.csv", &keys, &[]).unwrap();
//! let cube = Hypertable::from_table(Arc::new(table), keys, &ReconstructionConfig::default()).unwrap();
//! let data = cube.data().unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod hypertable;
pub mod processors;

pub use config::{OutputConfig, PipelineConfig, ReconstructionConfig};
pub use core::{load_table_csv, CancelToken, DataTable, SampleTable};
pub use error::{HypertableError, Result};
pub use hypertable::{axis_keys, AxisKey, DimensionDomain, Hypertable};
pub use processors::SquashMetric;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
