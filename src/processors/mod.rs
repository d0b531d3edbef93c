//! Grid reconstruction stages.

pub mod alignment;
pub mod grid;
pub mod linspace;
pub mod rasterize;
pub mod rotation;
pub(crate) mod stats;

// Re-export key types for convenience
pub use alignment::{align_coordinates, alignment_tolerances, AlignmentMap};
pub use grid::{build_raster_grid, RasterGrid};
pub use linspace::{estimate_linspace, estimate_step, Linspace};
pub use rasterize::{rasterize, SquashMetric};
pub use rotation::{estimate_rotation, RotationEstimate, MAX_DIMENSIONS};
