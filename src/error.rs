//! Error types for grid reconstruction and rasterization.

use thiserror::Error;

use crate::hypertable::AxisKey;

/// Errors raised while inferring a grid or rasterizing data onto it.
#[derive(Error, Debug)]
pub enum HypertableError {
    /// Fewer than two distinct values along an axis that needed a step size.
    ///
    /// The linspace estimator recovers from this by collapsing the axis to a
    /// single cell, so callers normally only see it from `estimate_step`.
    #[error("cannot estimate a step size from {values} distinct value(s)")]
    DegenerateAxis { values: usize },

    /// A sample matched zero or several grid cells.
    #[error("sample {sample} matched {matches} grid cells (expected exactly one)")]
    AlignmentMismatch { sample: usize, matches: usize },

    /// The reconstructed grid is larger than the configured safety bound.
    #[error("grid of {cells} cells exceeds the limit of {limit} cells")]
    OversizedGrid { cells: u128, limit: usize },

    /// The requested axis key is not part of the domain or table.
    #[error("axis '{0}' not found")]
    InvalidAxis(AxisKey),

    /// The same axis key was given more than once.
    #[error("axis '{0}' listed more than once")]
    DuplicateAxis(AxisKey),

    #[error("at least 2 samples with finite coordinates are required, found {found}")]
    InsufficientSamples { found: usize },

    #[error("{found} dimensions requested, at most {max} are supported")]
    TooManyDimensions { found: usize, max: usize },

    #[error("data has {found} rows but the coordinates have {expected}")]
    DataShapeMismatch { expected: usize, found: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("reconstruction cancelled")]
    Cancelled,

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Result type for reconstruction operations.
pub type Result<T> = std::result::Result<T, HypertableError>;
