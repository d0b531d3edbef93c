//! Writers for rasterized arrays and reconstructed domains.
//!
//! - CSV with one row per grid cell (indices, coordinates, values)
//! - YAML dump of a [`DimensionDomain`]

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use ndarray::{ArrayD, ArrayView2};
use thiserror::Error;

use crate::config::OutputConfig;
use crate::hypertable::{AxisKey, DimensionDomain};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// YAML serialization error.
    #[error("YAML error for '{path}': {source}")]
    YamlError {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Array shape does not agree with the domain or the column names.
    #[error("shape mismatch in {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(WriteError::ShapeMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}

fn format_value(value: f64, precision: usize) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{:.*}", precision, value)
    }
}

/// Write a rasterized array to CSV, one row per grid cell.
///
/// Columns are `<axis>_index` for every axis, then the cell's sample-frame
/// coordinate per axis, then one column per value. Missing values are written
/// as `NaN`; cells whose values are all missing are left out when
/// `output.write_empty_cells` is false.
///
/// # Arguments
///
/// * `raster` - Array of shape `(n0, …, n_{N-1}, M)` from a rasterization
/// * `domain` - Domain the array was rasterized on
/// * `cell_coords` - Sample-frame cell positions, `cells × N`
/// * `value_names` - Header for each of the `M` value columns
///
/// Returns the number of data rows written.
pub fn write_raster_csv(
    path: &Path,
    raster: &ArrayD<f64>,
    domain: &DimensionDomain,
    cell_coords: ArrayView2<f64>,
    value_names: &[AxisKey],
    output: &OutputConfig,
) -> Result<usize> {
    let ndim = domain.ndim();
    let cells = domain.size();
    check_len("raster dimensions", ndim + 1, raster.ndim())?;
    for (&expected, &found) in domain.shape().iter().zip(raster.shape()) {
        check_len("raster axis length", expected, found)?;
    }
    let m = raster.shape()[ndim];
    check_len("value names", m, value_names.len())?;
    check_len("cell coordinates", cells, cell_coords.nrows())?;
    check_len("coordinate axes", ndim, cell_coords.ncols())?;

    let flat = raster
        .to_shape((cells, m))
        .map_err(|_| WriteError::ShapeMismatch {
            what: "raster cells",
            expected: cells * m,
            found: raster.len(),
        })?;

    ensure_parent_dirs(path)?;
    let path_str = path.display().to_string();
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path_str.clone(),
        source: e,
    })?;
    let mut csv_writer = csv::Writer::from_writer(BufWriter::new(file));

    let mut header: Vec<String> = domain
        .dim_keys()
        .iter()
        .map(|k| format!("{}_index", k))
        .collect();
    header.extend(domain.dim_keys().iter().map(|k| k.to_string()));
    header.extend(value_names.iter().map(|k| k.to_string()));
    csv_writer
        .write_record(&header)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    let shape = domain.shape();
    let mut indices = vec![0usize; ndim];
    let mut written = 0;
    for cell in 0..cells {
        let values = flat.row(cell);
        let empty = values.iter().all(|v| v.is_nan());

        if output.write_empty_cells || !empty {
            let mut record: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
            record.extend(
                cell_coords
                    .row(cell)
                    .iter()
                    .map(|&v| format_value(v, output.precision)),
            );
            record.extend(values.iter().map(|&v| format_value(v, output.precision)));
            csv_writer
                .write_record(&record)
                .map_err(|e| WriteError::CsvError {
                    path: path_str.clone(),
                    source: e,
                })?;
            written += 1;
        }

        // Row-major increment, last axis fastest.
        for axis in (0..ndim).rev() {
            indices[axis] += 1;
            if indices[axis] < shape[axis] {
                break;
            }
            indices[axis] = 0;
        }
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(written)
}

/// Write a domain description to a YAML file.
pub fn write_domain_yaml(path: &Path, domain: &DimensionDomain) -> Result<()> {
    ensure_parent_dirs(path)?;
    let path_str = path.display().to_string();

    let content = serde_yaml::to_string(domain).map_err(|e| WriteError::YamlError {
        path: path_str.clone(),
        source: e,
    })?;
    fs::write(path, content).map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })
}
