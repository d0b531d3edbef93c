//! Sample tables and the CSV loader.
//!
//! A [`SampleTable`] is anything that can hand out numeric columns by name and
//! a sample-aligned data matrix. [`DataTable`] is the in-memory implementation
//! produced by [`load_table_csv`].

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use ndarray::Array2;
use thiserror::Error;

use crate::error::HypertableError;
use crate::hypertable::AxisKey;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Column '{name}' has {found} values, expected {expected}")]
    RaggedColumn {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Column-oriented access to a table of samples.
pub trait SampleTable: Send + Sync {
    /// Number of samples (rows).
    fn num_rows(&self) -> usize;

    /// Names of every column.
    fn column_names(&self) -> Vec<AxisKey>;

    /// Values of one column, `None` when the table has no such column.
    fn column(&self, key: &AxisKey) -> Option<Vec<f64>>;

    /// The sample-aligned data matrix (`rows × M`).
    fn data_matrix(&self) -> Array2<f64>;

    /// A table holding only `rows`, in the given order.
    ///
    /// # Panics
    ///
    /// Panics if a row index is out of bounds.
    fn select_rows(&self, rows: &[usize]) -> Self
    where
        Self: Sized;

    /// Stacks the `keys` columns into an `rows × keys.len()` matrix.
    fn coordinate_matrix(&self, keys: &[AxisKey]) -> std::result::Result<Array2<f64>, HypertableError> {
        let rows = self.num_rows();
        let mut matrix = Array2::from_elem((rows, keys.len()), f64::NAN);
        for (k, key) in keys.iter().enumerate() {
            let column = self
                .column(key)
                .ok_or_else(|| HypertableError::InvalidAxis(key.clone()))?;
            if column.len() != rows {
                return Err(HypertableError::DataShapeMismatch {
                    expected: rows,
                    found: column.len(),
                });
            }
            for (r, v) in column.into_iter().enumerate() {
                matrix[[r, k]] = v;
            }
        }
        Ok(matrix)
    }
}

/// In-memory table of named `f64` columns.
#[derive(Debug, Clone)]
pub struct DataTable {
    names: Vec<AxisKey>,
    columns: Vec<Vec<f64>>,
    data_columns: Vec<usize>,
    rows: usize,
}

impl DataTable {
    /// Creates a table; every column becomes part of the data matrix.
    pub fn new(columns: Vec<(AxisKey, Vec<f64>)>) -> Result<Self> {
        let rows = columns.first().map_or(0, |(_, values)| values.len());
        let mut names: Vec<AxisKey> = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());

        for (name, column) in columns {
            if names.contains(&name) {
                return Err(LoaderError::DuplicateColumn(name.to_string()));
            }
            if column.len() != rows {
                return Err(LoaderError::RaggedColumn {
                    name: name.to_string(),
                    expected: rows,
                    found: column.len(),
                });
            }
            names.push(name);
            values.push(column);
        }

        let data_columns = (0..names.len()).collect();
        Ok(Self {
            names,
            columns: values,
            data_columns,
            rows,
        })
    }

    /// Restricts the data matrix to `keys`, in the given order.
    pub fn with_data_columns(mut self, keys: &[AxisKey]) -> Result<Self> {
        let mut indices = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for key in keys {
            match self.names.iter().position(|n| n == key) {
                Some(i) => indices.push(i),
                None => missing.push(key.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(LoaderError::MissingColumns(missing.join(", ")));
        }
        self.data_columns = indices;
        Ok(self)
    }

    /// Uses every column except `excluded` as the data matrix.
    pub fn without_data_columns(mut self, excluded: &[AxisKey]) -> Self {
        self.data_columns = (0..self.names.len())
            .filter(|&i| !excluded.contains(&self.names[i]))
            .collect();
        self
    }

    /// Names of the columns forming the data matrix.
    pub fn data_column_names(&self) -> Vec<AxisKey> {
        self.data_columns.iter().map(|&i| self.names[i].clone()).collect()
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.names.len()
    }
}

impl SampleTable for DataTable {
    #[inline]
    fn num_rows(&self) -> usize {
        self.rows
    }

    fn column_names(&self) -> Vec<AxisKey> {
        self.names.clone()
    }

    fn column(&self, key: &AxisKey) -> Option<Vec<f64>> {
        self.names
            .iter()
            .position(|n| n == key)
            .map(|i| self.columns[i].clone())
    }

    fn data_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows, self.data_columns.len()), |(r, c)| {
            self.columns[self.data_columns[c]][r]
        })
    }

    fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|column| rows.iter().map(|&r| column[r]).collect())
                .collect(),
            data_columns: self.data_columns.clone(),
            rows: rows.len(),
        }
    }
}

/// Load a table from a CSV file with a header row.
///
/// Every cell is parsed as `f64`; empty or unparseable cells become NaN. The
/// data matrix is `data_columns` when given, otherwise every column not listed
/// in `coordinate_columns`.
///
/// # Errors
///
/// Returns `MissingColumns` when a coordinate or data column is absent and
/// `EmptyFile` when the file has no data rows.
pub fn load_table_csv<P: AsRef<Path>>(
    path: P,
    coordinate_columns: &[AxisKey],
    data_columns: &[AxisKey],
) -> Result<DataTable> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let headers: Vec<AxisKey> = reader.headers()?.iter().map(AxisKey::from).collect();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];

    for result in reader.records() {
        let record = result?;
        for (i, column) in columns.iter_mut().enumerate() {
            let value = record
                .get(i)
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(f64::NAN);
            column.push(value);
        }
    }

    if columns.first().map_or(true, Vec::is_empty) {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let missing: Vec<String> = coordinate_columns
        .iter()
        .filter(|k| !headers.contains(k))
        .map(|k| k.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    }

    let table = DataTable::new(headers.into_iter().zip(columns).collect())?;
    let table = if data_columns.is_empty() {
        table.without_data_columns(coordinate_columns)
    } else {
        table.with_data_columns(data_columns)?
    };

    log::debug!(
        "loaded {} rows, {} columns from {}",
        table.num_rows(),
        table.num_columns(),
        path.display()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypertable::axis_keys;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_table() -> DataTable {
        DataTable::new(vec![
            (AxisKey::from("x"), vec![0.0, 1.0, 2.0]),
            (AxisKey::from("y"), vec![5.0, 5.0, 6.0]),
            (AxisKey::from("i"), vec![10.0, 20.0, 30.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_data_table_columns() {
        let table = sample_table();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column_names(), axis_keys(&["x", "y", "i"]));
        assert_eq!(table.column(&AxisKey::from("y")), Some(vec![5.0, 5.0, 6.0]));
        assert_eq!(table.column(&AxisKey::from("q")), None);
        assert_eq!(table.data_matrix().shape(), &[3, 3]);
    }

    #[test]
    fn test_data_column_selection() {
        let table = sample_table().without_data_columns(&axis_keys(&["x", "y"]));
        assert_eq!(table.data_column_names(), axis_keys(&["i"]));
        assert_eq!(table.data_matrix().column(0).to_vec(), vec![10.0, 20.0, 30.0]);

        let err = sample_table()
            .with_data_columns(&axis_keys(&["i", "nope"]))
            .unwrap_err();
        assert!(matches!(err, LoaderError::MissingColumns(ref m) if m == "nope"));
    }

    #[test]
    fn test_coordinate_matrix() {
        let table = sample_table();
        let coords = table.coordinate_matrix(&axis_keys(&["y", "x"])).unwrap();
        assert_eq!(coords.row(2).to_vec(), vec![6.0, 2.0]);

        assert!(matches!(
            table.coordinate_matrix(&axis_keys(&["z"])),
            Err(HypertableError::InvalidAxis(_))
        ));
    }

    #[test]
    fn test_select_rows_keeps_data_columns() {
        let table = sample_table()
            .without_data_columns(&axis_keys(&["x", "y"]))
            .select_rows(&[2, 0]);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column(&AxisKey::from("x")), Some(vec![2.0, 0.0]));
        assert_eq!(table.data_matrix().column(0).to_vec(), vec![30.0, 10.0]);
    }

    #[test]
    fn test_new_rejects_bad_columns() {
        let ragged = DataTable::new(vec![
            (AxisKey::from("a"), vec![1.0, 2.0]),
            (AxisKey::from("b"), vec![1.0]),
        ]);
        assert!(matches!(ragged, Err(LoaderError::RaggedColumn { found: 1, .. })));

        let dup = DataTable::new(vec![
            (AxisKey::from("a"), vec![1.0]),
            (AxisKey::from("a"), vec![2.0]),
        ]);
        assert!(matches!(dup, Err(LoaderError::DuplicateColumn(_))));
    }

    #[test]
    fn test_load_table_csv() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "x, y, a, b").unwrap();
        writeln!(file, "0.0, 1.0, 3.5, 4").unwrap();
        writeln!(file, "1.0, 1.0, , oops").unwrap();
        file.flush().unwrap();

        let table = load_table_csv(file.path(), &axis_keys(&["x", "y"]), &[])?;
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.data_column_names(), axis_keys(&["a", "b"]));

        let data = table.data_matrix();
        assert_eq!(data[[0, 0]], 3.5);
        assert_eq!(data[[0, 1]], 4.0);
        assert!(data[[1, 0]].is_nan());
        assert!(data[[1, 1]].is_nan());

        Ok(())
    }

    #[test]
    fn test_load_table_csv_explicit_data_columns() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "x,a,b").unwrap();
        writeln!(file, "0,1,2").unwrap();
        file.flush().unwrap();

        let table = load_table_csv(file.path(), &axis_keys(&["x"]), &axis_keys(&["b"]))?;
        assert_eq!(table.data_matrix().row(0).to_vec(), vec![2.0]);
        Ok(())
    }

    #[test]
    fn test_load_table_csv_errors() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "x,y").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            load_table_csv(file.path(), &axis_keys(&["x"]), &[]),
            Err(LoaderError::EmptyFile(_))
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "x,y").unwrap();
        writeln!(file, "1,2").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            load_table_csv(file.path(), &axis_keys(&["x", "z"]), &[]),
            Err(LoaderError::MissingColumns(ref m)) if m == "z"
        ));
    }
}
