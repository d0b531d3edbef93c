//! Core data types, coordinate transforms and I/O operations.

pub mod cancel;
pub mod loaders;
pub mod transforms;
pub mod writers;

pub use cancel::CancelToken;
pub use loaders::{load_table_csv, DataTable, LoaderError, SampleTable};
pub use writers::{write_domain_yaml, write_raster_csv, WriteError};
