//! rustqe-io: persistence for rustqe.
//!
//! Lookup tables are saved as JSON, or as HDF5 with the `hdf5` feature,
//! and reload bit-identically. Converted detector events and monitor
//! spectra are written as CSV or little-endian binary records.

mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
mod table;
mod writer;

pub use error::{Error, Result};
pub use table::{
    load_table, read_table_json, save_table, table_from_json, table_to_json, write_table_json,
    TableFormat, TABLE_FORMAT_VERSION,
};
pub use writer::{ConvertedFileWriter, CONVERTED_RECORD_BYTES};
