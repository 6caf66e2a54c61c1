//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// File written by an incompatible version.
    #[error("unsupported table format version {found} (expected {expected})")]
    UnsupportedVersion { found: String, expected: &'static str },

    /// The file format needs a feature this build lacks.
    #[error("{0} support is not enabled in this build")]
    FeatureDisabled(&'static str),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// Table contents rejected on load.
    #[error("table error: {0}")]
    Table(#[from] rustqe_tof::Error),
}
