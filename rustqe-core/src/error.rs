//! Error types for rustqe-core.

use thiserror::Error;

/// Result type alias for rustqe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for rustqe operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Columns of a batch have different lengths.
    #[error("column `{column}` has length {actual}, expected {expected}")]
    LengthMismatch {
        column: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Histogram bin edges do not bracket the counts.
    #[error("histogram with {counts} bins needs {counts} + 1 edges, got {edges}")]
    InvalidHistogram { counts: usize, edges: usize },

    /// Degenerate or non-finite geometry.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
