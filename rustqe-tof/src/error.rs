//! Time-of-flight error types.

use thiserror::Error;

/// Result type for simulation and table operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration and construction errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed chopper descriptor.
    #[error("invalid chopper `{name}`: {reason}")]
    InvalidChopper { name: String, reason: String },

    /// Malformed source model.
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// Invalid table or simulation settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Inconsistent table contents.
    #[error("invalid lookup table: {0}")]
    InvalidTable(String),

    /// No simulated neutron passed the chopper cascade.
    #[error("none of {simulated} simulated neutrons passed the choppers")]
    NoSurvivors { simulated: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] rustqe_core::Error),
}

/// Per-query failures of the frame unwrapper.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum UnwrapError {
    /// The flight distance lies outside the table's distance grid.
    #[error("distance {distance_m} m outside table range [{min_m}, {max_m}] m")]
    DistanceOutOfRange {
        distance_m: f64,
        min_m: f64,
        max_m: f64,
    },

    /// No valid table cell at or next to the query.
    #[error("no valid time-of-flight at {distance_m} m, frame time {frame_time_ns} ns")]
    UnresolvableFrame { distance_m: f64, frame_time_ns: f64 },

    /// Distance or time is NaN or infinite.
    #[error("non-finite unwrap query")]
    NonFinite,
}
