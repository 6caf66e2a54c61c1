//! Kinematics error types.

use crate::report::RejectionReport;
use rustqe_graph::GraphError;
use thiserror::Error;

/// Result type for kinematics operations.
pub type Result<T> = std::result::Result<T, KinematicsError>;

/// Errors raised while building geometry or converting events.
#[derive(Error, Debug)]
pub enum KinematicsError {
    /// Degenerate or unphysical pixel, detected when a bank is built.
    #[error("pixel {pixel}: {reason}")]
    InvalidGeometry { pixel: u32, reason: String },

    /// The instrument description cannot explain the recorded data.
    #[error("instrument configuration: {0}")]
    InstrumentConfiguration(String),

    /// A bank had events but none could be converted; the report says why.
    #[error("instrument configuration: every event of the bank was rejected ({report})")]
    AllEventsRejected { report: Box<RejectionReport> },

    /// Workflow graph error.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Simulation or lookup table error.
    #[error("time-of-flight error: {0}")]
    Tof(#[from] rustqe_tof::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] rustqe_core::Error),
}

impl KinematicsError {
    pub(crate) fn geometry(pixel: u32, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            pixel,
            reason: reason.into(),
        }
    }
}
