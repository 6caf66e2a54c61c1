//! rustqe-kinematics: scattering kinematics for indirect-geometry
//! time-of-flight spectrometers.
//!
//! A neutron leaves the source, reaches the sample after an unknown number
//! of source frames, scatters towards an analyzer crystal that Bragg
//! reflects a fixed final energy, and is recorded by a detector pixel at a
//! frame-relative time. This crate recovers, per event, the incident
//! neutron and the energy and momentum transferred to the sample.
//!
//! # Key Components
//!
//! - [`SecondaryGeometry`] - per-pixel analyzer geometry, final energy and
//!   secondary flight time
//! - [`PrimaryBeamline`] - incident wavelength and energy from the flight
//!   time at the sample
//! - [`convert_bank`] - converts an [`EventBatch`](rustqe_core::EventBatch)
//!   through a [`FrameUnwrapper`](rustqe_tof::FrameUnwrapper)
//! - [`RejectionReport`] - events that could not be converted, and why
//! - [`workflow`] - the same steps as a [`rustqe_graph`] pipeline over runs,
//!   monitors and banks

mod error;
mod geometry;
mod primary;
mod processing;
mod report;
mod transfer;
pub mod workflow;

pub use error::{KinematicsError, Result};
pub use geometry::{DetectorPixel, PixelKinematics, RotationState, ScatteringTriangle, SecondaryGeometry};
pub use primary::{IncidentNeutron, PrimaryBeamline};
pub use processing::{
    convert_bank, convert_banks, convert_monitor, BankConversion, ConversionContext,
    ConversionSettings, MonitorConversion, RunConversion, TimeAtSample,
};
pub use report::{RejectionReason, RejectionReport};
pub use transfer::{energy_transfer, momentum_transfer, to_sample_table};
