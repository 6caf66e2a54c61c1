//! Energy and momentum transfer.

use crate::geometry::{PixelKinematics, RotationState};
use crate::primary::IncidentNeutron;
use rustqe_core::Vec3;

/// `E_i - E_f` in meV; positive when the sample absorbs energy.
#[inline]
#[must_use]
pub fn energy_transfer(incident_energy_mev: f64, final_energy_mev: f64) -> f64 {
    incident_energy_mev - final_energy_mev
}

/// `Q = k_i - k_f` in the lab frame, inverse angstrom.
#[inline]
#[must_use]
pub fn momentum_transfer(incident: &IncidentNeutron, pixel: &PixelKinematics) -> Vec3 {
    incident.wavevector() - pixel.final_wavevector()
}

/// Lab-frame `Q` expressed in the frame co-rotating with the sample table.
#[inline]
#[must_use]
pub fn to_sample_table(q_lab: Vec3, rotation: &RotationState) -> Vec3 {
    rotation.lab_to_sample_table().apply(q_lab)
}
