//! Primary spectrometer: source to sample.

use crate::error::{KinematicsError, Result};
use rustqe_core::units::{energy_from_wavelength, wavelength_from_tof, wavenumber_from_wavelength};
use rustqe_core::Vec3;
use serde::{Deserialize, Serialize};

/// Incident flight path of the instrument.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrimaryBeamline {
    /// Source-to-sample distance L1, m.
    pub source_sample_distance_m: f64,
}

impl PrimaryBeamline {
    #[must_use]
    pub fn new(source_sample_distance_m: f64) -> Self {
        Self {
            source_sample_distance_m,
        }
    }

    /// # Errors
    /// Returns [`KinematicsError::InstrumentConfiguration`] unless L1 is
    /// positive and finite.
    pub fn validate(&self) -> Result<()> {
        let l1 = self.source_sample_distance_m;
        if l1.is_finite() && l1 > 0.0 {
            Ok(())
        } else {
            Err(KinematicsError::InstrumentConfiguration(format!(
                "source-to-sample distance must be positive, got {l1} m"
            )))
        }
    }

    /// Incident neutron for a time-of-flight at the sample.
    #[must_use]
    pub fn incident(&self, sample_tof_ns: f64) -> IncidentNeutron {
        let wavelength = wavelength_from_tof(sample_tof_ns, self.source_sample_distance_m);
        IncidentNeutron {
            wavelength_angstrom: wavelength,
            wavenumber: wavenumber_from_wavelength(wavelength),
            energy_mev: energy_from_wavelength(wavelength),
        }
    }
}

/// Incident neutron travelling along the beam (`+z`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IncidentNeutron {
    pub wavelength_angstrom: f64,
    /// Inverse angstrom.
    pub wavenumber: f64,
    pub energy_mev: f64,
}

impl IncidentNeutron {
    #[must_use]
    pub fn wavevector(&self) -> Vec3 {
        Vec3::Z * self.wavenumber
    }
}
