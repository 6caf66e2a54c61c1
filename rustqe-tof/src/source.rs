//! Pulsed source model.

use crate::error::{Error, Result};
use crate::frame::pulse_period_ns;
use rand::Rng;
use rustqe_core::units::{slowness_from_wavelength, speed_from_wavelength, wavelength_from_speed};
use serde::{Deserialize, Serialize};

/// Pulse timing and the neutron band emitted by the source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceModel {
    /// Pulse repetition frequency in Hz.
    pub frequency_hz: f64,
    /// Length of the emission window in ns.
    pub pulse_duration_ns: f64,
    /// Start of the emission window after the pulse reference in ns.
    pub emission_delay_ns: f64,
    /// Slowest simulated neutron in m/s.
    pub speed_min_m_per_s: f64,
    /// Fastest simulated neutron in m/s.
    pub speed_max_m_per_s: f64,
}

impl Default for SourceModel {
    fn default() -> Self {
        Self::ess_defaults()
    }
}

impl SourceModel {
    /// ESS long pulse: 14 Hz, 3 ms, neutrons between 100 and 10 000 m/s.
    #[must_use]
    pub fn ess_defaults() -> Self {
        Self {
            frequency_hz: 14.0,
            pulse_duration_ns: 3.0e6,
            emission_delay_ns: 0.0,
            speed_min_m_per_s: 100.0,
            speed_max_m_per_s: 10_000.0,
        }
    }

    /// Restricts the simulated band to a wavelength range in angstrom.
    #[must_use]
    pub fn with_wavelength_range(mut self, min_angstrom: f64, max_angstrom: f64) -> Self {
        self.speed_max_m_per_s = speed_from_wavelength(min_angstrom);
        self.speed_min_m_per_s = speed_from_wavelength(max_angstrom);
        self
    }

    #[must_use]
    pub fn with_pulse_duration_ns(mut self, pulse_duration_ns: f64) -> Self {
        self.pulse_duration_ns = pulse_duration_ns;
        self
    }

    #[must_use]
    pub fn period_ns(&self) -> f64 {
        pulse_period_ns(self.frequency_hz)
    }

    /// Simulated wavelength band `(min, max)` in angstrom.
    #[must_use]
    pub fn wavelength_range(&self) -> (f64, f64) {
        (
            wavelength_from_speed(self.speed_max_m_per_s),
            wavelength_from_speed(self.speed_min_m_per_s),
        )
    }

    /// Checks that the model describes a physical source.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSource`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if !(self.frequency_hz.is_finite() && self.frequency_hz > 0.0) {
            return Err(Error::InvalidSource(format!(
                "frequency must be positive, got {} Hz",
                self.frequency_hz
            )));
        }
        if !(self.pulse_duration_ns.is_finite() && self.pulse_duration_ns >= 0.0) {
            return Err(Error::InvalidSource(format!(
                "pulse duration must be non-negative, got {} ns",
                self.pulse_duration_ns
            )));
        }
        if self.pulse_duration_ns >= self.period_ns() {
            return Err(Error::InvalidSource(
                "pulse duration must be shorter than the pulse period".to_string(),
            ));
        }
        if !self.emission_delay_ns.is_finite() {
            return Err(Error::InvalidSource("emission delay must be finite".to_string()));
        }
        let speeds_ok = self.speed_min_m_per_s.is_finite()
            && self.speed_max_m_per_s.is_finite()
            && self.speed_min_m_per_s > 0.0
            && self.speed_min_m_per_s < self.speed_max_m_per_s;
        if !speeds_ok {
            return Err(Error::InvalidSource(format!(
                "speed band [{}, {}] m/s is empty or non-positive",
                self.speed_min_m_per_s, self.speed_max_m_per_s
            )));
        }
        Ok(())
    }

    /// Draws one neutron: emission time (ns) and slowness (ns/m).
    ///
    /// Emission time is uniform over the pulse and wavelength is uniform
    /// over the band.
    pub(crate) fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> (f64, f64) {
        let (lambda_min, lambda_max) = self.wavelength_range();
        let emission = self.emission_delay_ns + rng.gen::<f64>() * self.pulse_duration_ns;
        let wavelength = lambda_min + rng.gen::<f64>() * (lambda_max - lambda_min);
        (emission, slowness_from_wavelength(wavelength))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_ess_defaults() {
        let source = SourceModel::ess_defaults();
        assert!(source.validate().is_ok());
        assert_relative_eq!(source.period_ns(), 1.0e9 / 14.0);
        let (lo, hi) = source.wavelength_range();
        assert_relative_eq!(lo, 0.395_603_4, max_relative = 1e-5);
        assert_relative_eq!(hi, 39.560_34, max_relative = 1e-5);
    }

    #[test]
    fn test_wavelength_range_roundtrip() {
        let source = SourceModel::ess_defaults().with_wavelength_range(1.0, 6.0);
        let (lo, hi) = source.wavelength_range();
        assert_relative_eq!(lo, 1.0, max_relative = 1e-12);
        assert_relative_eq!(hi, 6.0, max_relative = 1e-12);
    }

    #[test]
    fn test_samples_stay_in_band() {
        let source = SourceModel::ess_defaults().with_wavelength_range(2.0, 3.0);
        let s_min = slowness_from_wavelength(2.0);
        let s_max = slowness_from_wavelength(3.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let (t0, s) = source.sample(&mut rng);
            assert!((0.0..3.0e6).contains(&t0));
            assert!(s >= s_min * (1.0 - 1e-12) && s <= s_max * (1.0 + 1e-12));
        }
    }

    #[test]
    fn test_rejects_bad_sources() {
        let mut source = SourceModel::ess_defaults();
        source.frequency_hz = 0.0;
        assert!(source.validate().is_err());

        let mut source = SourceModel::ess_defaults();
        source.speed_min_m_per_s = 20_000.0;
        assert!(source.validate().is_err());

        let source = SourceModel::ess_defaults().with_pulse_duration_ns(1.0e8);
        assert!(source.validate().is_err());
    }
}
