//! Rotating disk choppers.
//!
//! A disk chopper spinning at `f` Hz presents the angle
//! `(360 f t - phase) mod 360` to the beam at absolute time `t`; it
//! transmits while that angle lies inside one of its openings.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Angular window of a chopper disk, `[open_deg, close_deg)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChopperOpening {
    pub open_deg: f64,
    pub close_deg: f64,
}

/// A single disk chopper.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiskChopper {
    pub name: String,
    /// Distance from the source along the beam in m.
    pub distance_m: f64,
    /// Rotation frequency in Hz.
    pub frequency_hz: f64,
    /// Phase in degrees.
    pub phase_deg: f64,
    pub openings: Vec<ChopperOpening>,
}

impl DiskChopper {
    /// Creates a chopper without openings; add them with [`Self::with_opening`].
    pub fn new(name: impl Into<String>, distance_m: f64, frequency_hz: f64, phase_deg: f64) -> Self {
        Self {
            name: name.into(),
            distance_m,
            frequency_hz,
            phase_deg,
            openings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_opening(mut self, open_deg: f64, close_deg: f64) -> Self {
        self.openings.push(ChopperOpening {
            open_deg,
            close_deg,
        });
        self
    }

    /// Disk angle facing the beam at an absolute time, in `[0, 360)`.
    #[inline]
    #[must_use]
    pub fn angle_at(&self, time_ns: f64) -> f64 {
        let turns = self.frequency_hz * time_ns * 1.0e-9;
        (360.0 * turns.fract() - self.phase_deg).rem_euclid(360.0)
    }

    /// Whether the chopper transmits at an absolute time.
    #[inline]
    #[must_use]
    pub fn is_open(&self, time_ns: f64) -> bool {
        let angle = self.angle_at(time_ns);
        self.openings
            .iter()
            .any(|w| angle >= w.open_deg && angle < w.close_deg)
    }

    /// Checks the descriptor for physical consistency.
    ///
    /// # Errors
    /// Returns [`Error::InvalidChopper`] for a non-positive frequency, a
    /// negative distance, no openings, or a malformed opening.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidChopper {
            name: self.name.clone(),
            reason,
        };
        if !(self.frequency_hz.is_finite() && self.frequency_hz > 0.0) {
            return Err(invalid(format!(
                "frequency must be positive, got {} Hz",
                self.frequency_hz
            )));
        }
        if !(self.distance_m.is_finite() && self.distance_m >= 0.0) {
            return Err(invalid(format!(
                "distance must be non-negative, got {} m",
                self.distance_m
            )));
        }
        if !self.phase_deg.is_finite() {
            return Err(invalid("phase must be finite".to_string()));
        }
        if self.openings.is_empty() {
            return Err(invalid("no openings".to_string()));
        }
        for w in &self.openings {
            let in_range = (0.0..=360.0).contains(&w.open_deg) && (0.0..=360.0).contains(&w.close_deg);
            if !in_range || w.close_deg <= w.open_deg {
                return Err(invalid(format!(
                    "opening [{}, {}] deg must satisfy 0 <= open < close <= 360",
                    w.open_deg, w.close_deg
                )));
            }
        }
        Ok(())
    }
}

/// Choppers ordered by distance from the source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChopperCascade {
    choppers: Vec<DiskChopper>,
}

impl ChopperCascade {
    /// Validates every chopper and orders them by distance.
    ///
    /// # Errors
    /// Returns the first chopper validation error.
    pub fn new(mut choppers: Vec<DiskChopper>) -> Result<Self> {
        for chopper in &choppers {
            chopper.validate()?;
        }
        choppers.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        Ok(Self { choppers })
    }

    /// Whether a neutron emitted at `emission_ns` with the given slowness
    /// (ns/m) passes every chopper.
    #[inline]
    #[must_use]
    pub fn transmits(&self, emission_ns: f64, slowness_ns_per_m: f64) -> bool {
        self.choppers
            .iter()
            .all(|c| c.is_open(emission_ns + c.distance_m * slowness_ns_per_m))
    }

    #[must_use]
    pub fn choppers(&self) -> &[DiskChopper] {
        &self.choppers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.choppers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.choppers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_open() -> DiskChopper {
        // 10 Hz, open for the first half of each 100 ms rotation.
        DiskChopper::new("half", 10.0, 10.0, 0.0).with_opening(0.0, 180.0)
    }

    #[test]
    fn test_opening_repeats_every_rotation() {
        let chopper = half_open();
        assert!(chopper.is_open(10.0e6));
        assert!(!chopper.is_open(60.0e6));
        assert!(chopper.is_open(110.0e6));
        assert!(!chopper.is_open(160.0e6));
    }

    #[test]
    fn test_phase_delays_opening() {
        // Phase 90 deg at 10 Hz delays the window by 25 ms.
        let chopper = DiskChopper::new("phased", 10.0, 10.0, 90.0).with_opening(0.0, 180.0);
        assert!(!chopper.is_open(10.0e6));
        assert!(chopper.is_open(30.0e6));
        assert!(chopper.is_open(70.0e6));
        assert!(!chopper.is_open(80.0e6));
    }

    #[test]
    fn test_malformed_choppers_rejected() {
        let no_openings = DiskChopper::new("empty", 5.0, 14.0, 0.0);
        assert!(ChopperCascade::new(vec![no_openings]).is_err());

        let inverted = DiskChopper::new("inverted", 5.0, 14.0, 0.0).with_opening(100.0, 20.0);
        assert!(inverted.validate().is_err());

        let stopped = DiskChopper::new("stopped", 5.0, 0.0, 0.0).with_opening(0.0, 20.0);
        match stopped.validate() {
            Err(Error::InvalidChopper { name, .. }) => assert_eq!(name, "stopped"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_cascade_sorted_and_transmission() {
        let far = DiskChopper::new("far", 20.0, 10.0, 0.0).with_opening(0.0, 36.0);
        let cascade = ChopperCascade::new(vec![far, half_open()]).unwrap();
        assert_eq!(cascade.choppers()[0].name, "half");

        // 1 ms/m: reaches 10 m at 10 ms (open), 20 m at 20 ms (36 deg window is 10 ms, closed).
        assert!(!cascade.transmits(0.0, 1.0e6));
        // 0.4 ms/m: 4 ms and 8 ms, both open.
        assert!(cascade.transmits(0.0, 0.4e6));
    }
}
