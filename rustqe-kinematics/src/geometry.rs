//! Secondary-spectrometer geometry.
//!
//! Each detector pixel sees the sample through one analyzer reflection
//! point. `A` is that point relative to the sample and `D` the detector
//! relative to it, so the detector sits at `A + D`. The analyzer Bragg
//! condition fixes the final wavevector from the deflection angle between
//! the two legs and the crystal d-spacing.

use crate::error::{KinematicsError, Result};
use rustqe_core::units::{energy_from_wavenumber, speed_from_wavenumber};
use rustqe_core::{Vec3, VerticalRotation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::TAU;

/// Sample-table (`a3`) and detector-tank (`a4`) angles of one run, degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationState {
    pub a3_deg: f64,
    pub a4_deg: f64,
}

impl RotationState {
    #[must_use]
    pub fn new(a3_deg: f64, a4_deg: f64) -> Self {
        Self { a3_deg, a4_deg }
    }

    /// Rotation taking lab vectors into the sample-table frame.
    #[must_use]
    pub fn lab_to_sample_table(&self) -> VerticalRotation {
        VerticalRotation::from_degrees(-self.a3_deg)
    }

    /// Rotation taking tank-frame vectors into the lab frame.
    #[must_use]
    pub fn tank_to_lab(&self) -> VerticalRotation {
        VerticalRotation::from_degrees(self.a4_deg)
    }
}

/// Geometry of one detector pixel in the detector-tank frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorPixel {
    pub id: u32,
    /// Analyzer reflection point relative to the sample, m.
    pub analyzer_position: Vec3,
    /// Detector pixel relative to the reflection point, m.
    pub analyzer_to_detector: Vec3,
    /// Lattice spacing of the reflecting analyzer planes, angstrom.
    pub analyzer_dspacing_angstrom: f64,
}

impl DetectorPixel {
    #[must_use]
    pub fn new(id: u32, analyzer_position: Vec3, analyzer_to_detector: Vec3, dspacing: f64) -> Self {
        Self {
            id,
            analyzer_position,
            analyzer_to_detector,
            analyzer_dspacing_angstrom: dspacing,
        }
    }

    /// Builds a pixel from the analyzer crystal plane and the detector
    /// position, both relative to the sample.
    ///
    /// The reflection point is where the line from the sample to the
    /// detector's mirror image crosses the analyzer plane, so a detector
    /// offset along the plane moves the point by `|A| / (|A| + |D|)` of it.
    ///
    /// # Errors
    /// Returns [`KinematicsError::InvalidGeometry`] for a zero normal or
    /// when sample and detector are not on the same side of the plane.
    pub fn from_analyzer_plane(
        id: u32,
        analyzer_centre: Vec3,
        analyzer_normal: Vec3,
        detector_position: Vec3,
        dspacing: f64,
    ) -> Result<Self> {
        let normal = analyzer_normal
            .normalized()
            .ok_or_else(|| KinematicsError::geometry(id, "analyzer normal has zero length"))?;
        let offset = (detector_position - analyzer_centre).dot(normal);
        let image = detector_position - normal * (2.0 * offset);
        let along = image.dot(normal);
        let height = analyzer_centre.dot(normal);
        let s = height / along;
        if !(s.is_finite() && s > 0.0 && s < 1.0) {
            return Err(KinematicsError::geometry(
                id,
                "analyzer plane does not separate sample and detector image",
            ));
        }
        let reflection = image * s;
        Ok(Self::new(
            id,
            reflection,
            detector_position - reflection,
            dspacing,
        ))
    }

    /// Sample-to-detector vector `A + D`.
    #[must_use]
    pub fn detector_position(&self) -> Vec3 {
        self.analyzer_position + self.analyzer_to_detector
    }
}

/// Side lengths and deflection of the sample-analyzer-detector triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScatteringTriangle {
    pub sample_analyzer_m: f64,
    pub analyzer_detector_m: f64,
    /// Straight-line sample-to-detector distance `|A + D|`.
    pub sample_detector_m: f64,
    /// Cosine of the analyzer deflection angle 2 theta.
    pub cos_deflection: f64,
}

impl ScatteringTriangle {
    /// Law of cosines on `|A|`, `|D|` and `|A + D|`; `None` for a zero leg.
    #[must_use]
    pub fn new(analyzer_position: Vec3, analyzer_to_detector: Vec3) -> Option<Self> {
        let a = analyzer_position.norm();
        let d = analyzer_to_detector.norm();
        if !(a > 0.0 && d > 0.0 && a.is_finite() && d.is_finite()) {
            return None;
        }
        let sd = (analyzer_position + analyzer_to_detector).norm();
        let cos_deflection = ((sd * sd - a * a - d * d) / (2.0 * a * d)).clamp(-1.0, 1.0);
        Some(Self {
            sample_analyzer_m: a,
            analyzer_detector_m: d,
            sample_detector_m: sd,
            cos_deflection,
        })
    }

    /// Analyzer deflection angle 2 theta in radians.
    #[must_use]
    pub fn deflection_rad(&self) -> f64 {
        self.cos_deflection.acos()
    }

    /// Flight path sample -> analyzer -> detector, m.
    #[must_use]
    pub fn path_m(&self) -> f64 {
        self.sample_analyzer_m + self.analyzer_detector_m
    }
}

/// Per-pixel constants of the secondary spectrometer in the lab frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelKinematics {
    pub id: u32,
    pub analyzer_position: Vec3,
    pub analyzer_to_detector: Vec3,
    pub triangle: ScatteringTriangle,
    /// Geometric scattering angle `atan2(A.x, A.z)`, degrees.
    pub a4_deg: f64,
    /// Unit vector of the scattered neutron, along `A`.
    pub final_direction: Vec3,
    pub final_wavenumber: f64,
    pub final_energy_mev: f64,
    /// Flight time sample -> analyzer -> detector, ns.
    pub secondary_tof_ns: f64,
}

impl PixelKinematics {
    /// Rotates the pixel into the lab and solves its Bragg condition.
    ///
    /// # Errors
    /// Returns [`KinematicsError::InvalidGeometry`] for non-finite or
    /// zero-length legs, a non-positive d-spacing, a straight-through
    /// analyzer or a non-positive final energy.
    pub fn compute(pixel: &DetectorPixel, tank_to_lab: VerticalRotation) -> Result<Self> {
        let fail = |reason: &str| KinematicsError::geometry(pixel.id, reason);
        if !(pixel.analyzer_position.is_finite() && pixel.analyzer_to_detector.is_finite()) {
            return Err(fail("non-finite analyzer or detector vector"));
        }
        let dspacing = pixel.analyzer_dspacing_angstrom;
        if !(dspacing.is_finite() && dspacing > 0.0) {
            return Err(fail("analyzer d-spacing must be positive"));
        }

        let a = tank_to_lab.apply(pixel.analyzer_position);
        let d = tank_to_lab.apply(pixel.analyzer_to_detector);
        let triangle = ScatteringTriangle::new(a, d)
            .ok_or_else(|| fail("zero-length analyzer or detector vector"))?;
        let final_direction = a
            .normalized()
            .ok_or_else(|| fail("zero-length analyzer vector"))?;

        // 2 sin(theta) = sqrt(2 - 2 cos(2 theta))
        let two_sin_theta = (2.0 - 2.0 * triangle.cos_deflection).max(0.0).sqrt();
        if two_sin_theta < 1.0e-9 {
            return Err(fail("analyzer does not deflect, Bragg angle undefined"));
        }
        let final_wavenumber = TAU / (dspacing * two_sin_theta);
        let final_energy_mev = energy_from_wavenumber(final_wavenumber);
        if !(final_energy_mev.is_finite() && final_energy_mev > 0.0) {
            return Err(fail("final energy must be positive"));
        }
        let secondary_tof_ns = triangle.path_m() / speed_from_wavenumber(final_wavenumber) * 1.0e9;

        Ok(Self {
            id: pixel.id,
            analyzer_position: a,
            analyzer_to_detector: d,
            triangle,
            a4_deg: a.x.atan2(a.z).to_degrees(),
            final_direction,
            final_wavenumber,
            final_energy_mev,
            secondary_tof_ns,
        })
    }

    /// Sample-to-detector vector in the lab frame.
    #[must_use]
    pub fn sample_detector_vector(&self) -> Vec3 {
        self.analyzer_position + self.analyzer_to_detector
    }

    /// Secondary flight path, m.
    ///
    /// The neutron flies sample -> analyzer -> detector, so the path is the
    /// sum of the two legs `|A| + |D|`, not the straight-line distance
    /// `|A + D|` of the detector from the sample.
    #[must_use]
    pub fn secondary_path_m(&self) -> f64 {
        self.triangle.path_m()
    }

    /// Final wavevector in the lab frame.
    #[must_use]
    pub fn final_wavevector(&self) -> Vec3 {
        self.final_direction * self.final_wavenumber
    }
}

/// Lab-frame kinematics of every pixel of one bank at one tank angle.
#[derive(Clone, Debug, Default)]
pub struct SecondaryGeometry {
    pixels: Vec<PixelKinematics>,
    index: HashMap<u32, usize>,
    tank_a4_deg: f64,
}

impl SecondaryGeometry {
    /// Solves every pixel; the first degenerate pixel aborts the build.
    ///
    /// # Errors
    /// Returns [`KinematicsError::InvalidGeometry`] for a degenerate or
    /// duplicated pixel.
    pub fn build(pixels: &[DetectorPixel], tank_a4_deg: f64) -> Result<Self> {
        let tank = VerticalRotation::from_degrees(tank_a4_deg);
        let mut out = Vec::with_capacity(pixels.len());
        let mut index = HashMap::with_capacity(pixels.len());
        for pixel in pixels {
            if index.insert(pixel.id, out.len()).is_some() {
                return Err(KinematicsError::geometry(pixel.id, "duplicate pixel id"));
            }
            out.push(PixelKinematics::compute(pixel, tank)?);
        }
        log::debug!(
            "bank geometry with {} pixels at tank angle {} deg",
            out.len(),
            tank_a4_deg
        );
        Ok(Self {
            pixels: out,
            index,
            tank_a4_deg,
        })
    }

    #[must_use]
    pub fn pixel(&self, id: u32) -> Option<&PixelKinematics> {
        self.index.get(&id).map(|&i| &self.pixels[i])
    }

    #[must_use]
    pub fn pixels(&self) -> &[PixelKinematics] {
        &self.pixels
    }

    #[must_use]
    pub fn tank_a4_deg(&self) -> f64 {
        self.tank_a4_deg
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Longest secondary path of the bank, m.
    #[must_use]
    pub fn max_secondary_path_m(&self) -> Option<f64> {
        self.pixels
            .iter()
            .map(PixelKinematics::secondary_path_m)
            .max_by(f64::total_cmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rustqe_core::units::{energy_from_wavelength, tof_from_wavelength};
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    const PG002: f64 = 3.355;

    #[test]
    fn test_collinear_legs_add() {
        let a = Vec3::new(1.0, 0.0, 0.0);
        let d = Vec3::new(1.5, 0.0, 0.0);
        let triangle = ScatteringTriangle::new(a, d).unwrap();
        // |A + D|, never |A - D|
        assert_relative_eq!(triangle.sample_detector_m, 2.5);
        assert_relative_eq!(triangle.path_m(), 2.5);
        assert_relative_eq!(triangle.deflection_rad(), 0.0);
    }

    #[test]
    fn test_right_angle_deflection() {
        let triangle = ScatteringTriangle::new(Vec3::X, Vec3::Y).unwrap();
        assert_relative_eq!(triangle.deflection_rad(), FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(triangle.sample_detector_m, 2f64.sqrt());
    }

    #[test]
    fn test_deflection_distinguishes_sum_from_difference() {
        let a = Vec3::new(0.0, 0.0, 1.0);
        let d = Vec3::new(0.5, 0.0, 0.5);
        let triangle = ScatteringTriangle::new(a, d).unwrap();
        // With A - D this would read 135 deg.
        assert_relative_eq!(triangle.deflection_rad(), FRAC_PI_4, epsilon = 1e-12);
        let pixel = DetectorPixel::new(1, a, d, PG002);
        assert_relative_eq!(pixel.detector_position().x, 0.5);
        assert_relative_eq!(pixel.detector_position().z, 1.5);
    }

    #[test]
    fn test_final_energy_from_bragg_condition() {
        let pixel = DetectorPixel::new(7, Vec3::X, Vec3::Y, PG002);
        let k = PixelKinematics::compute(&pixel, VerticalRotation::from_degrees(0.0)).unwrap();
        // 2 theta = 90 deg: lambda = 2 d sin 45
        let lambda = 2.0 * PG002 * FRAC_PI_4.sin();
        assert_relative_eq!(k.final_energy_mev, energy_from_wavelength(lambda), max_relative = 1e-12);
        assert_relative_eq!(k.final_energy_mev, 3.634, max_relative = 1e-3);
        assert_relative_eq!(k.secondary_tof_ns, tof_from_wavelength(lambda, 2.0), max_relative = 1e-12);
        assert_relative_eq!(k.final_direction.x, 1.0);
        assert_relative_eq!(k.a4_deg, 90.0);
        // Flight path follows both legs, longer than the direct sqrt(2) m.
        assert_relative_eq!(k.secondary_path_m(), 2.0);
        assert_relative_eq!(k.sample_detector_vector().norm(), 2f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_tank_rotation_moves_pixel() {
        let pixel = DetectorPixel::new(1, Vec3::Z, Vec3::Y, PG002);
        let geometry = SecondaryGeometry::build(&[pixel], 90.0).unwrap();
        let k = geometry.pixel(1).unwrap();
        assert_relative_eq!(k.analyzer_position.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(k.analyzer_position.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(k.a4_deg, 90.0, epsilon = 1e-9);
        assert_relative_eq!(geometry.tank_a4_deg(), 90.0);
    }

    #[test]
    fn test_reflection_point_from_analyzer_plane() {
        // Horizontal mirror 0.5 m below the sample.
        let centre = Vec3::new(1.0, -0.5, 0.0);
        let pixel = DetectorPixel::from_analyzer_plane(3, centre, Vec3::Y, Vec3::new(2.0, 0.0, 0.0), PG002)
            .unwrap();
        assert_relative_eq!(pixel.analyzer_position.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(pixel.analyzer_position.y, -0.5, epsilon = 1e-12);
        assert_relative_eq!(pixel.analyzer_to_detector.y, 0.5, epsilon = 1e-12);

        // An offset along the plane moves the point by |A| / (|A| + |D|) of it.
        let shifted =
            DetectorPixel::from_analyzer_plane(4, centre, Vec3::Y, Vec3::new(2.0, 0.0, 0.2), PG002)
                .unwrap();
        assert_relative_eq!(shifted.analyzer_position.z, 0.1, epsilon = 1e-12);

        assert!(DetectorPixel::from_analyzer_plane(5, centre, Vec3::ZERO, Vec3::X, PG002).is_err());
    }

    #[test]
    fn test_degenerate_pixels_rejected() {
        let straight = DetectorPixel::new(1, Vec3::X, Vec3::X, PG002);
        let zero = DetectorPixel::new(2, Vec3::ZERO, Vec3::Y, PG002);
        let no_crystal = DetectorPixel::new(3, Vec3::X, Vec3::Y, 0.0);
        for pixel in [straight, zero, no_crystal] {
            match SecondaryGeometry::build(&[pixel], 0.0) {
                Err(KinematicsError::InvalidGeometry { pixel: id, .. }) => assert_eq!(id, pixel.id),
                other => panic!("expected invalid geometry, got {other:?}"),
            }
        }

        let ok = DetectorPixel::new(9, Vec3::X, Vec3::Y, PG002);
        assert!(SecondaryGeometry::build(&[ok, ok], 0.0).is_err());
    }
}
