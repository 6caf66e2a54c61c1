//! Neutron unit conversions.
//!
//! Times are nanoseconds, distances metres, wavelengths angstroms,
//! wavenumbers inverse angstroms and energies millielectronvolts.
#![allow(clippy::unreadable_literal)]

use std::f64::consts::TAU;

/// Planck constant (CODATA 2018), J s.
pub const PLANCK_J_S: f64 = 6.626_070_15e-34;
/// Reduced Planck constant, J s.
pub const HBAR_J_S: f64 = PLANCK_J_S / TAU;
/// Neutron mass (CODATA 2018), kg.
pub const NEUTRON_MASS_KG: f64 = 1.674_927_498_04e-27;
/// One millielectronvolt in joules.
pub const JOULE_PER_MEV: f64 = 1.602_176_634e-22;

const METRES_PER_ANGSTROM: f64 = 1.0e-10;
const NS_PER_S: f64 = 1.0e9;

/// Wavelength for a slowness (inverse speed) in ns/m.
#[inline]
#[must_use]
pub fn wavelength_from_slowness(slowness_ns_per_m: f64) -> f64 {
    PLANCK_J_S / NEUTRON_MASS_KG * (slowness_ns_per_m / NS_PER_S) / METRES_PER_ANGSTROM
}

/// Slowness in ns/m for a wavelength.
#[inline]
#[must_use]
pub fn slowness_from_wavelength(wavelength: f64) -> f64 {
    wavelength * METRES_PER_ANGSTROM * NEUTRON_MASS_KG / PLANCK_J_S * NS_PER_S
}

/// Wavelength of a neutron covering `distance_m` in `tof_ns`.
#[inline]
#[must_use]
pub fn wavelength_from_tof(tof_ns: f64, distance_m: f64) -> f64 {
    wavelength_from_slowness(tof_ns / distance_m)
}

/// Flight time in ns over `distance_m` at the given wavelength.
#[inline]
#[must_use]
pub fn tof_from_wavelength(wavelength: f64, distance_m: f64) -> f64 {
    slowness_from_wavelength(wavelength) * distance_m
}

/// Speed in m/s.
#[inline]
#[must_use]
pub fn speed_from_wavelength(wavelength: f64) -> f64 {
    PLANCK_J_S / (NEUTRON_MASS_KG * wavelength * METRES_PER_ANGSTROM)
}

/// Wavelength for a speed in m/s.
#[inline]
#[must_use]
pub fn wavelength_from_speed(speed_m_per_s: f64) -> f64 {
    PLANCK_J_S / (NEUTRON_MASS_KG * speed_m_per_s) / METRES_PER_ANGSTROM
}

#[inline]
#[must_use]
pub fn wavenumber_from_wavelength(wavelength: f64) -> f64 {
    TAU / wavelength
}

#[inline]
#[must_use]
pub fn wavelength_from_wavenumber(wavenumber: f64) -> f64 {
    TAU / wavenumber
}

/// Kinetic energy `h^2 / (2 m lambda^2)`.
#[inline]
#[must_use]
pub fn energy_from_wavelength(wavelength: f64) -> f64 {
    let lambda_m = wavelength * METRES_PER_ANGSTROM;
    PLANCK_J_S * PLANCK_J_S / (2.0 * NEUTRON_MASS_KG * lambda_m * lambda_m) / JOULE_PER_MEV
}

/// Kinetic energy `hbar^2 k^2 / (2 m)`.
#[inline]
#[must_use]
pub fn energy_from_wavenumber(wavenumber: f64) -> f64 {
    let k_per_m = wavenumber / METRES_PER_ANGSTROM;
    HBAR_J_S * HBAR_J_S * k_per_m * k_per_m / (2.0 * NEUTRON_MASS_KG) / JOULE_PER_MEV
}

/// Wavenumber for a kinetic energy; `None` for non-positive energies.
#[must_use]
pub fn wavenumber_from_energy(energy_mev: f64) -> Option<f64> {
    if energy_mev > 0.0 && energy_mev.is_finite() {
        let k_per_m = (2.0 * NEUTRON_MASS_KG * energy_mev * JOULE_PER_MEV).sqrt() / HBAR_J_S;
        Some(k_per_m * METRES_PER_ANGSTROM)
    } else {
        None
    }
}

/// Speed `hbar k / m` in m/s.
#[inline]
#[must_use]
pub fn speed_from_wavenumber(wavenumber: f64) -> f64 {
    HBAR_J_S * (wavenumber / METRES_PER_ANGSTROM) / NEUTRON_MASS_KG
}
