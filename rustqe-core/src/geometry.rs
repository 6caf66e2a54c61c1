//! Cartesian 3-vectors and rotations about the vertical axis.
//!
//! Instrument coordinates follow the usual neutron convention: `z` along the
//! incident beam, `y` vertically up, `x` completing a right-handed frame.

use std::ops::{Add, Mul, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A 3-vector in metres or inverse angstroms, depending on context.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const X: Self = Self::new(1.0, 0.0, 0.0);
    /// Vertical unit vector (opposite to gravity).
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);
    /// Beam direction.
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    #[inline]
    #[must_use]
    pub fn norm_squared(self) -> f64 {
        self.dot(self)
    }

    #[inline]
    #[must_use]
    pub fn norm(self) -> f64 {
        self.norm_squared().sqrt()
    }

    /// Unit vector in the same direction, or `None` for a zero or
    /// non-finite vector.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let norm = self.norm();
        if norm > 0.0 && norm.is_finite() {
            Some(self * (1.0 / norm))
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Angle between two vectors in radians, `None` if either is zero.
    #[must_use]
    pub fn angle_to(self, other: Self) -> Option<f64> {
        let denom = self.norm() * other.norm();
        if denom > 0.0 && denom.is_finite() {
            Some((self.dot(other) / denom).clamp(-1.0, 1.0).acos())
        } else {
            None
        }
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Right-handed rotation about the vertical (`+y`) axis.
///
/// A positive angle turns the beam axis `+z` towards `+x`:
/// `x' = x cos + z sin`, `z' = -x sin + z cos`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalRotation {
    cos: f64,
    sin: f64,
}

impl VerticalRotation {
    #[must_use]
    pub fn from_degrees(angle_deg: f64) -> Self {
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        Self { cos, sin }
    }

    #[must_use]
    pub fn inverse(self) -> Self {
        Self {
            cos: self.cos,
            sin: -self.sin,
        }
    }

    #[inline]
    #[must_use]
    pub fn apply(self, v: Vec3) -> Vec3 {
        Vec3::new(
            v.x * self.cos + v.z * self.sin,
            v.y,
            -v.x * self.sin + v.z * self.cos,
        )
    }
}
