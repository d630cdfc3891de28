//! Spherical ↔ cartesian conversion in the common sensor frame.
//!
//! # Convention
//! - x east, y north, z up (meters)
//! - azimuth in degrees, clockwise from north, normalized into `[0, 360)`
//! - elevation in degrees above the horizontal plane, clamped to `[-90, 90]`
//!
//! ```text
//! x = r·cos(el)·sin(az)
//! y = r·cos(el)·cos(az)
//! z = r·sin(el)
//! ```

use serde::{Deserialize, Serialize};

/// Full turn in degrees.
pub const FULL_TURN_DEG: f64 = 360.0;

/// Spherical measurement triple (range m, azimuth deg, elevation deg).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Spherical {
    pub range: f64,
    pub azimuth: f64,
    pub elevation: f64,
}

/// Cartesian triple in meters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cartesian {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Cartesian {
    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Cartesian) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Normalize an azimuth (degrees) into `[0, 360)`.
pub fn normalize_azimuth(azimuth: f64) -> f64 {
    let a = azimuth.rem_euclid(FULL_TURN_DEG);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if a >= FULL_TURN_DEG {
        0.0
    } else {
        a
    }
}

/// Wrap an angle difference (degrees) into `[-180, 180)`.
pub fn wrap_angle_diff(delta: f64) -> f64 {
    let d = (delta + 180.0).rem_euclid(FULL_TURN_DEG) - 180.0;
    if d >= 180.0 {
        d - FULL_TURN_DEG
    } else {
        d
    }
}

/// Clamp an elevation (degrees) into its physical range `[-90, 90]`.
pub fn clamp_elevation(elevation: f64) -> f64 {
    elevation.clamp(-90.0, 90.0)
}

/// Convert (range, azimuth, elevation) to cartesian (x, y, z).
pub fn to_cartesian(range: f64, azimuth: f64, elevation: f64) -> Cartesian {
    let az = azimuth.to_radians();
    let el = elevation.to_radians();
    let horizontal = range * el.cos();
    Cartesian {
        x: horizontal * az.sin(),
        y: horizontal * az.cos(),
        z: range * el.sin(),
    }
}

/// Convert (x, y, z) to (range, azimuth, elevation).
///
/// The origin maps to `(0, 0, 0)`.
pub fn to_spherical(x: f64, y: f64, z: f64) -> Spherical {
    let range = (x * x + y * y + z * z).sqrt();
    if range == 0.0 {
        return Spherical::default();
    }
    let azimuth = normalize_azimuth(x.atan2(y).to_degrees());
    let elevation = clamp_elevation((z / range).clamp(-1.0, 1.0).asin().to_degrees());
    Spherical {
        range,
        azimuth,
        elevation,
    }
}

impl From<Spherical> for Cartesian {
    fn from(s: Spherical) -> Self {
        to_cartesian(s.range, s.azimuth, s.elevation)
    }
}

impl From<Cartesian> for Spherical {
    fn from(c: Cartesian) -> Self {
        to_spherical(c.x, c.y, c.z)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
