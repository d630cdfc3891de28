//! Fundamental types used across the entire workspace.

use nalgebra::{DMatrix, DVector};
use sensor_models::coords::{self, Cartesian, Spherical};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Scalar type: use f64 throughout for numerical precision in Kalman filter.
// ---------------------------------------------------------------------------

/// Generic dynamic-size vector (state means, measurement vectors, innovations)
pub type DVec = DVector<f64>;

/// Generic dynamic-size matrix (covariances, F, Q, H, R, S)
pub type DMat = DMatrix<f64>;

// ---------------------------------------------------------------------------
// Identifier types
// ---------------------------------------------------------------------------

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// A single radar return. Immutable once created; the cartesian position is
/// computed once at construction. Serialized form carries the spherical
/// fields only and deserialization goes back through [`Measurement::new`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "MeasurementFields", into = "MeasurementFields")]
pub struct Measurement {
    range: f64,
    azimuth: f64,
    elevation: f64,
    timestamp: f64,
    auxiliary: Option<f64>,
    cartesian: Cartesian,
}

impl Measurement {
    /// Build a measurement from spherical coordinates (meters, degrees, seconds).
    /// Azimuth is normalized into `[0, 360)` and elevation clamped to `[-90, 90]`.
    pub fn new(range: f64, azimuth: f64, elevation: f64, timestamp: f64, auxiliary: Option<f64>) -> Self {
        let azimuth = coords::normalize_azimuth(azimuth);
        let elevation = coords::clamp_elevation(elevation);
        Self {
            range,
            azimuth,
            elevation,
            timestamp,
            auxiliary,
            cartesian: coords::to_cartesian(range, azimuth, elevation),
        }
    }

    /// Build a measurement from a cartesian position.
    pub fn from_cartesian(x: f64, y: f64, z: f64, timestamp: f64, auxiliary: Option<f64>) -> Self {
        let s = coords::to_spherical(x, y, z);
        Self::new(s.range, s.azimuth, s.elevation, timestamp, auxiliary)
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn azimuth(&self) -> f64 {
        self.azimuth
    }

    pub fn elevation(&self) -> f64 {
        self.elevation
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn auxiliary(&self) -> Option<f64> {
        self.auxiliary
    }

    pub fn cartesian(&self) -> &Cartesian {
        &self.cartesian
    }

    pub fn spherical(&self) -> Spherical {
        Spherical {
            range: self.range,
            azimuth: self.azimuth,
            elevation: self.elevation,
        }
    }

    /// Observation vector z: `[range, azimuth, elevation]`, plus the auxiliary
    /// field as range rate when `with_range_rate` is set. A missing auxiliary
    /// value is read as zero range rate.
    pub fn vector(&self, with_range_rate: bool) -> DVec {
        if with_range_rate {
            DVec::from_vec(vec![
                self.range,
                self.azimuth,
                self.elevation,
                self.auxiliary.unwrap_or(0.0),
            ])
        } else {
            DVec::from_vec(vec![self.range, self.azimuth, self.elevation])
        }
    }
}

/// Wire form of [`Measurement`].
#[derive(Serialize, Deserialize)]
struct MeasurementFields {
    range: f64,
    azimuth: f64,
    elevation: f64,
    timestamp: f64,
    #[serde(default)]
    auxiliary: Option<f64>,
}

impl From<MeasurementFields> for Measurement {
    fn from(f: MeasurementFields) -> Self {
        Measurement::new(f.range, f.azimuth, f.elevation, f.timestamp, f.auxiliary)
    }
}

impl From<Measurement> for MeasurementFields {
    fn from(m: Measurement) -> Self {
        MeasurementFields {
            range: m.range,
            azimuth: m.azimuth,
            elevation: m.elevation,
            timestamp: m.timestamp,
            auxiliary: m.auxiliary,
        }
    }
}

// ---------------------------------------------------------------------------
// Scan: a batch of co-timed measurements
// ---------------------------------------------------------------------------

/// A batch of measurements sharing one nominal timestamp, processed atomically.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Scan {
    /// Nominal scan time (seconds)
    pub timestamp: f64,
    pub measurements: Vec<Measurement>,
}

impl Scan {
    pub fn new(timestamp: f64, measurements: Vec<Measurement>) -> Self {
        Self {
            timestamp,
            measurements,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }
}

// ---------------------------------------------------------------------------
// StateEstimate
// ---------------------------------------------------------------------------

/// Gaussian state estimate: mean x and covariance P of matching dimension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateEstimate {
    pub mean: DVec,
    pub cov: DMat,
}

impl StateEstimate {
    pub fn new(mean: DVec, cov: DMat) -> Self {
        debug_assert_eq!(cov.nrows(), mean.len());
        debug_assert_eq!(cov.ncols(), mean.len());
        Self { mean, cov }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Position [x, y, z]
    pub fn position(&self) -> [f64; 3] {
        [self.mean[0], self.mean[1], self.mean[2]]
    }

    /// Velocity [vx, vy, vz]
    pub fn velocity(&self) -> [f64; 3] {
        [self.mean[3], self.mean[4], self.mean[5]]
    }

    /// Ground speed magnitude |v|.
    pub fn speed(&self) -> f64 {
        let [vx, vy, vz] = self.velocity();
        (vx * vx + vy * vy + vz * vz).sqrt()
    }

    /// Smallest eigenvalue of the covariance (used to check positive semi-definiteness).
    pub fn min_cov_eigenvalue(&self) -> f64 {
        self.cov
            .symmetric_eigenvalues()
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }
}

/// Force exact symmetry: P = (P + Pᵀ) / 2.
pub fn symmetrize(p: &DMat) -> DMat {
    (p + p.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn measurement_caches_cartesian() {
        let m = Measurement::new(1000.0, 90.0, 0.0, 1.0, None);
        assert_abs_diff_eq!(m.cartesian().x, 1000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m.cartesian().y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn measurement_normalizes_angles() {
        let m = Measurement::new(10.0, -10.0, 120.0, 0.0, Some(3.0));
        assert_abs_diff_eq!(m.azimuth(), 350.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.elevation(), 90.0, epsilon = 1e-12);
        assert_eq!(m.vector(true).len(), 4);
        assert_abs_diff_eq!(m.vector(true)[3], 3.0);
    }

    #[test]
    fn from_cartesian_roundtrips() {
        let m = Measurement::from_cartesian(300.0, -400.0, 50.0, 2.0, None);
        assert_abs_diff_eq!(m.cartesian().x, 300.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m.cartesian().y, -400.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m.cartesian().z, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn deserialized_measurement_is_rebuilt() {
        // Out-of-range angles and a stale cartesian field are both repaired.
        let json = r#"{"range":1000.0,"azimuth":-270.0,"elevation":0.0,"timestamp":4.0,
            "auxiliary":null,"cartesian":{"x":1.0,"y":2.0,"z":3.0}}"#;
        let m: Measurement = serde_json::from_str(json).unwrap();
        assert_eq!(m, Measurement::new(1000.0, 90.0, 0.0, 4.0, None));
        assert_abs_diff_eq!(m.azimuth(), 90.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.cartesian().x, 1000.0, epsilon = 1e-9);

        let back: Measurement = serde_json::from_str(&serde_json::to_string(&m).unwrap()).unwrap();
        assert_eq!(back, m);
    }
}
