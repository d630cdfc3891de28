//! Spherical observation model: h(x), its Jacobian, and measurement noise R.
//!
//! # Measurement vector
//! - **3D**: z = [range, azimuth, elevation]
//! - **4D**: z = [range, azimuth, elevation, range_rate] when range-rate is observed
//!
//! Every kinematic state handled by the tracker stores position in
//! `x[0..3]` and velocity in `x[3..6]`; components beyond that (acceleration,
//! turn rate) are not observed, so their Jacobian columns are zero.

use crate::coords::{self, Cartesian};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

pub type DMat = DMatrix<f64>;
pub type DVec = DVector<f64>;

/// Index of the azimuth component inside a measurement vector.
pub const AZIMUTH_IDX: usize = 1;

/// Smallest range / horizontal distance used when differentiating h(x).
const MIN_DIST: f64 = 1e-6;

/// Measurement noise standard deviations.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementNoise {
    /// Range std dev (meters)
    pub range_std: f64,
    /// Azimuth std dev (degrees)
    pub azimuth_std: f64,
    /// Elevation std dev (degrees)
    pub elevation_std: f64,
    /// Range-rate std dev (m/s), used only when range-rate is observed
    pub range_rate_std: f64,
}

impl Default for MeasurementNoise {
    fn default() -> Self {
        Self {
            range_std: 10.0,
            azimuth_std: 0.5,
            elevation_std: 0.5,
            range_rate_std: 2.0,
        }
    }
}

/// Spherical radar observation of a kinematic state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SphericalObservation {
    pub noise: MeasurementNoise,
    /// Whether the auxiliary field is treated as an observed range rate.
    pub with_range_rate: bool,
}

impl SphericalObservation {
    pub fn new(noise: MeasurementNoise, with_range_rate: bool) -> Self {
        Self {
            noise,
            with_range_rate,
        }
    }

    /// Dimension of the measurement vector.
    pub fn dim(&self) -> usize {
        if self.with_range_rate {
            4
        } else {
            3
        }
    }

    /// Expected measurement h(x).
    pub fn apply(&self, state: &DVec) -> DVec {
        let (p, v) = split_pos_vel(state);
        let s = coords::to_spherical(p.x, p.y, p.z);
        let mut z = DVec::zeros(self.dim());
        z[0] = s.range;
        z[1] = s.azimuth;
        z[2] = s.elevation;
        if self.with_range_rate {
            z[3] = p.dot(&v) / s.range.max(MIN_DIST);
        }
        z
    }

    /// Jacobian ∂h/∂x evaluated at `state` (angles in degrees).
    pub fn jacobian(&self, state: &DVec) -> DMat {
        let n = state.len();
        let (p, v) = split_pos_vel(state);
        let (x, y, z) = (p.x, p.y, p.z);
        let rho2 = (x * x + y * y).max(MIN_DIST * MIN_DIST);
        let rho = rho2.sqrt();
        let r2 = (rho2 + z * z).max(MIN_DIST * MIN_DIST);
        let r = r2.sqrt();
        let deg = 180.0 / std::f64::consts::PI;

        let mut h = DMat::zeros(self.dim(), n);
        // range
        h[(0, 0)] = x / r;
        h[(0, 1)] = y / r;
        h[(0, 2)] = z / r;
        // azimuth = atan2(x, y)
        h[(1, 0)] = deg * y / rho2;
        h[(1, 1)] = -deg * x / rho2;
        // elevation = atan2(z, rho)
        h[(2, 0)] = -deg * x * z / (r2 * rho);
        h[(2, 1)] = -deg * y * z / (r2 * rho);
        h[(2, 2)] = deg * rho / r2;

        if self.with_range_rate {
            let pv = p.dot(&v);
            let r3 = r2 * r;
            for i in 0..3 {
                h[(3, i)] = v[i] / r - pv * p[i] / r3;
                h[(3, i + 3)] = p[i] / r;
            }
        }
        h
    }

    /// Measurement noise covariance R.
    pub fn noise_cov(&self) -> DMat {
        let n = &self.noise;
        let mut diag = vec![
            n.range_std * n.range_std,
            n.azimuth_std * n.azimuth_std,
            n.elevation_std * n.elevation_std,
        ];
        if self.with_range_rate {
            diag.push(n.range_rate_std * n.range_rate_std);
        }
        DMat::from_diagonal(&DVec::from_vec(diag))
    }

    /// Innovation z − h(x) with the azimuth component wrapped into [-180, 180).
    pub fn innovation(&self, z: &DVec, predicted: &DVec) -> DVec {
        let mut y = z - predicted;
        y[AZIMUTH_IDX] = coords::wrap_angle_diff(y[AZIMUTH_IDX]);
        y
    }

    /// Cartesian position covariance of a spherical measurement at `(range, az, el)`,
    /// obtained by propagating R through the spherical→cartesian Jacobian.
    pub fn cartesian_cov(&self, range: f64, azimuth: f64, elevation: f64) -> Matrix3<f64> {
        let k = std::f64::consts::PI / 180.0;
        let (sa, ca) = azimuth.to_radians().sin_cos();
        let (se, ce) = elevation.to_radians().sin_cos();

        #[rustfmt::skip]
        let j = Matrix3::new(
            ce * sa,  range * ce * ca * k, -range * se * sa * k,
            ce * ca, -range * ce * sa * k, -range * se * ca * k,
            se,       0.0,                  range * ce * k,
        );
        let n = &self.noise;
        let r = Matrix3::from_diagonal(&Vector3::new(
            n.range_std * n.range_std,
            n.azimuth_std * n.azimuth_std,
            n.elevation_std * n.elevation_std,
        ));
        j * r * j.transpose()
    }
}

/// Line-of-sight unit vector pointing at `p` (zero at the origin).
pub fn line_of_sight(p: &Cartesian) -> Vector3<f64> {
    let v = Vector3::new(p.x, p.y, p.z);
    let n = v.norm();
    if n < MIN_DIST {
        Vector3::zeros()
    } else {
        v / n
    }
}

fn split_pos_vel(state: &DVec) -> (Vector3<f64>, Vector3<f64>) {
    let p = Vector3::new(state[0], state[1], state[2]);
    let v = if state.len() >= 6 {
        Vector3::new(state[3], state[4], state[5])
    } else {
        Vector3::zeros()
    };
    (p, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn state6(p: [f64; 3], v: [f64; 3]) -> DVec {
        DVec::from_vec(vec![p[0], p[1], p[2], v[0], v[1], v[2]])
    }

    #[test]
    fn h_shape_follows_state_dim() {
        let obs = SphericalObservation::new(MeasurementNoise::default(), false);
        let x = DVec::from_vec(vec![1000.0, 2000.0, 300.0, 1.0, 2.0, 0.0, 0.1, 0.2, 0.0]);
        let h = obs.jacobian(&x);
        assert_eq!((h.nrows(), h.ncols()), (3, 9));
        assert!(h.columns(6, 3).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let obs = SphericalObservation::new(MeasurementNoise::default(), true);
        let x = state6([3000.0, -4000.0, 800.0], [50.0, 20.0, -3.0]);
        let h = obs.jacobian(&x);
        let eps = 1e-4;
        for j in 0..6 {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[j] += eps;
            xm[j] -= eps;
            let dp = obs.apply(&xp);
            let dm = obs.apply(&xm);
            let d = obs.innovation(&dp, &dm) / (2.0 * eps);
            for i in 0..4 {
                assert_abs_diff_eq!(h[(i, j)], d[i], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn range_rate_of_receding_target_is_positive() {
        let obs = SphericalObservation::new(MeasurementNoise::default(), true);
        let z = obs.apply(&state6([0.0, 1000.0, 0.0], [0.0, 30.0, 0.0]));
        assert_abs_diff_eq!(z[0], 1000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(z[1], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(z[3], 30.0, epsilon = 1e-9);
    }

    #[test]
    fn innovation_wraps_azimuth() {
        let obs = SphericalObservation::new(MeasurementNoise::default(), false);
        let z = DVec::from_vec(vec![100.0, 1.0, 5.0]);
        let hx = DVec::from_vec(vec![99.0, 359.0, 5.0]);
        let y = obs.innovation(&z, &hx);
        assert_abs_diff_eq!(y[1], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn cartesian_cov_is_symmetric_and_scales_with_range() {
        let obs = SphericalObservation::new(MeasurementNoise::default(), false);
        let near = obs.cartesian_cov(1000.0, 30.0, 5.0);
        let far = obs.cartesian_cov(10_000.0, 30.0, 5.0);
        assert_abs_diff_eq!(near, near.transpose(), epsilon = 1e-9);
        assert!(far.trace() > near.trace());
    }
}
