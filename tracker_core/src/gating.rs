//! Gating: decides whether a measurement is a plausible update for a track.
//!
//! Two layers, both applied before the associator sees a pair:
//! 1. **Physical**: the measurement's range / azimuth / elevation, its
//!    altitude and the speed it implies relative to the track's previous
//!    position must fall inside the configured closed intervals.
//! 2. **Statistical**: d² = yᵀ S⁻¹ y must not exceed χ²(p, dof) where dof is
//!    the measurement dimension and p the configured confidence.
//!
//! # Gate threshold table
//! dof=3: χ²(0.99, 3) ≈ 11.34
//! dof=4: χ²(0.99, 4) ≈ 13.28

use crate::{
    config::GateConfig,
    kf::{self, Linearization},
    types::{DVec, Measurement, StateEstimate},
};
use sensor_models::observation::SphericalObservation;

/// Pre-computed χ² gate thresholds indexed by dimension [1..=6].
/// Value at index `d` is χ²(0.99, d).
pub const CHI2_99: [f64; 7] = [0.0, 6.635, 9.210, 11.345, 13.277, 15.086, 16.812];

/// Chi-squared quantile for `dof` degrees of freedom at `confidence`.
///
/// Exact table values at 0.99, Wilson–Hilferty approximation otherwise.
pub fn chi2_threshold(dof: usize, confidence: f64) -> f64 {
    if (confidence - 0.99).abs() < 1e-12 && (1..CHI2_99.len()).contains(&dof) {
        return CHI2_99[dof];
    }
    let k = dof.max(1) as f64;
    let a = 2.0 / (9.0 * k);
    let z = normal_quantile(confidence);
    k * (1.0 - a + z * a.sqrt()).powi(3).max(0.0)
}

/// Inverse standard normal CDF (Acklam's rational approximation).
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e1,
        2.209460984245205e2,
        -2.759285104469687e2,
        1.383577518672690e2,
        -3.066479806614716e1,
        2.506628277459239e0,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e1,
        1.615858368580409e2,
        -1.556989798598866e2,
        6.680131188771972e1,
        -1.328068155288572e1,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-3,
        -3.223964580411365e-1,
        -2.400758277161838e0,
        -2.549732539343734e0,
        4.374664141464968e0,
        2.938163982698783e0,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-3,
        3.224671290700398e-1,
        2.445134137142996e0,
        3.754408661907416e0,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };
    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p > 1.0 - P_LOW {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    } else {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    }
}

/// Physical admissibility of `meas` for a track whose position at the
/// previous scan was `prior_position`, `dt` seconds earlier.
pub fn physically_admissible(
    meas: &Measurement,
    prior_position: [f64; 3],
    dt: f64,
    cfg: &GateConfig,
) -> bool {
    let c = meas.cartesian();
    if !(cfg.range.contains(meas.range())
        && cfg.azimuth.contains(meas.azimuth())
        && cfg.elevation.contains(meas.elevation())
        && cfg.altitude.contains(c.z))
    {
        return false;
    }
    if dt > 0.0 {
        let [px, py, pz] = prior_position;
        let dist = ((c.x - px).powi(2) + (c.y - py).powi(2) + (c.z - pz).powi(2)).sqrt();
        if !cfg.speed.contains(dist / dt) {
            return false;
        }
    }
    true
}

/// A measurement that passed both gate layers for one track.
#[derive(Clone, Debug)]
pub struct GateHit {
    pub meas_idx: usize,
    /// Mahalanobis distance squared
    pub d2: f64,
    /// Innovation y (reused by the update)
    pub innovation: DVec,
}

/// Gating outcome for one track in one scan.
#[derive(Clone, Debug)]
pub struct TrackGate {
    /// Linearization at the predicted state; `None` when S was singular
    pub linearization: Option<Linearization>,
    /// Admissible measurements, ascending by index
    pub hits: Vec<GateHit>,
}

impl TrackGate {
    pub fn is_singular(&self) -> bool {
        self.linearization.is_none()
    }
}

/// Gate every measurement of a scan against one predicted track.
///
/// A singular innovation covariance excludes the track from association
/// for this scan; the caller books it as a miss.
pub fn gate_track(
    predicted: &StateEstimate,
    prior_position: [f64; 3],
    dt: f64,
    measurements: &[Measurement],
    obs: &SphericalObservation,
    cfg: &GateConfig,
    threshold: f64,
) -> TrackGate {
    let Ok(lin) = kf::linearize(predicted, obs) else {
        return TrackGate {
            linearization: None,
            hits: Vec::new(),
        };
    };

    let hits = measurements
        .iter()
        .enumerate()
        .filter(|(_, m)| physically_admissible(m, prior_position, dt, cfg))
        .filter_map(|(j, m)| {
            let y = lin.residual(&m.vector(obs.with_range_rate), obs);
            let d2 = lin.mahalanobis(&y);
            (d2 <= threshold).then_some(GateHit {
                meas_idx: j,
                d2,
                innovation: y,
            })
        })
        .collect();

    TrackGate {
        linearization: Some(lin),
        hits,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Interval;
    use crate::types::DMat;
    use approx::assert_abs_diff_eq;
    use sensor_models::observation::MeasurementNoise;

    fn track_at(p: [f64; 3], var: f64) -> StateEstimate {
        StateEstimate::new(
            DVec::from_vec(vec![p[0], p[1], p[2], 0.0, 0.0, 0.0]),
            DMat::identity(6, 6) * var,
        )
    }

    fn obs() -> SphericalObservation {
        SphericalObservation::new(MeasurementNoise::default(), false)
    }

    #[test]
    fn table_and_approximation_agree() {
        assert_abs_diff_eq!(chi2_threshold(3, 0.99), 11.345, epsilon = 1e-9);
        // Wilson–Hilferty is within a few percent of the exact quantile.
        let approx99 = chi2_threshold(3, 0.9900001);
        assert!((approx99 - 11.345).abs() / 11.345 < 0.02, "{approx99}");
        let p95 = chi2_threshold(3, 0.95);
        assert!((p95 - 7.815).abs() / 7.815 < 0.02, "{p95}");
    }

    #[test]
    fn normal_quantile_known_values() {
        assert_abs_diff_eq!(normal_quantile(0.5), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(normal_quantile(0.975), 1.959964, epsilon = 1e-5);
        assert_abs_diff_eq!(normal_quantile(0.01), -2.326348, epsilon = 1e-5);
    }

    #[test]
    fn point_inside_gate() {
        let t = track_at([1000.0, 2000.0, 100.0], 100.0);
        let m = Measurement::from_cartesian(1000.0, 2000.0, 100.0, 1.0, None);
        let g = gate_track(
            &t,
            [1000.0, 2000.0, 100.0],
            1.0,
            &[m],
            &obs(),
            &GateConfig::default(),
            CHI2_99[3],
        );
        assert_eq!(g.hits.len(), 1);
        assert!(g.hits[0].d2 < 1e-6);
    }

    #[test]
    fn point_outside_gate() {
        let t = track_at([1000.0, 2000.0, 100.0], 1.0);
        let m = Measurement::from_cartesian(3000.0, 2000.0, 100.0, 1.0, None);
        let g = gate_track(
            &t,
            [1000.0, 2000.0, 100.0],
            1.0,
            &[m],
            &obs(),
            &GateConfig {
                speed: Interval::new(0.0, 1e9),
                ..Default::default()
            },
            CHI2_99[3],
        );
        assert!(g.hits.is_empty());
        assert!(!g.is_singular());
    }

    #[test]
    fn physical_bounds_exclude() {
        let cfg = GateConfig {
            altitude: Interval::new(0.0, 500.0),
            speed: Interval::new(0.0, 300.0),
            ..Default::default()
        };
        let low = Measurement::from_cartesian(1000.0, 1000.0, 100.0, 1.0, None);
        let high = Measurement::from_cartesian(1000.0, 1000.0, 900.0, 1.0, None);
        assert!(physically_admissible(&low, [1000.0, 1000.0, 100.0], 1.0, &cfg));
        assert!(!physically_admissible(&high, [1000.0, 1000.0, 900.0], 1.0, &cfg));
        // 1 km in one second implies 1000 m/s, above the speed bound.
        assert!(!physically_admissible(&low, [0.0, 1000.0, 100.0], 1.0, &cfg));
        // Speed is not checked when no time elapsed.
        assert!(physically_admissible(&low, [0.0, 1000.0, 100.0], 0.0, &cfg));
    }
}
