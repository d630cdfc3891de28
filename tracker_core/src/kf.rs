//! Extended Kalman filter: predict and update steps.
//!
//! # Design choices
//! - Every step is a pure function of its inputs; the caller decides whether
//!   to commit the returned estimate into a track.
//! - The measurement function is spherical and therefore nonlinear; H is the
//!   Jacobian of h(x) evaluated at the predicted state. One [`Linearization`]
//!   per track per scan is shared by gating, the hard update and the
//!   probabilistic (PDA) update.
//! - Covariance updates use the Joseph form followed by explicit
//!   symmetrization so P stays symmetric positive semi-definite under
//!   repeated floating-point updates.
//!
//! ## Predict
//! x' = f(x, dt),  P' = F·P·Fᵀ + Q(dt)
//!
//! ## Update
//! y = z − h(x'),  S = H·P'·Hᵀ + R,  K = P'·Hᵀ·S⁻¹
//! x = x' + K·y,   P = (I − K·H)·P'·(I − K·H)ᵀ + K·R·Kᵀ

use crate::{
    error::TrackerError,
    motion::MotionModel,
    types::{symmetrize, DMat, DVec, Measurement, StateEstimate},
};
use sensor_models::observation::SphericalObservation;

/// S is treated as singular when its eigenvalue spread exceeds this ratio.
const SINGULAR_RCOND: f64 = 1e-12;

/// Result of a KF update step.
#[derive(Clone, Debug)]
pub struct KfUpdateResult {
    pub estimate: StateEstimate,
    /// Innovation y = z − h(x')
    pub innovation: DVec,
    /// Innovation covariance S = H·P·Hᵀ + R
    pub innovation_cov: DMat,
    /// Kalman gain K
    pub kalman_gain: DMat,
    /// Squared Mahalanobis distance yᵀ·S⁻¹·y
    pub d2: f64,
}

/// Predict a state estimate forward by `dt` seconds.
pub fn predict(
    state: &StateEstimate,
    model: &MotionModel,
    dt: f64,
) -> Result<StateEstimate, TrackerError> {
    check_dim(model.dim(), state)?;
    let f = model.transition_matrix(&state.mean, dt);
    let q = model.process_noise(dt);
    let mean = model.propagate(&state.mean, dt);
    let cov = &f * &state.cov * f.transpose() + q;
    Ok(StateEstimate::new(mean, symmetrize(&cov)))
}

// ---------------------------------------------------------------------------
// Linearization of the measurement function around a predicted state
// ---------------------------------------------------------------------------

/// Measurement-side quantities evaluated once at a predicted state.
#[derive(Clone, Debug)]
pub struct Linearization {
    /// Expected measurement h(x')
    pub predicted_meas: DVec,
    /// Jacobian H = ∂h/∂x at x'
    pub jacobian: DMat,
    /// Innovation covariance S
    pub innovation_cov: DMat,
    /// S⁻¹
    pub innovation_cov_inv: DMat,
    /// ln det S
    log_det: f64,
}

impl Linearization {
    /// Measurement dimension (degrees of freedom of the innovation).
    pub fn dim(&self) -> usize {
        self.predicted_meas.len()
    }

    /// Innovation of a measurement vector `z`, azimuth wrapped.
    pub fn residual(&self, z: &DVec, obs: &SphericalObservation) -> DVec {
        obs.innovation(z, &self.predicted_meas)
    }

    /// Squared Mahalanobis distance yᵀ·S⁻¹·y.
    pub fn mahalanobis(&self, y: &DVec) -> f64 {
        y.dot(&(&self.innovation_cov_inv * y))
    }

    /// Gaussian density N(y; 0, S).
    pub fn likelihood(&self, y: &DVec) -> f64 {
        self.log_likelihood(y).exp()
    }

    /// ln N(y; 0, S).
    pub fn log_likelihood(&self, y: &DVec) -> f64 {
        let m = self.dim() as f64;
        let log_norm = 0.5 * (m * (2.0 * std::f64::consts::PI).ln() + self.log_det);
        -0.5 * self.mahalanobis(y) - log_norm
    }

    /// Kalman gain K = P'·Hᵀ·S⁻¹ for the predicted covariance.
    pub fn gain(&self, predicted: &StateEstimate) -> DMat {
        &predicted.cov * self.jacobian.transpose() * &self.innovation_cov_inv
    }
}

/// Evaluate h, H and S at a predicted state.
///
/// Fails with [`TrackerError::SingularInnovationCovariance`] when S is not
/// positive definite to working precision.
pub fn linearize(
    predicted: &StateEstimate,
    obs: &SphericalObservation,
) -> Result<Linearization, TrackerError> {
    if predicted.cov.nrows() != predicted.dim() || predicted.cov.ncols() != predicted.dim() {
        return Err(TrackerError::DimensionMismatch {
            expected: predicted.dim(),
            actual: predicted.cov.nrows(),
        });
    }
    let h = obs.jacobian(&predicted.mean);
    let s = symmetrize(&(&h * &predicted.cov * h.transpose() + obs.noise_cov()));

    let eig = s.symmetric_eigenvalues();
    let max = eig.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = eig.iter().copied().fold(f64::INFINITY, f64::min);
    if !(max.is_finite() && min > max * SINGULAR_RCOND && min > 0.0) {
        return Err(TrackerError::SingularInnovationCovariance);
    }
    let chol = s
        .clone()
        .cholesky()
        .ok_or(TrackerError::SingularInnovationCovariance)?;
    let log_det = 2.0 * chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>();
    let s_inv = chol.inverse();

    Ok(Linearization {
        predicted_meas: obs.apply(&predicted.mean),
        jacobian: h,
        innovation_cov: s,
        innovation_cov_inv: s_inv,
        log_det,
    })
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// Update a predicted estimate with one measurement.
pub fn update(
    predicted: &StateEstimate,
    measurement: &Measurement,
    obs: &SphericalObservation,
) -> Result<KfUpdateResult, TrackerError> {
    let lin = linearize(predicted, obs)?;
    let y = lin.residual(&measurement.vector(obs.with_range_rate), obs);
    Ok(update_linearized(predicted, &lin, y, obs))
}

/// Update with a precomputed linearization and innovation.
pub fn update_linearized(
    predicted: &StateEstimate,
    lin: &Linearization,
    innovation: DVec,
    obs: &SphericalObservation,
) -> KfUpdateResult {
    let k = lin.gain(predicted);
    let mean = &predicted.mean + &k * &innovation;
    let cov = joseph(predicted, lin, &k, obs);
    KfUpdateResult {
        estimate: StateEstimate::new(mean, cov),
        d2: lin.mahalanobis(&innovation),
        innovation,
        innovation_cov: lin.innovation_cov.clone(),
        kalman_gain: k,
    }
}

/// Probabilistic data association update.
///
/// `weighted` holds (β_j, y_j) for every candidate measurement and `beta0` is
/// the probability that none of them originated from the target:
///
/// x = x' + K·ȳ,  ȳ = Σ β_j·y_j
/// P = β₀·P' + (1 − β₀)·P_J + K·(Σ β_j·y_j·y_jᵀ − ȳ·ȳᵀ)·Kᵀ
///
/// where `P_J` is the Joseph-form posterior of a single update.
pub fn pda_update(
    predicted: &StateEstimate,
    lin: &Linearization,
    obs: &SphericalObservation,
    beta0: f64,
    weighted: &[(f64, DVec)],
) -> StateEstimate {
    let m = lin.dim();
    let mut y_bar = DVec::zeros(m);
    let mut spread = DMat::zeros(m, m);
    for (beta, y) in weighted {
        y_bar += y * *beta;
        spread += (y * y.transpose()) * *beta;
    }
    spread -= &y_bar * y_bar.transpose();

    let k = lin.gain(predicted);
    let mean = &predicted.mean + &k * &y_bar;
    let p_joseph = joseph(predicted, lin, &k, obs);
    let cov = &predicted.cov * beta0 + p_joseph * (1.0 - beta0) + &k * spread * k.transpose();
    StateEstimate::new(mean, symmetrize(&cov))
}

fn joseph(predicted: &StateEstimate, lin: &Linearization, k: &DMat, obs: &SphericalObservation) -> DMat {
    let n = predicted.dim();
    let i_kh = DMat::identity(n, n) - k * &lin.jacobian;
    let p = &i_kh * &predicted.cov * i_kh.transpose() + k * obs.noise_cov() * k.transpose();
    symmetrize(&p)
}

fn check_dim(expected: usize, state: &StateEstimate) -> Result<(), TrackerError> {
    if state.dim() != expected {
        return Err(TrackerError::DimensionMismatch {
            expected,
            actual: state.dim(),
        });
    }
    if state.cov.nrows() != expected || state.cov.ncols() != expected {
        return Err(TrackerError::DimensionMismatch {
            expected,
            actual: state.cov.nrows(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
