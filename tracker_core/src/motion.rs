//! Motion models: state layout, transition f(x, dt), its Jacobian F, and
//! process noise Q.
//!
//! ## State layouts
//! Every model keeps position in `x[0..3]` and velocity in `x[3..6]`:
//! - **CV**: `[px, py, pz, vx, vy, vz]` (6)
//! - **CT**: `[px, py, pz, vx, vy, vz, ω]` (7), ω = horizontal turn rate (rad/s)
//! - **CA**: `[px, py, pz, vx, vy, vz, ax, ay, az]` (9)
//!
//! ## Process noise
//! `q` is the noise spectral density (`process_noise_intensity`).
//! - CV, white-noise acceleration per axis: `q·[[dt³/3, dt²/2], [dt²/2, dt]]`
//! - CA, white-noise jerk per axis:
//!   `q·[[dt⁵/20, dt⁴/8, dt³/6], [dt⁴/8, dt³/3, dt²/2], [dt³/6, dt²/2, dt]]`
//! - CT: the CV blocks plus `q·TURN_RATE_NOISE_SCALE·dt` on ω
//!
//! The CT transition is nonlinear in ω; [`MotionModel::transition_matrix`]
//! returns the Jacobian evaluated at the current state (EKF linearization).

use crate::types::{DMat, DVec};
use serde::{Deserialize, Serialize};

/// Scale from position noise density to turn-rate noise density.
pub const TURN_RATE_NOISE_SCALE: f64 = 1e-4;

/// Below this |ω| the CT model uses the ω → 0 series limit.
const OMEGA_EPS: f64 = 1e-6;

/// Which kinematic model a track runs. Resolved once when the track is born.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MotionModelKind {
    ConstantVelocity,
    ConstantAcceleration,
    ConstantTurn,
}

impl MotionModelKind {
    /// State dimension for this model.
    pub fn dim(self) -> usize {
        match self {
            MotionModelKind::ConstantVelocity => 6,
            MotionModelKind::ConstantTurn => 7,
            MotionModelKind::ConstantAcceleration => 9,
        }
    }

    /// Short label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            MotionModelKind::ConstantVelocity => "CV",
            MotionModelKind::ConstantAcceleration => "CA",
            MotionModelKind::ConstantTurn => "CT",
        }
    }
}

/// A motion model instance: kind plus process noise intensity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionModel {
    pub kind: MotionModelKind,
    pub process_noise_intensity: f64,
}

impl MotionModel {
    pub fn new(kind: MotionModelKind, process_noise_intensity: f64) -> Self {
        Self {
            kind,
            process_noise_intensity,
        }
    }

    pub fn dim(&self) -> usize {
        self.kind.dim()
    }

    /// Propagate the state mean through the (possibly nonlinear) transition f(x, dt).
    pub fn propagate(&self, x: &DVec, dt: f64) -> DVec {
        match self.kind {
            MotionModelKind::ConstantVelocity | MotionModelKind::ConstantAcceleration => {
                self.transition_matrix(x, dt) * x
            }
            MotionModelKind::ConstantTurn => ct_propagate(x, dt),
        }
    }

    /// Transition matrix F(dt). For CT this is the Jacobian ∂f/∂x at `x`.
    pub fn transition_matrix(&self, x: &DVec, dt: f64) -> DMat {
        match self.kind {
            MotionModelKind::ConstantVelocity => {
                let mut f = DMat::identity(6, 6);
                for i in 0..3 {
                    f[(i, i + 3)] = dt;
                }
                f
            }
            MotionModelKind::ConstantAcceleration => {
                let mut f = DMat::identity(9, 9);
                let half_dt2 = 0.5 * dt * dt;
                for i in 0..3 {
                    f[(i, i + 3)] = dt;
                    f[(i, i + 6)] = half_dt2;
                    f[(i + 3, i + 6)] = dt;
                }
                f
            }
            MotionModelKind::ConstantTurn => ct_jacobian(x, dt),
        }
    }

    /// Process noise Q(dt). Positive semi-definite for all dt ≥ 0, zero at dt = 0.
    pub fn process_noise(&self, dt: f64) -> DMat {
        let q = self.process_noise_intensity;
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        match self.kind {
            MotionModelKind::ConstantVelocity | MotionModelKind::ConstantTurn => {
                let n = self.dim();
                let mut qm = DMat::zeros(n, n);
                for i in 0..3usize {
                    qm[(i, i)] = q * dt3 / 3.0;
                    qm[(i, i + 3)] = q * dt2 / 2.0;
                    qm[(i + 3, i)] = q * dt2 / 2.0;
                    qm[(i + 3, i + 3)] = q * dt;
                }
                if self.kind == MotionModelKind::ConstantTurn {
                    qm[(6, 6)] = q * TURN_RATE_NOISE_SCALE * dt;
                }
                qm
            }
            MotionModelKind::ConstantAcceleration => {
                let dt4 = dt3 * dt;
                let dt5 = dt4 * dt;
                let mut qm = DMat::zeros(9, 9);
                #[rustfmt::skip]
                let block = [
                    [dt5 / 20.0, dt4 / 8.0, dt3 / 6.0],
                    [dt4 / 8.0,  dt3 / 3.0, dt2 / 2.0],
                    [dt3 / 6.0,  dt2 / 2.0, dt       ],
                ];
                for axis in 0..3usize {
                    for (r, row) in block.iter().enumerate() {
                        for (c, v) in row.iter().enumerate() {
                            qm[(axis + 3 * r, axis + 3 * c)] = q * v;
                        }
                    }
                }
                qm
            }
        }
    }
}

/// (sin(ωT)/ω, (1 − cos(ωT))/ω) with the ω → 0 limit.
fn turn_coefficients(omega: f64, dt: f64) -> (f64, f64) {
    if omega.abs() < OMEGA_EPS {
        (dt, 0.5 * omega * dt * dt)
    } else {
        let (s, c) = (omega * dt).sin_cos();
        (s / omega, (1.0 - c) / omega)
    }
}

fn ct_propagate(x: &DVec, dt: f64) -> DVec {
    let omega = x[6];
    let (s_o, c_o) = turn_coefficients(omega, dt);
    let (s, c) = (omega * dt).sin_cos();
    let (vx, vy) = (x[3], x[4]);

    let mut out = x.clone();
    out[0] = x[0] + s_o * vx - c_o * vy;
    out[1] = x[1] + c_o * vx + s_o * vy;
    out[2] = x[2] + x[5] * dt;
    out[3] = c * vx - s * vy;
    out[4] = s * vx + c * vy;
    out
}

fn ct_jacobian(x: &DVec, dt: f64) -> DMat {
    let omega = x[6];
    let (s_o, c_o) = turn_coefficients(omega, dt);
    let (s, c) = (omega * dt).sin_cos();
    let (vx, vy) = (x[3], x[4]);

    // d/dω of sin(ωT)/ω and (1 − cos(ωT))/ω
    let (ds_o, dc_o) = if omega.abs() < OMEGA_EPS {
        (0.0, 0.5 * dt * dt)
    } else {
        let w2 = omega * omega;
        (
            (dt * c * omega - s) / w2,
            (dt * s * omega - (1.0 - c)) / w2,
        )
    };

    let mut f = DMat::identity(7, 7);
    f[(0, 3)] = s_o;
    f[(0, 4)] = -c_o;
    f[(1, 3)] = c_o;
    f[(1, 4)] = s_o;
    f[(2, 5)] = dt;
    f[(3, 3)] = c;
    f[(3, 4)] = -s;
    f[(4, 3)] = s;
    f[(4, 4)] = c;

    f[(0, 6)] = ds_o * vx - dc_o * vy;
    f[(1, 6)] = dc_o * vx + ds_o * vy;
    f[(3, 6)] = -dt * s * vx - dt * c * vy;
    f[(4, 6)] = dt * c * vx - dt * s * vy;
    f
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
