//! Target trajectory models and state propagation.
//!
//! Each target has a true state [px,py,pz,vx,vy,vz] and a `MotionSpec`
//! describing how it moves. The simulator steps each target forward in time.

use serde::{Deserialize, Serialize};

/// Describes target motion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MotionSpec {
    /// Constant velocity: no acceleration.
    ConstantVelocity,
    /// Horizontal coordinated turn. `omega` = yaw rate (rad/s), positive counter-clockwise.
    ConstantTurn { omega: f64 },
    /// Constant acceleration in m/s².
    ConstantAccel { ax: f64, ay: f64, az: f64 },
    /// Switch motion model at given sim times.
    /// `segments` is sorted by time ascending: [(t_start, MotionSpec), ...].
    /// The active spec is the last one whose t_start <= current_t.
    Segmented { segments: Vec<(f64, MotionSpec)> },
}

impl MotionSpec {
    fn advance(&self, s: &mut [f64; 6], t: f64, dt: f64) {
        match self {
            MotionSpec::ConstantVelocity => {
                s[0] += s[3] * dt;
                s[1] += s[4] * dt;
                s[2] += s[5] * dt;
            }
            MotionSpec::ConstantTurn { omega } => {
                let wt = omega * dt;
                let (sin_wt, cos_wt) = wt.sin_cos();
                let (vx, vy) = (s[3], s[4]);
                if omega.abs() < 1e-9 {
                    s[0] += vx * dt;
                    s[1] += vy * dt;
                } else {
                    s[0] += (vx * sin_wt - vy * (1.0 - cos_wt)) / omega;
                    s[1] += (vy * sin_wt + vx * (1.0 - cos_wt)) / omega;
                }
                s[2] += s[5] * dt;
                s[3] = vx * cos_wt - vy * sin_wt;
                s[4] = vx * sin_wt + vy * cos_wt;
            }
            MotionSpec::ConstantAccel { ax, ay, az } => {
                s[0] += s[3] * dt + 0.5 * ax * dt * dt;
                s[1] += s[4] * dt + 0.5 * ay * dt * dt;
                s[2] += s[5] * dt + 0.5 * az * dt * dt;
                s[3] += ax * dt;
                s[4] += ay * dt;
                s[5] += az * dt;
            }
            MotionSpec::Segmented { segments } => {
                match segments.iter().rev().find(|(t_start, _)| *t_start <= t) {
                    Some((_, spec)) => spec.advance(s, t, dt),
                    // Before first segment: CV
                    None => MotionSpec::ConstantVelocity.advance(s, t, dt),
                }
            }
        }
    }
}

/// A simulated target with ground-truth state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Target {
    pub id: u64,
    /// True state [px, py, pz, vx, vy, vz]
    pub state: [f64; 6],
    pub motion: MotionSpec,
    /// Optional: target appears at this time (no measurements before)
    pub appear_at: Option<f64>,
    /// Optional: target disappears at this time
    pub disappear_at: Option<f64>,
}

impl Target {
    pub fn new(id: u64, position: [f64; 3], velocity: [f64; 3], motion: MotionSpec) -> Self {
        Self {
            id,
            state: [
                position[0],
                position[1],
                position[2],
                velocity[0],
                velocity[1],
                velocity[2],
            ],
            motion,
            appear_at: None,
            disappear_at: None,
        }
    }

    /// Propagate true state from `t` by `dt` seconds.
    pub fn step(&mut self, t: f64, dt: f64) {
        self.motion.advance(&mut self.state, t, dt);
    }

    /// True if target is active at time `t`.
    pub fn is_active(&self, t: f64) -> bool {
        self.appear_at.map_or(true, |appear| t >= appear)
            && self.disappear_at.map_or(true, |gone| t < gone)
    }

    pub fn position(&self) -> [f64; 3] {
        [self.state[0], self.state[1], self.state[2]]
    }

    pub fn velocity(&self) -> [f64; 3] {
        [self.state[3], self.state[4], self.state[5]]
    }

    pub fn speed(&self) -> f64 {
        let [vx, vy, vz] = self.velocity();
        (vx * vx + vy * vy + vz * vz).sqrt()
    }
}
