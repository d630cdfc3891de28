//! Scenario definitions.
//!
//! Each scenario is a named set of targets observed by one radar at the
//! origin. All scenarios are deterministic given the same seed.

use crate::{
    radar_sim::RadarSimulator,
    replay::{GroundTruthFrame, ReplayLog, TargetState},
    target::{MotionSpec, Target},
};
use sensor_models::SensorParams;
use serde::{Deserialize, Serialize};

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// 3 targets on well-separated straight lines, light clutter
    Simple,
    /// 4 targets whose paths cross near one point at mid-scenario
    Crossing,
    /// 2 targets switching between straight flight, turns and acceleration
    Maneuver,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    /// Seconds of simulated time
    pub duration: f64,
    pub sensor: SensorParams,
    pub targets: Vec<Target>,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::Simple => Self::simple(seed),
            ScenarioKind::Crossing => Self::crossing(seed),
            ScenarioKind::Maneuver => Self::maneuver(seed),
        }
    }

    fn simple(seed: u64) -> Self {
        let targets = vec![
            Target::new(0, [-20_000., 10_000., 3_000.], [150., 0., 0.], MotionSpec::ConstantVelocity),
            Target::new(1, [15_000., -25_000., 5_000.], [0., 180., 0.], MotionSpec::ConstantVelocity),
            Target::new(2, [30_000., 30_000., 8_000.], [-120., -100., 0.], MotionSpec::ConstantVelocity),
        ];
        Scenario {
            name: "simple".into(),
            seed,
            duration: 60.0,
            sensor: SensorParams {
                clutter_per_scan: 0.5,
                ..Default::default()
            },
            targets,
        }
    }

    /// Four targets converge on (0, 25 km) at t = 30 s from the four
    /// quadrants, at different altitudes.
    fn crossing(seed: u64) -> Self {
        let centre = [0.0, 25_000.0];
        let t_cross = 30.0;
        let legs = [
            (200.0, 0.0_f64, 3_000.0),
            (180.0, 90.0, 3_500.0),
            (220.0, 180.0, 4_000.0),
            (160.0, 270.0, 4_500.0),
        ];
        let targets = legs
            .iter()
            .enumerate()
            .map(|(i, &(speed, heading_deg, alt))| {
                let h = heading_deg.to_radians();
                let v = [speed * h.cos(), speed * h.sin(), 0.0];
                let p = [centre[0] - v[0] * t_cross, centre[1] - v[1] * t_cross, alt];
                Target::new(i as u64, p, v, MotionSpec::ConstantVelocity)
            })
            .collect();
        Scenario {
            name: "crossing".into(),
            seed,
            duration: 60.0,
            sensor: SensorParams {
                clutter_per_scan: 1.0,
                ..Default::default()
            },
            targets,
        }
    }

    fn maneuver(seed: u64) -> Self {
        let weaving = MotionSpec::Segmented {
            segments: vec![
                (0.0, MotionSpec::ConstantVelocity),
                (15.0, MotionSpec::ConstantTurn { omega: 3f64.to_radians() }),
                (45.0, MotionSpec::ConstantVelocity),
                (60.0, MotionSpec::ConstantTurn { omega: -4f64.to_radians() }),
                (75.0, MotionSpec::ConstantVelocity),
            ],
        };
        let sprint = MotionSpec::Segmented {
            segments: vec![
                (0.0, MotionSpec::ConstantVelocity),
                (20.0, MotionSpec::ConstantAccel { ax: 0.0, ay: 8.0, az: 0.0 }),
                (35.0, MotionSpec::ConstantVelocity),
                (50.0, MotionSpec::ConstantAccel { ax: 0.0, ay: -6.0, az: 1.0 }),
                (65.0, MotionSpec::ConstantVelocity),
            ],
        };
        let mut late = Target::new(2, [-30_000., -30_000., 6_000.], [140., 140., 0.], MotionSpec::ConstantVelocity);
        late.appear_at = Some(30.0);

        Scenario {
            name: "maneuver".into(),
            seed,
            duration: 90.0,
            sensor: SensorParams::default(),
            targets: vec![
                Target::new(0, [-10_000., 20_000., 4_000.], [200., 0., 0.], weaving),
                Target::new(1, [20_000., -10_000., 2_000.], [0., 120., 0.], sprint),
                late,
            ],
        }
    }

    /// Run the scenario: one radar scan per `scan_period`, targets stepped
    /// between scans.
    pub fn run(&self) -> ReplayLog {
        let mut sim = RadarSimulator::new(self.sensor.clone(), self.seed);
        let mut targets = self.targets.clone();
        let dt = self.sensor.scan_period.max(1e-3);
        let n_scans = (self.duration / dt).floor() as usize + 1;

        let mut scans = Vec::with_capacity(n_scans);
        let mut ground_truth = Vec::with_capacity(n_scans);
        for k in 0..n_scans {
            let t = k as f64 * dt;
            scans.push(sim.scan(&targets, t));
            ground_truth.push(GroundTruthFrame {
                time: t,
                targets: targets
                    .iter()
                    .filter(|tg| tg.is_active(t))
                    .map(|tg| TargetState {
                        id: tg.id,
                        state: tg.state,
                    })
                    .collect(),
            });
            for target in &mut targets {
                target.step(t, dt);
            }
        }

        ReplayLog {
            scenario_name: self.name.clone(),
            seed: self.seed,
            scan_period: dt,
            scans,
            ground_truth,
        }
    }
}
