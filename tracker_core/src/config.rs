//! Tracker configuration, fixed once per run before the first scan.
//!
//! # Track initiation presets
//! The preset decides which motion model newly born tracks run, unless
//! `motion_model` overrides it explicitly:
//!
//! | preset    | model                 | state                                   |
//! |-----------|-----------------------|-----------------------------------------|
//! | `3-state` | constant velocity     | `[x y z vx vy vz]`                      |
//! | `5-state` | constant turn         | `[x y z vx vy vz ω]` (x, y, vx, vy, ω turn in the horizontal plane) |
//! | `7-state` | constant acceleration | `[x y z vx vy vz ax ay az]`             |
//!
//! This mapping is part of the output contract: track histories produced
//! under different mappings are not comparable.

use crate::{error::TrackerError, motion::MotionModelKind};
use sensor_models::observation::MeasurementNoise;
use serde::{Deserialize, Serialize};

/// Named track-initiation presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitiationPreset {
    #[default]
    #[serde(rename = "3-state")]
    ThreeState,
    #[serde(rename = "5-state")]
    FiveState,
    #[serde(rename = "7-state")]
    SevenState,
}

impl InitiationPreset {
    /// Motion model a preset selects for new tracks.
    pub fn motion_model(self) -> MotionModelKind {
        match self {
            InitiationPreset::ThreeState => MotionModelKind::ConstantVelocity,
            InitiationPreset::FiveState => MotionModelKind::ConstantTurn,
            InitiationPreset::SevenState => MotionModelKind::ConstantAcceleration,
        }
    }
}

/// Which association strategy the scan processor runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssociationStrategy {
    /// Global nearest neighbour via optimal (Hungarian) assignment
    #[default]
    OptimalAssignment,
    /// Joint probabilistic data association
    ProbabilisticJoint,
}

/// Closed interval `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }
}

/// Physical gate bounds and the statistical gate confidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Chi-squared confidence level for the Mahalanobis gate
    pub confidence: f64,
    /// Implied target speed (m/s)
    pub speed: Interval,
    /// Altitude, i.e. cartesian z (m)
    pub altitude: Interval,
    /// Measured range (m)
    pub range: Interval,
    /// Measured azimuth (deg)
    pub azimuth: Interval,
    /// Measured elevation (deg)
    pub elevation: Interval,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            confidence: 0.99,
            speed: Interval::new(0.0, 1_000.0),
            altitude: Interval::new(-1_000.0, 30_000.0),
            range: Interval::new(0.0, 500_000.0),
            azimuth: Interval::new(0.0, 360.0),
            elevation: Interval::new(-90.0, 90.0),
        }
    }
}

/// Track lifecycle policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Consecutive hits (birth included) required for confirmation
    pub confirm_hits: u32,
    /// A track is deleted on the scan its consecutive misses reach this count
    pub deletion_misses: u32,
    /// A never-confirmed track is deleted once its age exceeds this many scans
    pub max_tentative_age: u32,
    /// Consecutive singular-S events before a track is flagged degraded
    pub degraded_after: u32,
    /// Initial velocity uncertainty (1σ, m/s)
    pub initial_velocity_std: f64,
    /// Initial acceleration uncertainty (1σ, m/s²)
    pub initial_acceleration_std: f64,
    /// Initial turn-rate uncertainty (1σ, deg/s)
    pub initial_turn_rate_std: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            confirm_hits: 3,
            deletion_misses: 5,
            max_tentative_age: 5,
            degraded_after: 3,
            initial_velocity_std: 100.0,
            initial_acceleration_std: 10.0,
            initial_turn_rate_std: 5.0,
        }
    }
}

/// Parameters for joint probabilistic association.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JpdaConfig {
    /// Probability a target is detected in a scan (P_D)
    pub detection_probability: f64,
    /// Clutter density λ (false alarms per unit measurement-space volume)
    pub clutter_density: f64,
    /// Clusters with more tracks or measurements than this fall back to hard assignment
    pub max_cluster_size: usize,
}

impl Default for JpdaConfig {
    fn default() -> Self {
        Self {
            detection_probability: 0.9,
            clutter_density: 1e-6,
            max_cluster_size: 8,
        }
    }
}

/// Complete tracker configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub initiation_preset: InitiationPreset,
    /// Explicit motion model; overrides the preset's model when set
    pub motion_model: Option<MotionModelKind>,
    pub association: AssociationStrategy,
    /// Process noise spectral density ("plant noise")
    pub process_noise_intensity: f64,
    pub measurement_noise: MeasurementNoise,
    /// Treat the auxiliary field as an observed range rate
    pub use_range_rate: bool,
    pub gate: GateConfig,
    pub lifecycle: LifecycleConfig,
    pub jpda: JpdaConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            initiation_preset: InitiationPreset::default(),
            motion_model: None,
            association: AssociationStrategy::default(),
            process_noise_intensity: 20.0,
            measurement_noise: MeasurementNoise::default(),
            use_range_rate: false,
            gate: GateConfig::default(),
            lifecycle: LifecycleConfig::default(),
            jpda: JpdaConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Motion model assigned to new tracks.
    pub fn resolved_motion_model(&self) -> MotionModelKind {
        self.motion_model
            .unwrap_or_else(|| self.initiation_preset.motion_model())
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), TrackerError> {
        let bad = |msg: String| Err(TrackerError::InvalidConfig(msg));

        if !(self.process_noise_intensity >= 0.0) {
            return bad(format!(
                "process_noise_intensity must be >= 0, got {}",
                self.process_noise_intensity
            ));
        }
        let n = &self.measurement_noise;
        for (name, v) in [
            ("range_std", n.range_std),
            ("azimuth_std", n.azimuth_std),
            ("elevation_std", n.elevation_std),
            ("range_rate_std", n.range_rate_std),
        ] {
            if !(v > 0.0) {
                return bad(format!("measurement_noise.{name} must be > 0, got {v}"));
            }
        }
        let g = &self.gate;
        if !(g.confidence > 0.0 && g.confidence < 1.0) {
            return bad(format!("gate.confidence must lie in (0, 1), got {}", g.confidence));
        }
        for (name, iv) in [
            ("speed", g.speed),
            ("altitude", g.altitude),
            ("range", g.range),
            ("azimuth", g.azimuth),
            ("elevation", g.elevation),
        ] {
            if !(iv.min <= iv.max) {
                return bad(format!("gate.{name} interval is empty: [{}, {}]", iv.min, iv.max));
            }
        }
        let l = &self.lifecycle;
        if l.confirm_hits == 0 || l.deletion_misses == 0 {
            return bad("lifecycle confirm_hits and deletion_misses must be >= 1".into());
        }
        let j = &self.jpda;
        if !(j.detection_probability > 0.0 && j.detection_probability <= 1.0) {
            return bad(format!(
                "jpda.detection_probability must lie in (0, 1], got {}",
                j.detection_probability
            ));
        }
        if !(j.clutter_density > 0.0) {
            return bad(format!("jpda.clutter_density must be > 0, got {}", j.clutter_density));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn preset_mapping_is_fixed() {
        assert_eq!(
            InitiationPreset::ThreeState.motion_model(),
            MotionModelKind::ConstantVelocity
        );
        assert_eq!(
            InitiationPreset::FiveState.motion_model(),
            MotionModelKind::ConstantTurn
        );
        assert_eq!(
            InitiationPreset::SevenState.motion_model(),
            MotionModelKind::ConstantAcceleration
        );
    }

    #[test]
    fn explicit_model_overrides_preset() {
        let cfg = TrackerConfig {
            initiation_preset: InitiationPreset::SevenState,
            motion_model: Some(MotionModelKind::ConstantVelocity),
            ..Default::default()
        };
        assert_eq!(cfg.resolved_motion_model(), MotionModelKind::ConstantVelocity);
    }

    #[test]
    fn rejects_inverted_interval_and_negative_noise() {
        let mut cfg = TrackerConfig::default();
        cfg.gate.range = Interval::new(10.0, 1.0);
        assert!(cfg.validate().is_err());

        let cfg = TrackerConfig {
            process_noise_intensity: -1.0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(TrackerError::InvalidConfig(_))));
    }
}
