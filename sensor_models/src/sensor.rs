//! Sensor parameters for a single stationary radar at the frame origin.

use crate::observation::MeasurementNoise;
use serde::{Deserialize, Serialize};

/// Physical configuration of the radar producing the scan stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SensorParams {
    /// Maximum detection range (meters)
    pub max_range: f64,
    /// Probability of detection per target per scan
    pub p_detection: f64,
    /// Mean number of clutter returns per scan
    pub clutter_per_scan: f64,
    /// Time between scans (seconds)
    pub scan_period: f64,
    /// Measurement noise on each reported quantity
    pub noise: MeasurementNoise,
}

impl Default for SensorParams {
    fn default() -> Self {
        Self {
            max_range: 100_000.0, // 100 km
            p_detection: 0.9,
            clutter_per_scan: 0.5,
            scan_period: 1.0,
            noise: MeasurementNoise::default(),
        }
    }
}
