//! Radar measurement simulator.
//!
//! Generates one scan per call for a stationary radar at the origin with:
//! - Gaussian range / azimuth / elevation / range-rate noise
//! - Miss probability (1 - P_D)
//! - Poisson clutter spread uniformly over the coverage disc

use crate::target::Target;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Poisson};
use sensor_models::{coords, SensorParams};
use tracker_core::{Measurement, Scan};

/// Clutter elevation band (degrees).
const CLUTTER_MAX_ELEVATION: f64 = 10.0;
/// Clutter range-rate band (m/s).
const CLUTTER_MAX_RANGE_RATE: f64 = 50.0;

pub struct RadarSimulator {
    pub params: SensorParams,
    rng: ChaCha8Rng,
}

/// Zero-mean normal sampler; a zero or invalid std yields no noise.
fn gaussian(rng: &mut ChaCha8Rng, std: f64) -> f64 {
    match Normal::new(0.0, std) {
        Ok(n) if std > 0.0 => n.sample(rng),
        _ => 0.0,
    }
}

impl RadarSimulator {
    pub fn new(params: SensorParams, seed: u64) -> Self {
        Self {
            params,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Produce the scan the radar reports at time `t`.
    pub fn scan(&mut self, targets: &[Target], t: f64) -> Scan {
        let mut measurements = Vec::new();
        let noise = self.params.noise;

        for target in targets {
            if !target.is_active(t) {
                continue;
            }
            // Miss detection?
            if self.rng.gen::<f64>() > self.params.p_detection {
                continue;
            }
            let [x, y, z] = target.position();
            let truth = coords::to_spherical(x, y, z);
            if truth.range > self.params.max_range {
                continue;
            }

            let [vx, vy, vz] = target.velocity();
            let range_rate = if truth.range > 0.0 {
                (x * vx + y * vy + z * vz) / truth.range
            } else {
                0.0
            };

            let range = (truth.range + gaussian(&mut self.rng, noise.range_std)).max(0.0);
            let azimuth = truth.azimuth + gaussian(&mut self.rng, noise.azimuth_std);
            let elevation = truth.elevation + gaussian(&mut self.rng, noise.elevation_std);
            let rr = range_rate + gaussian(&mut self.rng, noise.range_rate_std);
            measurements.push(Measurement::new(range, azimuth, elevation, t, Some(rr)));
        }

        let n_clutter = match Poisson::new(self.params.clutter_per_scan) {
            Ok(p) if self.params.clutter_per_scan > 0.0 => p.sample(&mut self.rng) as usize,
            _ => 0,
        };
        for _ in 0..n_clutter {
            let range = self.params.max_range * self.rng.gen::<f64>().sqrt();
            let azimuth = self.rng.gen_range(0.0..360.0);
            let elevation = self.rng.gen_range(0.0..CLUTTER_MAX_ELEVATION);
            let rr = self
                .rng
                .gen_range(-CLUTTER_MAX_RANGE_RATE..CLUTTER_MAX_RANGE_RATE);
            measurements.push(Measurement::new(range, azimuth, elevation, t, Some(rr)));
        }

        measurements.shuffle(&mut self.rng);
        Scan::new(t, measurements)
    }
}
