//! Scan processor: the full tracking cycle for one scan.
//!
//! # Processing steps per scan
//! 1. Reject scans older than the last processed scan (store untouched)
//! 2. Predict all tracks to the scan timestamp (parallel, pure)
//! 3. Gate every track against every measurement (parallel, pure)
//! 4. Associate: GNN (Hungarian per cluster) or JPDA (joint events per cluster)
//! 5. Compute Kalman / PDA updates for associated tracks (parallel, pure)
//! 6. Commit estimates and advance each track's lifecycle
//! 7. Birth tentative tracks for unassigned measurements
//! 8. Prune deleted tracks and publish the snapshot
//!
//! Steps 2–5 never write to the store, so a scan is either committed as a
//! whole or (on error) leaves the store exactly as it was.

use crate::{
    association::{self, AssociationResult},
    config::TrackerConfig,
    error::{ScanError, TrackerError},
    gating::{self, TrackGate},
    kf,
    snapshot::TrackSnapshot,
    track::HistoryEntry,
    track_manager::{TrackManager, TrackStore, Transition},
    types::{Measurement, Scan, StateEstimate, TrackId},
};
use rayon::prelude::*;
use sensor_models::observation::SphericalObservation;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Wall-clock time spent in each phase, in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanTiming {
    pub predict_us: u64,
    pub gate_us: u64,
    pub assign_us: u64,
    pub update_us: u64,
    pub manage_us: u64,
    pub total_us: u64,
}

/// Outputs of one scan cycle.
#[derive(Clone, Debug)]
pub struct ScanOutput {
    /// All active tracks after this scan
    pub snapshot: TrackSnapshot,
    /// Number of tracks born this scan
    pub births: usize,
    /// Number of tracks confirmed this scan
    pub confirmations: usize,
    /// Number of tracks deleted this scan
    pub deletions: usize,
    /// Identifiers of the tracks deleted this scan
    pub deleted: Vec<TrackId>,
    /// Measurements that no track claimed (each seeded a new track)
    pub unassigned_measurements: Vec<Measurement>,
    /// Tracks whose innovation covariance was singular this scan
    pub singular: usize,
    pub timing: ScanTiming,
}

/// What happened to one track during the update phase.
enum Outcome {
    Hit {
        estimate: StateEstimate,
        measurement: Option<Measurement>,
    },
    Miss,
    Singular,
}

/// Drives predict → gate → associate → update → lifecycle over scans in
/// nondecreasing time order.
#[derive(Clone, Debug)]
pub struct ScanProcessor {
    config: TrackerConfig,
    obs: SphericalObservation,
    manager: TrackManager,
    gate_threshold: f64,
    last_time: Option<f64>,
}

impl ScanProcessor {
    /// Create a processor; the configuration is validated and then fixed.
    pub fn new(config: TrackerConfig) -> Result<Self, TrackerError> {
        config.validate()?;
        let obs = SphericalObservation::new(config.measurement_noise, config.use_range_rate);
        let gate_threshold = gating::chi2_threshold(obs.dim(), config.gate.confidence);
        Ok(Self {
            manager: TrackManager::new(&config),
            obs,
            gate_threshold,
            last_time: None,
            config,
        })
    }

    /// Pick up where the processor that produced `snapshot` left off.
    ///
    /// The returned store holds the snapshot's tracks; scans older than the
    /// snapshot time are rejected and identifiers continue from the
    /// snapshot's `next_id`.
    pub fn resume(
        config: TrackerConfig,
        snapshot: &TrackSnapshot,
    ) -> Result<(Self, TrackStore), TrackerError> {
        if !snapshot.time.is_finite() {
            return Err(TrackerError::InvalidConfig(format!(
                "snapshot time {} is not finite",
                snapshot.time
            )));
        }
        let mut processor = Self::new(config)?;
        let store = TrackStore::restore(snapshot);
        processor.manager.reserve_from(TrackId(snapshot.next_id));
        processor.manager.reserve_ids(&store);
        processor.last_time = Some(snapshot.time);
        debug!(
            time = snapshot.time,
            tracks = store.len(),
            next_id = %processor.manager.peek_next_id(),
            "resumed from snapshot"
        );
        Ok((processor, store))
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Timestamp of the last committed scan.
    pub fn last_time(&self) -> Option<f64> {
        self.last_time
    }

    pub fn gate_threshold(&self) -> f64 {
        self.gate_threshold
    }

    /// Process one scan against `store`.
    pub fn process_scan(
        &mut self,
        store: &mut TrackStore,
        scan: &Scan,
    ) -> Result<ScanOutput, ScanError> {
        let start_total = Instant::now();
        let time = scan.timestamp;
        if !time.is_finite() {
            return Err(ScanError::InvalidTimestamp(time));
        }
        if let Some(last) = self.last_time {
            if time < last {
                warn!(scan_time = time, last_time = last, "out-of-order scan rejected");
                return Err(ScanError::OutOfOrderScan {
                    scan_time: time,
                    last_time: last,
                });
            }
        }
        self.manager.reserve_ids(store);
        let mut timing = ScanTiming::default();

        // ----------------------------------------------------------------
        // Step 2: Predict all tracks to the scan time (Parallel)
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let q = self.config.process_noise_intensity;
        let predictions: Vec<(Result<StateEstimate, TrackerError>, f64)> = store
            .tracks()
            .par_iter()
            .map(|track| {
                let dt = (time - track.last_time).max(0.0);
                (kf::predict(&track.state, &track.motion(q), dt), dt)
            })
            .collect();
        timing.predict_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Step 3: Gating (Parallel)
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let obs = &self.obs;
        let gate_cfg = &self.config.gate;
        let threshold = self.gate_threshold;
        let gates: Vec<TrackGate> = store
            .tracks()
            .par_iter()
            .zip(predictions.par_iter())
            .map(|(track, (pred, dt))| match pred {
                Ok(pred) => gating::gate_track(
                    pred,
                    track.position(),
                    *dt,
                    &scan.measurements,
                    obs,
                    gate_cfg,
                    threshold,
                ),
                Err(_) => TrackGate {
                    linearization: None,
                    hits: Vec::new(),
                },
            })
            .collect();
        timing.gate_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Step 4: Association
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let result = association::associate(
            self.config.association,
            &gates,
            scan.len(),
            &self.config.jpda,
            self.config.gate.confidence,
        );
        timing.assign_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Step 5: Kalman / PDA updates (Parallel)
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let mut assigned: Vec<Option<usize>> = vec![None; gates.len()];
        if let AssociationResult::Hard(a) = &result {
            for &(ti, mi) in &a.pairs {
                assigned[ti] = Some(mi);
            }
        }
        let outcomes: Vec<Outcome> = (0..gates.len())
            .into_par_iter()
            .map(|ti| {
                let gate = &gates[ti];
                let (Ok(pred), Some(lin)) = (&predictions[ti].0, gate.linearization.as_ref()) else {
                    return Outcome::Singular;
                };
                match &result {
                    AssociationResult::Hard(_) => {
                        let Some(mi) = assigned[ti] else {
                            return Outcome::Miss;
                        };
                        let Some(hit) = gate.hits.iter().find(|h| h.meas_idx == mi) else {
                            return Outcome::Miss;
                        };
                        let res = kf::update_linearized(pred, lin, hit.innovation.clone(), obs);
                        Outcome::Hit {
                            estimate: res.estimate,
                            measurement: Some(scan.measurements[mi].clone()),
                        }
                    }
                    AssociationResult::Soft(soft) => {
                        let w = &soft.weights[ti];
                        if w.meas_probs.is_empty() {
                            return Outcome::Miss;
                        }
                        let weighted: Vec<_> = w
                            .meas_probs
                            .iter()
                            .filter_map(|&(mi, beta)| {
                                gate.hits
                                    .iter()
                                    .find(|h| h.meas_idx == mi)
                                    .map(|h| (beta, h.innovation.clone()))
                            })
                            .collect();
                        let estimate = kf::pda_update(pred, lin, obs, w.miss_prob, &weighted);
                        // The dominant measurement is kept for the detailed log.
                        let best = w
                            .meas_probs
                            .iter()
                            .copied()
                            .max_by(|a, b| a.1.total_cmp(&b.1))
                            .filter(|&(_, beta)| beta > w.miss_prob)
                            .map(|(mi, _)| scan.measurements[mi].clone());
                        Outcome::Hit {
                            estimate,
                            measurement: best,
                        }
                    }
                }
            })
            .collect();
        timing.update_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Step 6: Commit and advance lifecycle (Parallel, per track)
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let manager = &self.manager;
        let transitions: Vec<(Option<Transition>, bool)> = store
            .tracks_mut()
            .par_iter_mut()
            .zip(outcomes.into_par_iter().zip(predictions.into_par_iter()))
            .map(|(track, (outcome, (pred, _)))| {
                let predicted = pred.unwrap_or_else(|_| track.state.clone());
                track.last_time = time.max(track.last_time);
                match outcome {
                    Outcome::Hit {
                        estimate,
                        measurement,
                    } => {
                        track.state = estimate.clone();
                        track.push_history(HistoryEntry {
                            timestamp: time,
                            measurement,
                            predicted,
                            filtered: estimate,
                        });
                        (manager.register_hit(track), false)
                    }
                    Outcome::Miss | Outcome::Singular => {
                        let singular = matches!(outcome, Outcome::Singular);
                        if singular {
                            debug!(track = %track.id, "singular innovation covariance; treated as miss");
                            manager.register_singular(track);
                        }
                        track.state = predicted.clone();
                        track.push_history(HistoryEntry {
                            timestamp: time,
                            measurement: None,
                            predicted: predicted.clone(),
                            filtered: predicted,
                        });
                        (manager.register_miss(track), singular)
                    }
                }
            })
            .collect();
        let confirmations = transitions
            .iter()
            .filter(|(t, _)| *t == Some(Transition::Confirmed))
            .count();
        let singular = transitions.iter().filter(|(_, s)| *s).count();

        // ----------------------------------------------------------------
        // Step 7: Birth tentative tracks for unassigned measurements
        // ----------------------------------------------------------------
        let unassigned_measurements: Vec<Measurement> = result
            .unassigned_measurements()
            .iter()
            .map(|&mi| scan.measurements[mi].clone())
            .collect();
        let mut births = 0;
        for meas in &unassigned_measurements {
            let track = self.manager.birth(meas, time);
            store.insert(track);
            births += 1;
        }

        // ----------------------------------------------------------------
        // Step 8: Prune deleted tracks
        // ----------------------------------------------------------------
        let deleted = store.prune_deleted();
        timing.manage_us = t0.elapsed().as_micros() as u64;

        self.last_time = Some(time);
        timing.total_us = start_total.elapsed().as_micros() as u64;
        debug!(
            time,
            measurements = scan.len(),
            tracks = store.len(),
            births,
            confirmations,
            deletions = deleted.len(),
            total_us = timing.total_us,
            "scan processed"
        );

        let mut snapshot = store.snapshot(time);
        snapshot.next_id = self.manager.peek_next_id().0;

        Ok(ScanOutput {
            snapshot,
            births,
            confirmations,
            deletions: deleted.len(),
            deleted,
            unassigned_measurements,
            singular,
            timing,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AssociationStrategy, LifecycleConfig},
        track::TrackStatus,
        types::DMat,
    };

    fn scan_at(t: f64, positions: &[(f64, f64, f64)]) -> Scan {
        Scan::new(
            t,
            positions
                .iter()
                .map(|&(x, y, z)| Measurement::from_cartesian(x, y, z, t, None))
                .collect(),
        )
    }

    #[test]
    fn births_then_absorbs() {
        let mut proc = ScanProcessor::new(TrackerConfig::default()).unwrap();
        let mut store = TrackStore::new();

        let out1 = proc
            .process_scan(
                &mut store,
                &scan_at(0.0, &[(5000.0, 8000.0, 500.0), (-9000.0, 3000.0, 900.0)]),
            )
            .unwrap();
        assert_eq!(out1.births, 2);

        let out2 = proc
            .process_scan(
                &mut store,
                &scan_at(1.0, &[(5010.0, 8000.0, 500.0), (-9000.0, 3010.0, 900.0)]),
            )
            .unwrap();
        assert_eq!(out2.births, 0, "existing tracks absorb measurements");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn confirmation_after_three_scans() {
        for strategy in [
            AssociationStrategy::OptimalAssignment,
            AssociationStrategy::ProbabilisticJoint,
        ] {
            let mut proc = ScanProcessor::new(TrackerConfig {
                association: strategy,
                ..Default::default()
            })
            .unwrap();
            let mut store = TrackStore::new();
            let mut confirmed_at = None;
            for k in 0..5 {
                let t = k as f64;
                let out = proc
                    .process_scan(&mut store, &scan_at(t, &[(6000.0 + 50.0 * t, 6000.0, 300.0)]))
                    .unwrap();
                if out.confirmations > 0 && confirmed_at.is_none() {
                    confirmed_at = Some(k);
                }
            }
            assert_eq!(confirmed_at, Some(2), "{strategy:?}");
            assert_eq!(store.len(), 1);
            assert_eq!(store.tracks()[0].status, TrackStatus::Confirmed);
        }
    }

    #[test]
    fn out_of_order_scan_leaves_store_unchanged() {
        let mut proc = ScanProcessor::new(TrackerConfig::default()).unwrap();
        let mut store = TrackStore::new();
        proc.process_scan(&mut store, &scan_at(5.0, &[(1000.0, 1000.0, 100.0)]))
            .unwrap();
        let before = store.clone();
        let err = proc
            .process_scan(&mut store, &scan_at(4.0, &[(1000.0, 1000.0, 100.0)]))
            .unwrap_err();
        assert_eq!(
            err,
            ScanError::OutOfOrderScan {
                scan_time: 4.0,
                last_time: 5.0
            }
        );
        assert_eq!(store, before);
        assert_eq!(proc.last_time(), Some(5.0));
    }

    #[test]
    fn empty_scan_is_a_noop_for_empty_store() {
        let mut proc = ScanProcessor::new(TrackerConfig::default()).unwrap();
        let mut store = TrackStore::new();
        let out = proc.process_scan(&mut store, &Scan::new(0.0, vec![])).unwrap();
        assert_eq!(out.births, 0);
        assert!(out.snapshot.tracks.is_empty());
    }

    #[test]
    fn non_finite_timestamp_is_rejected() {
        let mut proc = ScanProcessor::new(TrackerConfig::default()).unwrap();
        let mut store = TrackStore::new();
        assert!(matches!(
            proc.process_scan(&mut store, &Scan::new(f64::NAN, vec![])),
            Err(ScanError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn singular_innovation_is_booked_as_miss_then_degrades() {
        let mut proc = ScanProcessor::new(TrackerConfig {
            process_noise_intensity: 0.0,
            lifecycle: LifecycleConfig {
                degraded_after: 2,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        let mut store = TrackStore::new();
        proc.process_scan(&mut store, &scan_at(0.0, &[(5000.0, 8000.0, 500.0)]))
            .unwrap();

        // All uncertainty along x: S has an eigenvalue spread far past any
        // usable condition number.
        let n = store.tracks()[0].state.dim();
        let mut cov = DMat::zeros(n, n);
        cov[(0, 0)] = 1e40;
        store.tracks_mut()[0].state.cov = cov;

        let out = proc.process_scan(&mut store, &Scan::new(1.0, vec![])).unwrap();
        assert_eq!(out.singular, 1);
        let track = &store.tracks()[0];
        assert_eq!(track.misses, 1);
        assert_eq!(track.hits, 0);
        assert_eq!(track.status, TrackStatus::Coasting);
        assert_eq!(track.singular_streak, 1);
        assert!(!track.degraded);
        assert!(track.last_entry().is_some_and(|e| e.measurement.is_none()));

        let out = proc.process_scan(&mut store, &Scan::new(2.0, vec![])).unwrap();
        assert_eq!(out.singular, 1);
        let track = &store.tracks()[0];
        assert_eq!(track.misses, 2);
        assert!(track.degraded);
        assert!(out.snapshot.tracks[0].degraded);
    }

    #[test]
    fn resume_continues_ids_and_time() {
        let mut proc = ScanProcessor::new(TrackerConfig::default()).unwrap();
        let mut store = TrackStore::new();
        let out = proc
            .process_scan(
                &mut store,
                &scan_at(3.0, &[(5000.0, 8000.0, 500.0), (-9000.0, 3000.0, 900.0)]),
            )
            .unwrap();
        // Drop the newest track from the snapshot as if it had been deleted.
        let mut snapshot = out.snapshot;
        snapshot.tracks.retain(|r| r.id == TrackId(1));
        assert_eq!(snapshot.next_id, 3);

        let (mut resumed, mut restored) =
            ScanProcessor::resume(TrackerConfig::default(), &snapshot).unwrap();
        assert_eq!(resumed.last_time(), Some(3.0));
        assert!(matches!(
            resumed.process_scan(&mut restored, &Scan::new(2.0, vec![])),
            Err(ScanError::OutOfOrderScan { .. })
        ));
        resumed
            .process_scan(&mut restored, &scan_at(4.0, &[(20_000.0, -20_000.0, 800.0)]))
            .unwrap();
        let ids: Vec<TrackId> = restored.tracks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![TrackId(1), TrackId(3)]);
    }

    #[test]
    fn resume_rejects_non_finite_snapshot_time() {
        let snapshot = TrackSnapshot {
            time: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            ScanProcessor::resume(TrackerConfig::default(), &snapshot),
            Err(TrackerError::InvalidConfig(_))
        ));
    }
}
