//! Track lifecycle management: birth, confirmation, coasting, deletion.
//!
//! # Track Management Policy
//! - **Birth**: each unassigned measurement spawns a tentative track; birth
//!   counts as the first hit.
//! - **Confirmation**: a track is confirmed on the scan its consecutive hits
//!   reach `confirm_hits`.
//! - **Coasting**: any scan without an update moves a tentative or
//!   confirmed track to coasting; the next update brings it back.
//! - **Deletion**: on the scan consecutive misses reach `deletion_misses`,
//!   or once a never-confirmed track's age exceeds `max_tentative_age`.
//!
//! The manager is the single writer of status and counters. The active set
//! itself lives in a [`TrackStore`] owned by the caller and passed by
//! reference into every scan cycle.

use crate::{
    config::{LifecycleConfig, TrackerConfig},
    motion::MotionModelKind,
    snapshot::TrackSnapshot,
    track::{Track, TrackStatus},
    types::{DMat, DVec, Measurement, StateEstimate, TrackId},
};
use sensor_models::observation::{line_of_sight, SphericalObservation};
use tracing::{debug, info};

/// Lifecycle event produced by a hit or miss.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Confirmed,
    Coasting,
    Resumed,
    Deleted,
}

/// Owns the identifier counter and applies lifecycle rules.
#[derive(Clone, Debug)]
pub struct TrackManager {
    pub config: LifecycleConfig,
    model: MotionModelKind,
    obs: SphericalObservation,
    next_id: u64,
}

impl TrackManager {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            config: config.lifecycle.clone(),
            model: config.resolved_motion_model(),
            obs: SphericalObservation::new(config.measurement_noise, config.use_range_rate),
            next_id: 1,
        }
    }

    /// Make sure identifiers handed out later never collide with tracks
    /// already present in `store` (e.g. after a restore).
    pub fn reserve_ids(&mut self, store: &TrackStore) {
        if let Some(max) = store.tracks().iter().map(|t| t.id.0).max() {
            self.next_id = self.next_id.max(max + 1);
        }
    }

    /// Never hand out an identifier below `next`.
    pub fn reserve_from(&mut self, next: TrackId) {
        self.next_id = self.next_id.max(next.0);
    }

    /// Identifier the next birth will receive.
    pub fn peek_next_id(&self) -> TrackId {
        TrackId(self.next_id)
    }

    fn next_track_id(&mut self) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create a new tentative track from an unassigned measurement.
    ///
    /// Position comes from the measurement's cartesian triple with the
    /// measurement noise propagated into cartesian space. Velocity lies along
    /// the line of sight when the auxiliary field carries a range rate and
    /// is zero otherwise. Higher derivatives start at zero.
    pub fn birth(&mut self, meas: &Measurement, time: f64) -> Track {
        let id = self.next_track_id();
        let n = self.model.dim();
        let c = meas.cartesian();

        let mut mean = DVec::zeros(n);
        mean[0] = c.x;
        mean[1] = c.y;
        mean[2] = c.z;
        if self.obs.with_range_rate {
            if let Some(rr) = meas.auxiliary() {
                let los = line_of_sight(c);
                for i in 0..3 {
                    mean[i + 3] = rr * los[i];
                }
            }
        }

        let mut cov = DMat::zeros(n, n);
        let pos_cov = self
            .obs
            .cartesian_cov(meas.range(), meas.azimuth(), meas.elevation());
        for r in 0..3 {
            for col in 0..3 {
                cov[(r, col)] = pos_cov[(r, col)];
            }
        }
        let vs = self.config.initial_velocity_std.powi(2);
        for i in 3..6 {
            cov[(i, i)] = vs;
        }
        match self.model {
            MotionModelKind::ConstantVelocity => {}
            MotionModelKind::ConstantTurn => {
                cov[(6, 6)] = self.config.initial_turn_rate_std.to_radians().powi(2);
            }
            MotionModelKind::ConstantAcceleration => {
                let a = self.config.initial_acceleration_std.powi(2);
                for i in 6..9 {
                    cov[(i, i)] = a;
                }
            }
        }

        let mut track = Track::new(
            id,
            self.model,
            StateEstimate::new(mean, cov),
            time,
            Some(meas.clone()),
        );
        if track.hits >= self.config.confirm_hits {
            track.status = TrackStatus::Confirmed;
            track.confirmed_once = true;
        }
        debug!(track = %id, model = self.model.label(), "track born");
        track
    }

    /// The track received an update this scan.
    pub fn register_hit(&self, track: &mut Track) -> Option<Transition> {
        track.age += 1;
        track.misses = 0;
        track.hits += 1;
        track.total_hits += 1;
        track.singular_streak = 0;
        track.degraded = false;

        let mut transition = None;
        if track.status == TrackStatus::Coasting {
            track.status = if track.confirmed_once {
                TrackStatus::Confirmed
            } else {
                TrackStatus::Tentative
            };
            transition = Some(Transition::Resumed);
        }
        if track.status == TrackStatus::Tentative && track.hits >= self.config.confirm_hits {
            track.status = TrackStatus::Confirmed;
            track.confirmed_once = true;
            info!(track = %track.id, hits = track.hits, "track confirmed");
            transition = Some(Transition::Confirmed);
        }
        self.check_tentative_age(track).or(transition)
    }

    /// The track received no update this scan.
    pub fn register_miss(&self, track: &mut Track) -> Option<Transition> {
        track.age += 1;
        track.hits = 0;
        track.misses += 1;

        if track.misses >= self.config.deletion_misses {
            track.status = TrackStatus::Deleted;
            info!(track = %track.id, misses = track.misses, "track deleted");
            return Some(Transition::Deleted);
        }
        let mut transition = None;
        if matches!(track.status, TrackStatus::Tentative | TrackStatus::Confirmed) {
            track.status = TrackStatus::Coasting;
            transition = Some(Transition::Coasting);
        }
        self.check_tentative_age(track).or(transition)
    }

    /// S was singular for this track; the caller also books a miss.
    pub fn register_singular(&self, track: &mut Track) {
        track.singular_streak += 1;
        if track.singular_streak >= self.config.degraded_after && !track.degraded {
            track.degraded = true;
            tracing::warn!(
                track = %track.id,
                streak = track.singular_streak,
                "track degraded: repeated singular innovation covariance"
            );
        }
    }

    fn check_tentative_age(&self, track: &mut Track) -> Option<Transition> {
        if !track.confirmed_once
            && track.status != TrackStatus::Deleted
            && track.age > self.config.max_tentative_age
        {
            track.status = TrackStatus::Deleted;
            info!(track = %track.id, age = track.age, "tentative track expired");
            return Some(Transition::Deleted);
        }
        None
    }
}

// ---------------------------------------------------------------------------
// TrackStore
// ---------------------------------------------------------------------------

/// The active track set, ordered by ascending track id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackStore {
    tracks: Vec<Track>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub(crate) fn tracks_mut(&mut self) -> &mut Vec<Track> {
        &mut self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks
            .binary_search_by_key(&id, |t| t.id)
            .ok()
            .map(|i| &self.tracks[i])
    }

    /// Append a newly born track. Ids are monotonic, so order is preserved.
    pub(crate) fn insert(&mut self, track: Track) {
        debug_assert!(self.tracks.last().map_or(true, |t| t.id < track.id));
        self.tracks.push(track);
    }

    /// Remove all deleted tracks, returning their ids.
    pub(crate) fn prune_deleted(&mut self) -> Vec<TrackId> {
        let removed = self
            .tracks
            .iter()
            .filter(|t| t.status == TrackStatus::Deleted)
            .map(|t| t.id)
            .collect();
        self.tracks.retain(|t| t.status != TrackStatus::Deleted);
        removed
    }

    /// Report of every active track at `time`.
    pub fn snapshot(&self, time: f64) -> TrackSnapshot {
        TrackSnapshot::from_tracks(time, &self.tracks)
    }

    /// Rebuild a store from a snapshot; each track keeps its last history entry.
    pub fn restore(snapshot: &TrackSnapshot) -> Self {
        let mut tracks: Vec<Track> = snapshot.tracks.iter().map(|r| r.to_track()).collect();
        tracks.sort_by_key(|t| t.id);
        Self { tracks }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn manager(lifecycle: LifecycleConfig) -> TrackManager {
        TrackManager::new(&TrackerConfig {
            lifecycle,
            ..Default::default()
        })
    }

    fn born(mgr: &mut TrackManager) -> Track {
        let m = Measurement::new(10_000.0, 45.0, 2.0, 0.0, None);
        mgr.birth(&m, 0.0)
    }

    #[test]
    fn tentative_confirms_exactly_at_hit_count() {
        let mut mgr = manager(LifecycleConfig {
            confirm_hits: 4,
            max_tentative_age: 10,
            ..Default::default()
        });
        let mut track = born(&mut mgr);
        assert_eq!(track.hits, 1);

        assert_eq!(mgr.register_hit(&mut track), None); // 2
        assert_eq!(mgr.register_hit(&mut track), None); // 3
        assert_eq!(track.status, TrackStatus::Tentative, "not before");
        assert_eq!(mgr.register_hit(&mut track), Some(Transition::Confirmed)); // 4
        assert_eq!(track.status, TrackStatus::Confirmed);
        assert_eq!(mgr.register_hit(&mut track), None, "not again after");
    }

    #[test]
    fn deleted_exactly_at_miss_count() {
        let mut mgr = manager(LifecycleConfig {
            confirm_hits: 1,
            deletion_misses: 3,
            ..Default::default()
        });
        let mut track = born(&mut mgr);
        assert_eq!(track.status, TrackStatus::Confirmed);

        assert_eq!(mgr.register_miss(&mut track), Some(Transition::Coasting));
        assert_eq!(mgr.register_miss(&mut track), None);
        assert_eq!(track.status, TrackStatus::Coasting);
        assert_eq!(mgr.register_miss(&mut track), Some(Transition::Deleted));
        assert_eq!(track.status, TrackStatus::Deleted);
    }

    #[test]
    fn coasting_track_resumes_previous_status() {
        let mut mgr = manager(LifecycleConfig {
            confirm_hits: 2,
            ..Default::default()
        });
        let mut track = born(&mut mgr);
        mgr.register_hit(&mut track);
        assert_eq!(track.status, TrackStatus::Confirmed);
        mgr.register_miss(&mut track);
        assert_eq!(track.status, TrackStatus::Coasting);
        assert_eq!(mgr.register_hit(&mut track), Some(Transition::Resumed));
        assert_eq!(track.status, TrackStatus::Confirmed);
        assert_eq!(track.misses, 0);
    }

    #[test]
    fn unconfirmed_track_expires_after_max_age() {
        let mut mgr = manager(LifecycleConfig {
            confirm_hits: 10,
            deletion_misses: 10,
            max_tentative_age: 3,
            ..Default::default()
        });
        let mut track = born(&mut mgr); // age 1
        mgr.register_hit(&mut track); // age 2
        mgr.register_miss(&mut track); // age 3
        assert_ne!(track.status, TrackStatus::Deleted);
        assert_eq!(mgr.register_hit(&mut track), Some(Transition::Deleted)); // age 4
    }

    #[test]
    fn degraded_after_repeated_singular_events() {
        let mut mgr = manager(LifecycleConfig {
            degraded_after: 2,
            ..Default::default()
        });
        let mut track = born(&mut mgr);
        mgr.register_singular(&mut track);
        assert!(!track.degraded);
        mgr.register_singular(&mut track);
        assert!(track.degraded);
        mgr.register_hit(&mut track);
        assert!(!track.degraded);
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut mgr = manager(LifecycleConfig::default());
        let a = born(&mut mgr);
        let b = born(&mut mgr);
        assert!(b.id > a.id);

        let mut store = TrackStore::new();
        store.insert(a);
        store.insert(b);
        store.tracks_mut()[0].status = TrackStatus::Deleted;
        let removed = store.prune_deleted();
        assert_eq!(removed.len(), 1);

        let mut fresh = manager(LifecycleConfig::default());
        fresh.reserve_ids(&store);
        assert!(fresh.peek_next_id() > store.tracks()[0].id);
    }

    #[test]
    fn birth_uses_range_rate_along_line_of_sight() {
        let mut mgr = TrackManager::new(&TrackerConfig {
            use_range_rate: true,
            ..Default::default()
        });
        let m = Measurement::new(5_000.0, 90.0, 0.0, 0.0, Some(-40.0));
        let t = mgr.birth(&m, 0.0);
        let v = t.velocity();
        assert_abs_diff_eq!(v[0], -40.0, epsilon = 1e-9);
        assert_abs_diff_eq!(v[1], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(t.position()[0], 5_000.0, epsilon = 1e-9);
        // Position covariance follows the measurement noise, not a constant.
        assert!(t.state.cov[(1, 1)] > t.state.cov[(0, 0)]);
    }

    #[test]
    fn birth_dimension_follows_preset() {
        let mut mgr = TrackManager::new(&TrackerConfig {
            initiation_preset: crate::config::InitiationPreset::SevenState,
            ..Default::default()
        });
        let t = born(&mut mgr);
        assert_eq!(t.state.dim(), 9);
        assert_eq!(t.model, MotionModelKind::ConstantAcceleration);
    }
}
