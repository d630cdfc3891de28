//! Track: state estimate, lifecycle status, counters and history.

use crate::{
    motion::{MotionModel, MotionModelKind},
    types::{Measurement, StateEstimate, TrackId},
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of history entries kept per track (oldest dropped first).
pub const HISTORY_LEN: usize = 1024;

/// Lifecycle status of a track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackStatus {
    /// Not yet confirmed; may be spurious
    Tentative,
    /// Reached the configured number of consecutive hits
    Confirmed,
    /// Predict-only: no update on the last scan
    Coasting,
    /// Terminal; removed from the active set
    Deleted,
}

impl TrackStatus {
    pub fn label(self) -> &'static str {
        match self {
            TrackStatus::Tentative => "tentative",
            TrackStatus::Confirmed => "confirmed",
            TrackStatus::Coasting => "coasting",
            TrackStatus::Deleted => "deleted",
        }
    }
}

/// One (measurement, predicted, filtered) record of a scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: f64,
    /// Measurement used for the update; `None` on a miss or a soft update
    /// spread over several measurements
    pub measurement: Option<Measurement>,
    pub predicted: StateEstimate,
    pub filtered: StateEstimate,
}

/// A single target track.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    /// Unique identifier, never reused
    pub id: TrackId,
    /// Motion model resolved at birth
    pub model: MotionModelKind,
    /// Current estimate, valid at `last_time`
    pub state: StateEstimate,
    pub status: TrackStatus,
    /// Consecutive hits
    pub hits: u32,
    /// Consecutive misses
    pub misses: u32,
    /// Scans observed since birth (birth scan included)
    pub age: u32,
    /// Total updates over the track's life
    pub total_hits: u32,
    /// Set once the track has ever been confirmed
    pub confirmed_once: bool,
    /// Consecutive singular innovation covariances
    pub singular_streak: u32,
    /// Raised when `singular_streak` reaches the configured limit
    pub degraded: bool,
    /// Time of birth
    pub born_at: f64,
    /// Time the current estimate refers to
    pub last_time: f64,
    /// Past scans (most recent last)
    pub history: VecDeque<HistoryEntry>,
}

impl Track {
    /// Create a new tentative track; birth counts as the first hit.
    pub fn new(
        id: TrackId,
        model: MotionModelKind,
        state: StateEstimate,
        birth_time: f64,
        measurement: Option<Measurement>,
    ) -> Self {
        let mut history = VecDeque::with_capacity(16);
        history.push_back(HistoryEntry {
            timestamp: birth_time,
            measurement,
            predicted: state.clone(),
            filtered: state.clone(),
        });
        Self {
            id,
            model,
            state,
            status: TrackStatus::Tentative,
            hits: 1,
            misses: 0,
            age: 1,
            total_hits: 1,
            confirmed_once: false,
            singular_streak: 0,
            degraded: false,
            born_at: birth_time,
            last_time: birth_time,
            history,
        }
    }

    /// Motion model instance for this track.
    pub fn motion(&self, process_noise_intensity: f64) -> MotionModel {
        MotionModel::new(self.model, process_noise_intensity)
    }

    pub fn is_active(&self) -> bool {
        self.status != TrackStatus::Deleted
    }

    /// Push a history entry, dropping the oldest when full.
    pub fn push_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(entry);
    }

    /// Most recent history entry.
    pub fn last_entry(&self) -> Option<&HistoryEntry> {
        self.history.back()
    }

    /// Position [x, y, z]
    pub fn position(&self) -> [f64; 3] {
        self.state.position()
    }

    /// Velocity [vx, vy, vz]
    pub fn velocity(&self) -> [f64; 3] {
        self.state.velocity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DMat, DVec};

    #[test]
    fn history_is_bounded() {
        let s = StateEstimate::new(DVec::zeros(6), DMat::identity(6, 6));
        let mut t = Track::new(TrackId(1), MotionModelKind::ConstantVelocity, s.clone(), 0.0, None);
        for k in 0..(HISTORY_LEN + 10) {
            t.push_history(HistoryEntry {
                timestamp: k as f64,
                measurement: None,
                predicted: s.clone(),
                filtered: s.clone(),
            });
        }
        assert_eq!(t.history.len(), HISTORY_LEN);
        assert_eq!(
            t.last_entry().map(|e| e.timestamp),
            Some((HISTORY_LEN + 9) as f64)
        );
    }

    #[test]
    fn new_track_counts_birth_as_hit() {
        let s = StateEstimate::new(DVec::zeros(6), DMat::identity(6, 6));
        let t = Track::new(TrackId(4), MotionModelKind::ConstantVelocity, s, 2.0, None);
        assert_eq!((t.hits, t.age, t.misses), (1, 1, 0));
        assert_eq!(t.status, TrackStatus::Tentative);
        assert_eq!(t.history.len(), 1);
    }
}
