//! Serializable view of the active track set after a scan.
//!
//! A snapshot carries everything needed to rebuild the store: restoring it
//! and predicting forward gives the same result as predicting the original
//! tracks.

use crate::{
    motion::MotionModelKind,
    track::{HistoryEntry, Track, TrackStatus},
    types::{StateEstimate, TrackId},
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Per-track report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackReport {
    pub id: TrackId,
    pub status: TrackStatus,
    pub model: MotionModelKind,
    pub degraded: bool,
    pub hits: u32,
    pub misses: u32,
    pub age: u32,
    pub total_hits: u32,
    pub confirmed_once: bool,
    pub singular_streak: u32,
    pub born_at: f64,
    pub last_time: f64,
    pub estimate: StateEstimate,
    /// This scan's (measurement, predicted, filtered) record
    pub last: Option<HistoryEntry>,
}

impl From<&Track> for TrackReport {
    fn from(t: &Track) -> Self {
        Self {
            id: t.id,
            status: t.status,
            model: t.model,
            degraded: t.degraded,
            hits: t.hits,
            misses: t.misses,
            age: t.age,
            total_hits: t.total_hits,
            confirmed_once: t.confirmed_once,
            singular_streak: t.singular_streak,
            born_at: t.born_at,
            last_time: t.last_time,
            estimate: t.state.clone(),
            last: t.last_entry().cloned(),
        }
    }
}

impl TrackReport {
    /// Rebuild a track; history holds only the last entry.
    pub fn to_track(&self) -> Track {
        Track {
            id: self.id,
            model: self.model,
            state: self.estimate.clone(),
            status: self.status,
            hits: self.hits,
            misses: self.misses,
            age: self.age,
            total_hits: self.total_hits,
            confirmed_once: self.confirmed_once,
            singular_streak: self.singular_streak,
            degraded: self.degraded,
            born_at: self.born_at,
            last_time: self.last_time,
            history: self.last.iter().cloned().collect::<VecDeque<_>>(),
        }
    }
}

/// All active tracks at one scan time.
///
/// `next_id` is the identifier the next birth would receive, so a processor
/// resumed from the snapshot never hands out the id of a track deleted
/// before it was taken.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub time: f64,
    #[serde(default)]
    pub next_id: u64,
    pub tracks: Vec<TrackReport>,
}

impl TrackSnapshot {
    /// Snapshot of `tracks`; `next_id` defaults to one past the highest id present.
    pub fn from_tracks(time: f64, tracks: &[Track]) -> Self {
        Self {
            time,
            next_id: tracks.iter().map(|t| t.id.0 + 1).max().unwrap_or(1),
            tracks: tracks.iter().map(TrackReport::from).collect(),
        }
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &TrackReport> {
        self.tracks
            .iter()
            .filter(|t| t.status == TrackStatus::Confirmed)
    }
}
