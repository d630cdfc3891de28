//! `tracker_core`: Core multi-target tracking algorithms.
//!
//! # Module layout
//! - [`types`]: Fundamental types (IDs, measurements, scans, state estimates)
//! - [`config`]: Tracker configuration and initiation presets
//! - [`motion`]: CV / CA / CT motion models (F, Q, nonlinear transition)
//! - [`kf`]: Extended Kalman filter (predict / update / PDA update)
//! - [`gating`]: Physical bounds and chi-squared Mahalanobis gating
//! - [`association`]: Bipartite graph, connected components, Hungarian solver
//! - [`jpda`]: Joint probabilistic data association
//! - [`track`]: Track struct, status and history
//! - [`track_manager`]: Birth / confirmation / coasting / deletion, track store
//! - [`snapshot`]: Serializable per-scan track reports
//! - [`pipeline`]: Scan processor orchestrating one full cycle
//! - [`error`]: Error types

pub mod association;
pub mod config;
pub mod error;
pub mod gating;
pub mod jpda;
pub mod kf;
pub mod motion;
pub mod pipeline;
pub mod snapshot;
pub mod track;
pub mod track_manager;
pub mod types;

pub use config::{AssociationStrategy, InitiationPreset, TrackerConfig};
pub use error::{ScanError, TrackerError};
pub use motion::{MotionModel, MotionModelKind};
pub use pipeline::{ScanOutput, ScanProcessor, ScanTiming};
pub use snapshot::{TrackReport, TrackSnapshot};
pub use track::{HistoryEntry, Track, TrackStatus};
pub use track_manager::{TrackManager, TrackStore};
pub use types::{Measurement, Scan, StateEstimate, TrackId};
