//! Multi-object tracking.
//!
//! Every frame the tracker predicts each active track forward with a
//! constant-velocity Kalman filter, associates predictions with the frame's
//! detections by gated minimum-cost matching, then applies the lifecycle
//! rules (birth, confirmation, occlusion, termination).

pub mod assignment;
mod kalman;
mod state;
mod tracker;

pub use assignment::Assignment;
pub use kalman::KalmanFilter;
pub use state::{HistoryEntry, Track, TrackState};
pub use tracker::{Tracker, TrackerParams, TrackerStats};
