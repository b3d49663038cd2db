use serde::Serialize;
use std::collections::VecDeque;

use super::kalman::KalmanFilter;
use crate::detect::{BoundingBox, Detection};

/// Lifecycle state of a track.
///
/// `Tentative -> Confirmed -> Occluded <-> Confirmed -> Terminated`, and
/// `Tentative -> Terminated` for tracks that never confirm. `Terminated` is
/// absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    Tentative,
    Confirmed,
    Occluded,
    Terminated,
}

impl TrackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tentative => "tentative",
            Self::Confirmed => "confirmed",
            Self::Occluded => "occluded",
            Self::Terminated => "terminated",
        }
    }
}

/// One frame of a track's trajectory.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub frame_index: u64,
    pub centroid: (f32, f32),
    pub bbox: BoundingBox,
    /// False for placeholder entries written while occluded.
    pub observed: bool,
}

#[derive(Clone, Debug)]
pub struct Track {
    id: u64,
    state: TrackState,
    history: VecDeque<HistoryEntry>,
    history_limit: usize,
    filter: KalmanFilter,
    bbox: BoundingBox,
    first_frame: u64,
    last_frame: u64,
    age: u64,
    time_since_update: u32,
    consecutive_hits: u32,
    total_hits: u64,
}

impl Track {
    pub(crate) fn spawn(
        id: u64,
        detection: &Detection,
        frame_index: u64,
        confirmed: bool,
        history_limit: usize,
        process_noise: f32,
        measurement_noise: f32,
    ) -> Self {
        let mut track = Self {
            id,
            state: if confirmed {
                TrackState::Confirmed
            } else {
                TrackState::Tentative
            },
            history: VecDeque::new(),
            history_limit,
            filter: KalmanFilter::new(detection.centroid, process_noise, measurement_noise),
            bbox: detection.bbox,
            first_frame: frame_index,
            last_frame: frame_index,
            age: 1,
            time_since_update: 0,
            consecutive_hits: 1,
            total_hits: 1,
        };
        track.push_history(HistoryEntry {
            frame_index,
            centroid: detection.centroid,
            bbox: detection.bbox,
            observed: true,
        });
        track
    }

    pub(crate) fn predict(&mut self, dt: u64) {
        self.filter.predict(dt.max(1) as f64);
        self.age += 1;
    }

    /// Apply a matched detection. Returns true when this match confirmed
    /// the track.
    pub(crate) fn correct(
        &mut self,
        detection: &Detection,
        frame_index: u64,
        confirmation_hits: u32,
    ) -> bool {
        self.filter.update(detection.centroid);
        self.bbox = detection.bbox;
        self.last_frame = frame_index;
        self.time_since_update = 0;
        self.consecutive_hits += 1;
        self.total_hits += 1;
        self.push_history(HistoryEntry {
            frame_index,
            centroid: detection.centroid,
            bbox: detection.bbox,
            observed: true,
        });

        match self.state {
            TrackState::Tentative if self.consecutive_hits >= confirmation_hits => {
                self.state = TrackState::Confirmed;
                true
            }
            TrackState::Occluded => {
                self.state = TrackState::Confirmed;
                false
            }
            _ => false,
        }
    }

    /// Record a frame without a matching detection.
    pub(crate) fn mark_missed(&mut self, frame_index: u64, occlusion_tolerance: u32) {
        self.time_since_update += 1;
        self.consecutive_hits = 0;
        match self.state {
            TrackState::Tentative => self.state = TrackState::Terminated,
            TrackState::Confirmed | TrackState::Occluded => {
                if self.time_since_update > occlusion_tolerance {
                    self.state = TrackState::Terminated;
                } else {
                    self.state = TrackState::Occluded;
                    let predicted = self.filter.position();
                    let bbox = self.bbox.centered_at(predicted.0, predicted.1);
                    self.push_history(HistoryEntry {
                        frame_index,
                        centroid: predicted,
                        bbox,
                        observed: false,
                    });
                }
            }
            TrackState::Terminated => {}
        }
    }

    fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push_back(entry);
        if self.history_limit > 0 {
            while self.history.len() > self.history_limit {
                self.history.pop_front();
            }
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != TrackState::Terminated
    }

    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }

    /// Latest filtered (or, while occluded, predicted) centroid.
    pub fn position(&self) -> (f32, f32) {
        self.filter.position()
    }

    pub fn velocity(&self) -> (f32, f32) {
        self.filter.velocity()
    }

    /// Box of the latest history entry.
    pub fn bbox(&self) -> BoundingBox {
        self.history.back().map_or(self.bbox, |entry| entry.bbox)
    }

    /// Size used for association.
    pub(crate) fn observed_bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn first_frame(&self) -> u64 {
        self.first_frame
    }

    /// Last frame with a matched detection.
    pub fn last_frame(&self) -> u64 {
        self.last_frame
    }

    /// Frames since creation, counting the creation frame.
    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn time_since_update(&self) -> u32 {
        self.time_since_update
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }
}
