use serde::Serialize;

use super::assignment::{self, Assignment};
use super::state::Track;
use crate::config::PipelineConfig;
use crate::detect::Detection;

/// Tuning for the tracker, resolved from `PipelineConfig`.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackerParams {
    pub gating_distance: f32,
    pub size_weight: f32,
    pub occlusion_tolerance_frames: u32,
    pub confirmation_hits: u32,
    pub history_limit: usize,
    pub process_noise: f32,
    pub measurement_noise: f32,
}

impl TrackerParams {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            gating_distance: config.tracker.gating_distance,
            size_weight: config.tracker.size_weight,
            occlusion_tolerance_frames: config.occlusion_tolerance_frames,
            confirmation_hits: config.confirmation_hits,
            history_limit: config.tracker.history_limit,
            process_noise: config.tracker.process_noise,
            measurement_noise: config.tracker.measurement_noise,
        }
    }
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Lifetime counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub tracks_created: u64,
    pub tracks_confirmed: u64,
    pub tracks_terminated: u64,
    pub assignment_failures: u64,
}

/// Multi-object tracker.
///
/// Active tracks are kept ordered by id. Ids start at 1, grow by one per new
/// track and are never reused, including after termination.
pub struct Tracker {
    params: TrackerParams,
    tracks: Vec<Track>,
    terminated: Vec<Track>,
    next_id: u64,
    last_frame: Option<u64>,
    stats: TrackerStats,
}

impl Tracker {
    pub fn new(params: TrackerParams) -> Self {
        Self {
            params,
            tracks: Vec::new(),
            terminated: Vec::new(),
            next_id: 1,
            last_frame: None,
            stats: TrackerStats::default(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(TrackerParams::from_config(config))
    }

    /// Advance to `frame_index` with this frame's detections and return the
    /// active tracks.
    pub fn step(&mut self, detections: &[Detection], frame_index: u64) -> &[Track] {
        let dt = match self.last_frame {
            Some(last) if frame_index > last => frame_index - last,
            _ => 1,
        };
        self.last_frame = Some(frame_index);

        for track in &mut self.tracks {
            track.predict(dt);
        }

        let costs = self.cost_matrix(detections);
        let assignment = match assignment::solve(&costs, detections.len(), self.params.gating_distance)
        {
            Ok(assignment) => assignment,
            Err(e) => {
                self.stats.assignment_failures += 1;
                log::warn!(
                    "frame {}: {:#}; treating all tracks and detections as unmatched",
                    frame_index,
                    e
                );
                Assignment::unmatched(self.tracks.len(), detections.len())
            }
        };

        for &(t, d) in &assignment.matches {
            let track = &mut self.tracks[t];
            if track.correct(&detections[d], frame_index, self.params.confirmation_hits) {
                self.stats.tracks_confirmed += 1;
                log::debug!("track {} confirmed at frame {}", track.id(), frame_index);
            }
        }
        for &t in &assignment.unmatched_tracks {
            self.tracks[t].mark_missed(frame_index, self.params.occlusion_tolerance_frames);
        }

        let (active, ended): (Vec<Track>, Vec<Track>) =
            std::mem::take(&mut self.tracks).into_iter().partition(Track::is_active);
        self.tracks = active;
        for track in ended {
            log::debug!(
                "track {} terminated at frame {} (age {}, {} hits)",
                track.id(),
                frame_index,
                track.age(),
                track.total_hits()
            );
            self.stats.tracks_terminated += 1;
            self.terminated.push(track);
        }

        for &d in &assignment.unmatched_detections {
            let confirmed = self.params.confirmation_hits <= 1;
            let track = Track::spawn(
                self.next_id,
                &detections[d],
                frame_index,
                confirmed,
                self.params.history_limit,
                self.params.process_noise,
                self.params.measurement_noise,
            );
            self.next_id += 1;
            self.stats.tracks_created += 1;
            if confirmed {
                self.stats.tracks_confirmed += 1;
            }
            self.tracks.push(track);
        }

        &self.tracks
    }

    /// Association cost between every active track's prediction and every
    /// detection: centroid distance, inflated by box-area dissimilarity.
    fn cost_matrix(&self, detections: &[Detection]) -> Vec<Vec<f32>> {
        self.tracks
            .iter()
            .map(|track| {
                let (px, py) = track.position();
                let track_area = track.observed_bbox().area();
                detections
                    .iter()
                    .map(|det| {
                        let distance =
                            ((det.centroid.0 - px).powi(2) + (det.centroid.1 - py).powi(2)).sqrt();
                        let det_area = det.bbox.area();
                        let larger = track_area.max(det_area);
                        let similarity = if larger > 0.0 {
                            track_area.min(det_area) / larger
                        } else {
                            1.0
                        };
                        distance * (1.0 + self.params.size_weight * (1.0 - similarity))
                    })
                    .collect()
            })
            .collect()
    }

    /// Active (non-terminated) tracks, ordered by id.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Hand over tracks terminated since the last call.
    pub fn drain_terminated(&mut self) -> Vec<Track> {
        std::mem::take(&mut self.terminated)
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    pub fn params(&self) -> &TrackerParams {
        &self.params
    }
}
