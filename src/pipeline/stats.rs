use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::activity::Activity;
use crate::track::TrackerStats;

use super::FrameResult;

/// Count of labels per activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LabelHistogram {
    pub standing: u64,
    pub walking: u64,
    pub running: u64,
    pub unknown: u64,
}

impl LabelHistogram {
    pub fn add(&mut self, activity: Activity) {
        *self.slot(activity) += 1;
    }

    pub fn get(&self, activity: Activity) -> u64 {
        match activity {
            Activity::Standing => self.standing,
            Activity::Walking => self.walking,
            Activity::Running => self.running,
            Activity::Unknown => self.unknown,
        }
    }

    pub fn merge(&mut self, other: &LabelHistogram) {
        for activity in Activity::ALL {
            *self.slot(activity) += other.get(activity);
        }
    }

    pub fn total(&self) -> u64 {
        Activity::ALL.iter().map(|a| self.get(*a)).sum()
    }

    fn slot(&mut self, activity: Activity) -> &mut u64 {
        match activity {
            Activity::Standing => &mut self.standing,
            Activity::Walking => &mut self.walking,
            Activity::Running => &mut self.running,
            Activity::Unknown => &mut self.unknown,
        }
    }
}

/// Aggregate statistics of one run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub warmup_frames: u64,
    pub total_detections: u64,
    /// Largest number of simultaneously active tracks.
    pub peak_tracks: usize,
    pub tracks_created: u64,
    pub tracks_confirmed: u64,
    pub tracks_terminated: u64,
    pub assignment_failures: u64,
    /// Label counts over every (frame, track) pair that was classified.
    pub labels: LabelHistogram,
    /// Hex SHA-256 over the ordered track identities, states and labels.
    pub digest: String,
    /// Decode failure that ended the run early, if any.
    pub aborted: Option<String>,
}

/// Running totals maintained by the orchestrator.
#[derive(Clone, Default)]
pub(crate) struct RunStats {
    frames_processed: u64,
    frames_skipped: u64,
    warmup_frames: u64,
    total_detections: u64,
    peak_tracks: usize,
    labels: LabelHistogram,
    hasher: Sha256,
    aborted: Option<String>,
}

impl RunStats {
    pub(crate) fn record(&mut self, result: &FrameResult) {
        self.frames_processed += 1;
        if result.warming_up {
            self.warmup_frames += 1;
        }
        self.total_detections += result.detection_count as u64;
        self.peak_tracks = self.peak_tracks.max(result.active_tracks);
        self.labels.merge(&result.labels);

        self.hasher.update(result.frame_index.to_le_bytes());
        for track in &result.tracks {
            self.hasher.update(track.id.to_le_bytes());
            self.hasher.update(track.state.as_str().as_bytes());
            let label = track
                .label
                .as_ref()
                .map_or("-", |label| label.activity.as_str());
            self.hasher.update(label.as_bytes());
        }
        self.hasher.update(b"\n");
    }

    pub(crate) fn record_skip(&mut self) {
        self.frames_skipped += 1;
    }

    pub(crate) fn record_abort(&mut self, reason: String) {
        self.aborted.get_or_insert(reason);
    }

    pub(crate) fn aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub(crate) fn summary(&self, tracker: TrackerStats) -> RunSummary {
        RunSummary {
            frames_processed: self.frames_processed,
            frames_skipped: self.frames_skipped,
            warmup_frames: self.warmup_frames,
            total_detections: self.total_detections,
            peak_tracks: self.peak_tracks,
            tracks_created: tracker.tracks_created,
            tracks_confirmed: tracker.tracks_confirmed,
            tracks_terminated: tracker.tracks_terminated,
            assignment_failures: tracker.assignment_failures,
            labels: self.labels,
            digest: hex::encode(self.hasher.clone().finalize()),
            aborted: self.aborted.clone(),
        }
    }
}
