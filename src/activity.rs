//! Activity classification from trajectory features.
//!
//! A label is computed from the most recent `window` history entries of a
//! track:
//! - mean speed: centroid displacement per frame, averaged over the window
//! - speed consistency: `confidence = 1 / (1 + std_dev(speed))`
//! - direction variance: circular variance of the displacement headings
//!
//! Tracks with fewer entries than the window are labelled `Unknown` with
//! confidence 0. Classification never mutates the track.

use anyhow::Result;
use serde::Serialize;

use crate::config::{PipelineConfig, SpeedThresholds};
use crate::track::{HistoryEntry, Track};
use crate::PipelineError;

/// Displacements shorter than this (pixels) carry no heading.
const MIN_HEADING_DISPLACEMENT: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Standing,
    Walking,
    Running,
    Unknown,
}

impl Activity {
    pub const ALL: [Activity; 4] = [
        Activity::Standing,
        Activity::Walking,
        Activity::Running,
        Activity::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standing => "standing",
            Self::Walking => "walking",
            Self::Running => "running",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label for one track over one window of frames.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActivityLabel {
    pub track_id: u64,
    pub activity: Activity,
    pub confidence: f32,
    /// First and last frame index of the window (inclusive).
    pub window: (u64, u64),
    /// Pixels per frame.
    pub mean_speed: f32,
    /// 0 for a straight path, approaching 1 for random headings.
    pub direction_variance: f32,
}

pub struct ActivityClassifier {
    window: usize,
    thresholds: SpeedThresholds,
}

impl ActivityClassifier {
    pub fn new(window: usize, thresholds: SpeedThresholds) -> Self {
        Self {
            window: window.max(2),
            thresholds,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.classification_window, config.speed_thresholds)
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Label a track. Short histories yield `Activity::Unknown`.
    pub fn classify(&self, track: &Track) -> ActivityLabel {
        match self.try_classify(track) {
            Ok(label) => label,
            Err(_) => {
                let history = track.history();
                let start = history.front().map_or(track.first_frame(), |e| e.frame_index);
                let end = history.back().map_or(track.last_frame(), |e| e.frame_index);
                ActivityLabel {
                    track_id: track.id(),
                    activity: Activity::Unknown,
                    confidence: 0.0,
                    window: (start, end),
                    mean_speed: 0.0,
                    direction_variance: 0.0,
                }
            }
        }
    }

    /// Like `classify`, but reports a short history as
    /// `PipelineError::InsufficientHistory`.
    pub fn try_classify(&self, track: &Track) -> Result<ActivityLabel> {
        let history = track.history();
        if history.len() < self.window {
            return Err(PipelineError::InsufficientHistory {
                track_id: track.id(),
                have: history.len(),
                need: self.window,
            }
            .into());
        }
        let recent: Vec<&HistoryEntry> = history.iter().skip(history.len() - self.window).collect();
        Ok(self.label_window(track.id(), &recent))
    }

    fn label_window(&self, track_id: u64, entries: &[&HistoryEntry]) -> ActivityLabel {
        let mut speeds = Vec::with_capacity(entries.len().saturating_sub(1));
        let mut heading_sum = (0.0f32, 0.0f32);
        let mut heading_count = 0usize;

        for pair in entries.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let gap = b.frame_index.saturating_sub(a.frame_index).max(1) as f32;
            let dx = b.centroid.0 - a.centroid.0;
            let dy = b.centroid.1 - a.centroid.1;
            let distance = (dx * dx + dy * dy).sqrt();
            speeds.push(distance / gap);
            if distance >= MIN_HEADING_DISPLACEMENT {
                heading_sum.0 += dx / distance;
                heading_sum.1 += dy / distance;
                heading_count += 1;
            }
        }

        let n = speeds.len().max(1) as f32;
        let mean_speed = speeds.iter().sum::<f32>() / n;
        let variance = speeds
            .iter()
            .map(|s| (s - mean_speed).powi(2))
            .sum::<f32>()
            / n;
        let confidence = 1.0 / (1.0 + variance.sqrt());

        let direction_variance = if heading_count > 0 {
            let resultant = (heading_sum.0.powi(2) + heading_sum.1.powi(2)).sqrt();
            (1.0 - resultant / heading_count as f32).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let activity = if mean_speed < self.thresholds.standing_max {
            Activity::Standing
        } else if mean_speed <= self.thresholds.walking_max {
            Activity::Walking
        } else {
            Activity::Running
        };

        let start = entries.first().map_or(0, |e| e.frame_index);
        let end = entries.last().map_or(start, |e| e.frame_index);
        ActivityLabel {
            track_id,
            activity,
            confidence,
            window: (start, end),
            mean_speed,
            direction_variance,
        }
    }
}
