//! Pipeline orchestrator.
//!
//! `Pipeline` owns one instance of every stage for a single run and drives
//! each frame through background model, blob extraction, tracking and
//! activity classification in that order. Frames must arrive in ascending
//! index order; `stream::run_streaming` restores that order for threaded
//! ingestion.
//!
//! A stage failure on one frame (for example a frame whose dimensions differ
//! from the first one) is logged and the frame is skipped. Tracker state is
//! untouched by a skipped frame. Decode failures end the run; every result
//! produced before the failure stays available through `results()`.

use anyhow::Result;
use serde::Serialize;

use crate::activity::{ActivityClassifier, ActivityLabel};
use crate::config::PipelineConfig;
use crate::detect::{build_background_model, BackgroundModel, BlobExtractor, BoundingBox, Detection};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::track::{Track, TrackState, Tracker};
use crate::PipelineError;

mod stats;
mod stream;

pub use stats::{LabelHistogram, RunSummary};
pub use stream::{run_streaming, StopHandle};

use stats::RunStats;

/// One active track as reported for a frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackReport {
    pub id: u64,
    pub state: TrackState,
    pub bbox: BoundingBox,
    pub centroid: (f32, f32),
    /// Filtered velocity in pixels per frame.
    pub velocity: (f32, f32),
    pub age: u64,
    pub time_since_update: u32,
    /// Present for confirmed and occluded tracks when activity recognition
    /// is enabled.
    pub label: Option<ActivityLabel>,
}

/// Per-frame output handed to the caller.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameResult {
    pub frame_index: u64,
    pub timestamp_ms: u64,
    /// The background model was still learning; no detections were made.
    pub warming_up: bool,
    pub detection_count: usize,
    pub detections: Vec<Detection>,
    pub active_tracks: usize,
    pub tracks: Vec<TrackReport>,
    pub labels: LabelHistogram,
}

pub struct Pipeline {
    config: PipelineConfig,
    background: Box<dyn BackgroundModel>,
    blobs: BlobExtractor,
    tracker: Tracker,
    classifier: ActivityClassifier,
    results: Vec<FrameResult>,
    retain_results: bool,
    stats: RunStats,
    last_index: Option<u64>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            background: build_background_model(&config.background),
            blobs: BlobExtractor::new(
                config.min_blob_area,
                config.detection_threshold,
                config.blob.morphology_radius,
            ),
            tracker: Tracker::from_config(&config),
            classifier: ActivityClassifier::from_config(&config),
            results: Vec::new(),
            retain_results: true,
            stats: RunStats::default(),
            last_index: None,
            config,
        })
    }

    /// Keep every `FrameResult` for `results()` (the default). Callers that
    /// consume results as they are produced turn this off so memory does not
    /// grow with the length of the input.
    pub fn retain_results(mut self, retain: bool) -> Self {
        self.retain_results = retain;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one frame through every stage.
    ///
    /// Returns `Ok(None)` when the frame was skipped after a recoverable
    /// stage failure, and `Err` only for failures that end the run.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<Option<FrameResult>> {
        if self.stats.aborted() {
            return Err(PipelineError::Stage {
                stage: "pipeline",
                frame_index: frame.index(),
                reason: "run already aborted".to_string(),
            }
            .into());
        }
        match self.analyze(frame) {
            Ok(result) => {
                self.last_index = Some(frame.index());
                self.stats.record(&result);
                if self.retain_results {
                    self.results.push(result.clone());
                }
                Ok(Some(result))
            }
            Err(e) if crate::pipeline_error(&e).is_some_and(PipelineError::is_fatal) => {
                self.abort(&e);
                Err(e)
            }
            Err(e) => {
                log::warn!("skipping frame {}: {:#}", frame.index(), e);
                self.stats.record_skip();
                Ok(None)
            }
        }
    }

    fn analyze(&mut self, frame: &Frame) -> Result<FrameResult> {
        if let Some(last) = self.last_index {
            if frame.index() <= last {
                return Err(PipelineError::Stage {
                    stage: "ordering",
                    frame_index: frame.index(),
                    reason: format!("frame arrived after frame {}", last),
                }
                .into());
            }
        }

        let warming_up = !self.background.is_warmed_up();
        let mask = self.background.update(frame)?;
        let detections = if warming_up {
            log::debug!("{}", PipelineError::EmptyFrame { frame_index: frame.index() });
            Vec::new()
        } else {
            self.blobs.extract(&mask)
        };

        let mut labels = LabelHistogram::default();
        let tracks = if self.config.tracking_enabled {
            let classifier = self
                .config
                .activity_recognition_enabled
                .then_some(&self.classifier);
            let active = self.tracker.step(&detections, frame.index());
            let reports: Vec<TrackReport> = active
                .iter()
                .map(|track| {
                    let label = classifier.and_then(|c| label_for(c, track));
                    if let Some(label) = &label {
                        labels.add(label.activity);
                    }
                    report(track, label)
                })
                .collect();
            // Terminated tracks are not reported; release them.
            self.tracker.drain_terminated();
            reports
        } else {
            Vec::new()
        };

        Ok(FrameResult {
            frame_index: frame.index(),
            timestamp_ms: frame.timestamp().as_millis() as u64,
            warming_up,
            detection_count: detections.len(),
            detections,
            active_tracks: tracks.len(),
            tracks,
            labels,
        })
    }

    fn abort(&mut self, err: &anyhow::Error) {
        log::error!("run aborted: {:#}", err);
        self.stats.record_abort(format!("{:#}", err));
    }

    /// Pull every frame from `source` until it ends, fails to decode, or the
    /// frame limit is reached.
    pub fn run(&mut self, source: &mut dyn FrameSource) -> Result<RunSummary> {
        if let Err(e) = source.connect() {
            self.abort(&e);
            return Ok(self.summary());
        }
        let max_frames = self.config.ingest.max_frames;
        let mut pulled = 0u64;
        loop {
            if max_frames > 0 && pulled >= max_frames {
                log::info!("frame limit {} reached", max_frames);
                break;
            }
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    self.abort(&e);
                    break;
                }
            };
            pulled += 1;
            if self.process_frame(&frame).is_err() {
                break;
            }
        }
        let summary = self.summary();
        log_completion(source.name(), &summary);
        Ok(summary)
    }

    /// Results of every processed frame, in order. Empty when retention is
    /// off.
    pub fn results(&self) -> &[FrameResult] {
        &self.results
    }

    pub fn summary(&self) -> RunSummary {
        self.stats.summary(self.tracker.stats())
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub(crate) fn record_abort(&mut self, err: &anyhow::Error) {
        self.abort(err);
    }

    /// End the run, releasing all stage state.
    pub fn finish(self) -> (Vec<FrameResult>, RunSummary) {
        let summary = self.summary();
        (self.results, summary)
    }
}

/// Confirmed and occluded tracks are classified; tentative ones are not.
fn label_for(classifier: &ActivityClassifier, track: &Track) -> Option<ActivityLabel> {
    match track.state() {
        TrackState::Confirmed | TrackState::Occluded => Some(classifier.classify(track)),
        TrackState::Tentative | TrackState::Terminated => None,
    }
}

fn report(track: &Track, label: Option<ActivityLabel>) -> TrackReport {
    TrackReport {
        id: track.id(),
        state: track.state(),
        bbox: track.bbox(),
        centroid: track.history().back().map_or(track.position(), |e| e.centroid),
        velocity: track.velocity(),
        age: track.age(),
        time_since_update: track.time_since_update(),
        label,
    }
}

pub(crate) fn log_completion(source: &str, summary: &RunSummary) {
    log::info!(
        "run complete ({}): {} frames, {} skipped, {} detections, {} tracks ({} confirmed), aborted={}",
        source,
        summary.frames_processed,
        summary.frames_skipped,
        summary.total_detections,
        summary.tracks_created,
        summary.tracks_confirmed,
        summary.aborted.is_some()
    );
}
