//! motionwatch - classical computer-vision surveillance pipeline.
//!
//! This crate turns an ordered sequence of raster frames into tracked objects
//! with activity labels.
//!
//! # Architecture
//!
//! Frames flow through five stages, strictly in frame-index order:
//!
//! 1. **Ingest** (`ingest`): decode a video, a still image or a synthetic scene
//!    into `Frame`s behind a single `FrameSource` interface.
//! 2. **Background model** (`detect::BackgroundModel`): per-pixel statistical
//!    model of the static scene; emits a `ForegroundMask` per frame.
//! 3. **Blob extraction** (`detect::BlobExtractor`): morphological cleanup and
//!    connected-component labelling into `Detection`s.
//! 4. **Tracking** (`track::Tracker`): constant-velocity Kalman prediction,
//!    Hungarian assignment with gating, track lifecycle management.
//! 5. **Activity classification** (`activity::ActivityClassifier`): speed and
//!    direction features over a sliding window of a track's history.
//!
//! The `pipeline::Pipeline` orchestrator owns one instance of every stage per
//! run. There is no process-wide state, so independent runs may execute on
//! separate threads without synchronization.
//!
//! # Failure model
//!
//! Only input decode failures abort a run. Every other stage failure degrades
//! the result of a single frame (see `PipelineError`).

use std::fmt;

pub mod activity;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod track;

pub use activity::{Activity, ActivityClassifier, ActivityLabel};
pub use config::PipelineConfig;
pub use detect::{BackgroundModel, BlobExtractor, BoundingBox, Detection};
pub use frame::{ForegroundMask, Frame, ReorderBuffer};
pub use ingest::{open_source, FrameSource, ImageSource, MemorySource, SourceStats, SyntheticSource};
pub use pipeline::{
    run_streaming, FrameResult, LabelHistogram, Pipeline, RunSummary, StopHandle, TrackReport,
};
pub use track::{Track, TrackState, Tracker};

/// Error taxonomy of the pipeline.
///
/// Only `Decode` is fatal for a run. The orchestrator recovers the others by
/// downcasting from `anyhow::Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Unreadable frame or container. Aborts the run.
    Decode {
        frame_index: Option<u64>,
        reason: String,
    },
    /// Frame produced no usable mask (background model warm-up).
    EmptyFrame { frame_index: u64 },
    /// Cost-matrix solver could not produce an assignment.
    AssignmentFailure { reason: String },
    /// Track history shorter than the classification window.
    InsufficientHistory { track_id: u64, have: usize, need: usize },
    /// Non-decode stage failure for a single frame.
    Stage {
        stage: &'static str,
        frame_index: u64,
        reason: String,
    },
    /// Invalid configuration.
    Config(String),
}

impl PipelineError {
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            frame_index: None,
            reason: reason.into(),
        }
    }

    /// True when the error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Config(_))
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode {
                frame_index: Some(index),
                reason,
            } => write!(f, "decode error at frame {}: {}", index, reason),
            Self::Decode {
                frame_index: None,
                reason,
            } => write!(f, "decode error: {}", reason),
            Self::EmptyFrame { frame_index } => {
                write!(f, "frame {} produced no foreground (warm-up)", frame_index)
            }
            Self::AssignmentFailure { reason } => write!(f, "assignment failure: {}", reason),
            Self::InsufficientHistory {
                track_id,
                have,
                need,
            } => write!(
                f,
                "track {} has {} history entries, classification needs {}",
                track_id, have, need
            ),
            Self::Stage {
                stage,
                frame_index,
                reason,
            } => write!(f, "{} failed on frame {}: {}", stage, frame_index, reason),
            Self::Config(reason) => write!(f, "invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Returns the `PipelineError` carried by an `anyhow::Error`, if any.
pub fn pipeline_error(err: &anyhow::Error) -> Option<&PipelineError> {
    err.downcast_ref::<PipelineError>()
}
