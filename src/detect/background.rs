use anyhow::Result;

use crate::config::{BackgroundMethod, BackgroundSettings};
use crate::frame::{ForegroundMask, Frame};
use crate::PipelineError;

use super::backends::{FrameDifferenceModel, GaussianMixtureModel, RunningAverageModel};

/// Per-pixel statistical model of the static scene.
///
/// One instance belongs to exactly one pipeline run. All frames fed to a
/// model must share the dimensions of the first frame it saw; a mismatch is a
/// `PipelineError::Stage` and leaves the model untouched.
pub trait BackgroundModel: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Learn from `frame` and classify its pixels.
    ///
    /// Frames inside the warm-up window update the model and return an empty
    /// mask.
    fn update(&mut self, frame: &Frame) -> Result<ForegroundMask>;

    /// True once the warm-up window has passed.
    fn is_warmed_up(&self) -> bool;

    /// Frames learned so far.
    fn frames_seen(&self) -> u64;
}

pub fn build_background_model(settings: &BackgroundSettings) -> Box<dyn BackgroundModel> {
    match settings.method {
        BackgroundMethod::GaussianMixture => Box::new(GaussianMixtureModel::new(settings)),
        BackgroundMethod::RunningAverage => Box::new(RunningAverageModel::new(settings)),
        BackgroundMethod::FrameDifference => Box::new(FrameDifferenceModel::new(settings)),
    }
}

/// Learning rate for the `frames_seen`-th frame.
///
/// During warm-up the rate follows a cumulative average so the first frames
/// dominate the estimate; afterwards the configured (bounded) rate applies.
pub(crate) fn learning_rate(alpha: f32, frames_seen: u64, warmup_frames: u32) -> f32 {
    if frames_seen < warmup_frames as u64 {
        alpha.max(1.0 / (frames_seen as f32 + 1.0))
    } else {
        alpha
    }
}

pub(crate) fn check_dimensions(
    stage: &'static str,
    expected: Option<(u32, u32)>,
    frame: &Frame,
) -> Result<()> {
    match expected {
        Some((w, h)) if (w, h) != (frame.width(), frame.height()) => Err(PipelineError::Stage {
            stage,
            frame_index: frame.index(),
            reason: format!(
                "frame is {}x{}, model was built for {}x{}",
                frame.width(),
                frame.height(),
                w,
                h
            ),
        }
        .into()),
        _ => Ok(()),
    }
}
