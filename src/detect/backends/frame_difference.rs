use anyhow::Result;

use crate::config::BackgroundSettings;
use crate::detect::background::{check_dimensions, BackgroundModel};
use crate::frame::{ForegroundMask, Frame};

/// Previous-frame differencing.
///
/// A pixel is foreground when its luma moved more than
/// `sigma_multiple * sqrt(min_variance)` since the last frame. There is no
/// long-term model: anything that stops moving drops out of the mask on the
/// next frame, and a solid object only lights up along its leading and
/// trailing edges.
pub struct FrameDifferenceModel {
    threshold: f32,
    warmup_frames: u32,
    dims: Option<(u32, u32)>,
    previous: Vec<f32>,
    frames_seen: u64,
}

impl FrameDifferenceModel {
    pub fn new(settings: &BackgroundSettings) -> Self {
        Self {
            threshold: settings.sigma_multiple * settings.min_variance.sqrt(),
            warmup_frames: settings.warmup_frames,
            dims: None,
            previous: Vec::new(),
            frames_seen: 0,
        }
    }

    /// Luma change above which a pixel counts as moving.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl BackgroundModel for FrameDifferenceModel {
    fn name(&self) -> &'static str {
        "frame_difference"
    }

    fn update(&mut self, frame: &Frame) -> Result<ForegroundMask> {
        check_dimensions("background", self.dims, frame)?;
        let luma = frame.luma();
        let (width, height) = (frame.width(), frame.height());

        if self.dims.is_none() {
            self.previous = luma;
            self.dims = Some((width, height));
            self.frames_seen = 1;
            return Ok(ForegroundMask::empty(frame.index(), width, height));
        }

        let warming_up = !self.is_warmed_up();
        let flags: Vec<bool> = self
            .previous
            .iter()
            .zip(&luma)
            .map(|(prev, x)| (x - prev).abs() > self.threshold)
            .collect();
        self.previous = luma;

        self.frames_seen += 1;
        if warming_up && self.is_warmed_up() {
            log::info!(
                "background model warmed up after {} frames ({}x{}, frame difference)",
                self.frames_seen,
                width,
                height
            );
        }

        if warming_up {
            return Ok(ForegroundMask::empty(frame.index(), width, height));
        }
        Ok(ForegroundMask::from_flags(frame.index(), width, height, flags))
    }

    fn is_warmed_up(&self) -> bool {
        self.frames_seen >= self.warmup_frames as u64
    }

    fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}
