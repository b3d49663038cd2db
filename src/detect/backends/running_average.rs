use anyhow::Result;

use crate::config::BackgroundSettings;
use crate::detect::background::{check_dimensions, learning_rate, BackgroundModel};
use crate::frame::{ForegroundMask, Frame};

/// Foreground pixels learn this much slower than background pixels, so a
/// person standing still is not absorbed within a few frames.
const FOREGROUND_RATE_DIVISOR: f32 = 10.0;

/// Single running Gaussian per pixel with selective update.
pub struct RunningAverageModel {
    alpha: f32,
    warmup_frames: u32,
    sigma_multiple: f32,
    initial_variance: f32,
    min_variance: f32,
    dims: Option<(u32, u32)>,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames_seen: u64,
}

impl RunningAverageModel {
    pub fn new(settings: &BackgroundSettings) -> Self {
        Self {
            alpha: settings.effective_learning_rate(),
            warmup_frames: settings.warmup_frames,
            sigma_multiple: settings.sigma_multiple,
            initial_variance: settings.initial_variance,
            min_variance: settings.min_variance,
            dims: None,
            mean: Vec::new(),
            variance: Vec::new(),
            frames_seen: 0,
        }
    }
}

impl BackgroundModel for RunningAverageModel {
    fn name(&self) -> &'static str {
        "running_average"
    }

    fn update(&mut self, frame: &Frame) -> Result<ForegroundMask> {
        check_dimensions("background", self.dims, frame)?;
        let luma = frame.luma();
        let (width, height) = (frame.width(), frame.height());

        if self.dims.is_none() {
            self.variance = vec![self.initial_variance; luma.len()];
            self.mean = luma;
            self.dims = Some((width, height));
            self.frames_seen = 1;
            return Ok(ForegroundMask::empty(frame.index(), width, height));
        }

        let warming_up = !self.is_warmed_up();
        let rate = learning_rate(self.alpha, self.frames_seen, self.warmup_frames);
        let mut flags = Vec::with_capacity(luma.len());
        for ((mean, variance), &x) in self.mean.iter_mut().zip(&mut self.variance).zip(&luma) {
            let delta = x - *mean;
            let foreground = delta.abs() > self.sigma_multiple * variance.sqrt();
            let rho = if foreground && !warming_up {
                rate / FOREGROUND_RATE_DIVISOR
            } else {
                rate
            };
            *mean += rho * delta;
            *variance = (*variance + rho * (delta * delta - *variance)).max(self.min_variance);
            flags.push(foreground);
        }

        self.frames_seen += 1;
        if warming_up && self.is_warmed_up() {
            log::info!(
                "background model warmed up after {} frames ({}x{}, running average)",
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackgroundMethod;
    use std::time::Duration;

    fn flat(index: u64, value: u8, hot: Option<usize>) -> Frame {
        let mut data = vec![value; 64];
        if let Some(i) = hot {
            data[i] = 230;
        }
        Frame::new(index, Duration::ZERO, 8, 8, 1, data).unwrap()
    }

    fn model() -> RunningAverageModel {
        RunningAverageModel::new(&BackgroundSettings {
            method: BackgroundMethod::RunningAverage,
            warmup_frames: 4,
            ..BackgroundSettings::default()
        })
    }

    #[test]
    fn detects_changed_pixel_after_warmup() {
        let mut model = model();
        for i in 0..4 {
            assert!(model.update(&flat(i, 50, None)).unwrap().is_empty());
        }
        let mask = model.update(&flat(4, 50, Some(9))).unwrap();
        assert_eq!(mask.count(), 1);
        assert!(mask.is_foreground(1, 1));
    }

    #[test]
    fn stationary_object_persists_as_foreground() {
        let mut model = model();
        for i in 0..4 {
            model.update(&flat(i, 50, None)).unwrap();
        }
        // 0.01 / 10 per frame: thirty frames barely move the mean.
        for i in 4..34 {
            let mask = model.update(&flat(i, 50, Some(20))).unwrap();
            assert!(mask.is_foreground(4, 2), "absorbed at frame {}", i);
        }
    }

    #[test]
    fn dimension_change_leaves_model_untouched() {
        let mut model = model();
        model.update(&flat(0, 50, None)).unwrap();
        let other = Frame::new(1, Duration::ZERO, 2, 2, 1, vec![0u8; 4]).unwrap();
        assert!(model.update(&other).is_err());
        assert_eq!(model.frames_seen(), 1);
    }
}
