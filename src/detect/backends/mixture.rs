//! Adaptive Gaussian-mixture background model.
//!
//! Each pixel keeps `K` weighted Gaussians over luminance, ordered by
//! `weight / sigma` (most stable first). The leading components whose
//! cumulative weight first exceeds `background_ratio` describe the
//! background; a pixel that matches none of them is foreground.
//!
//! Update for a pixel value `x` with learning rate `rho`:
//! - weights: `w = (1 - rho) * w + rho * matched`
//! - matched component: `mean += rho * (x - mean)`,
//!   `var += rho * ((x - mean)^2 - var)`, floored at `min_variance`
//! - no match: the weakest component is replaced by `(rho, x, initial_variance)`
//!
//! `rho` never exceeds `max_learning_rate`, so an object has to stay put for
//! roughly `ln(1 - background_ratio) / ln(1 - rho)` frames before it becomes
//! background.

use anyhow::Result;
use std::cmp::Ordering;

use crate::config::BackgroundSettings;
use crate::detect::background::{check_dimensions, learning_rate, BackgroundModel};
use crate::frame::{ForegroundMask, Frame};

#[derive(Clone, Copy, Debug, PartialEq)]
struct Gaussian {
    weight: f32,
    mean: f32,
    variance: f32,
}

impl Gaussian {
    fn fitness(&self) -> f32 {
        self.weight / self.variance.sqrt()
    }
}

#[derive(Clone, Copy, Debug)]
struct MixtureParams {
    sigma_multiple: f32,
    background_ratio: f32,
    initial_variance: f32,
    min_variance: f32,
}

pub struct GaussianMixtureModel {
    alpha: f32,
    warmup_frames: u32,
    components: usize,
    params: MixtureParams,
    dims: Option<(u32, u32)>,
    mixtures: Vec<Gaussian>,
    frames_seen: u64,
}

impl GaussianMixtureModel {
    pub fn new(settings: &BackgroundSettings) -> Self {
        Self {
            alpha: settings.effective_learning_rate(),
            warmup_frames: settings.warmup_frames,
            components: settings.components.max(1),
            params: MixtureParams {
                sigma_multiple: settings.sigma_multiple,
                background_ratio: settings.background_ratio,
                initial_variance: settings.initial_variance,
                min_variance: settings.min_variance,
            },
            dims: None,
            mixtures: Vec::new(),
            frames_seen: 0,
        }
    }

    fn seed(&mut self, frame: &Frame, luma: &[f32]) {
        let empty = Gaussian {
            weight: 0.0,
            mean: 0.0,
            variance: self.params.initial_variance,
        };
        self.mixtures = Vec::with_capacity(luma.len() * self.components);
        for &x in luma {
            self.mixtures.push(Gaussian {
                weight: 1.0,
                mean: x,
                variance: self.params.initial_variance,
            });
            self.mixtures
                .extend(std::iter::repeat(empty).take(self.components - 1));
        }
        self.dims = Some((frame.width(), frame.height()));
    }
}

impl BackgroundModel for GaussianMixtureModel {
    fn name(&self) -> &'static str {
        "gaussian_mixture"
    }

    fn update(&mut self, frame: &Frame) -> Result<ForegroundMask> {
        check_dimensions("background", self.dims, frame)?;
        let luma = frame.luma();
        let (width, height) = (frame.width(), frame.height());

        if self.dims.is_none() {
            self.seed(frame, &luma);
            self.frames_seen = 1;
            return Ok(ForegroundMask::empty(frame.index(), width, height));
        }

        let warming_up = !self.is_warmed_up();
        let rate = learning_rate(self.alpha, self.frames_seen, self.warmup_frames);
        let mut flags = Vec::with_capacity(luma.len());
        for (mixture, &x) in self.mixtures.chunks_exact_mut(self.components).zip(&luma) {
            flags.push(update_pixel(mixture, x, rate, &self.params));
        }

        self.frames_seen += 1;
        if warming_up && self.is_warmed_up() {
            log::info!(
                "background model warmed up after {} frames ({}x{}, {} components)",
                self.frames_seen,
                width,
                height,
                self.components
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

/// Classify and learn one pixel. Returns true for foreground.
fn update_pixel(mixture: &mut [Gaussian], x: f32, rate: f32, params: &MixtureParams) -> bool {
    let matched = mixture.iter().position(|g| {
        g.weight > 0.0 && (x - g.mean).abs() <= params.sigma_multiple * g.variance.sqrt()
    });

    let mut background_count = mixture.len();
    let mut cumulative = 0.0;
    for (i, g) in mixture.iter().enumerate() {
        cumulative += g.weight;
        if cumulative > params.background_ratio {
            background_count = i + 1;
            break;
        }
    }
    let foreground = matched.map_or(true, |k| k >= background_count);

    for (i, g) in mixture.iter_mut().enumerate() {
        let hit = if matched == Some(i) { 1.0 } else { 0.0 };
        g.weight = (1.0 - rate) * g.weight + rate * hit;
    }

    match matched {
        Some(k) => {
            let g = &mut mixture[k];
            let delta = x - g.mean;
            g.mean += rate * delta;
            g.variance = (g.variance + rate * (delta * delta - g.variance)).max(params.min_variance);
        }
        None => {
            let weakest = mixture.len() - 1;
            mixture[weakest] = Gaussian {
                weight: rate,
                mean: x,
                variance: params.initial_variance,
            };
        }
    }

    let total: f32 = mixture.iter().map(|g| g.weight).sum();
    if total > 0.0 {
        for g in mixture.iter_mut() {
            g.weight /= total;
        }
    }
    mixture.sort_by(|a, b| b.fitness().partial_cmp(&a.fitness()).unwrap_or(Ordering::Equal));

    foreground
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const W: u32 = 12;
    const H: u32 = 10;

    fn frame(index: u64, pixel: impl Fn(u32, u32) -> u8) -> Frame {
        let mut data = Vec::with_capacity((W * H) as usize);
        for y in 0..H {
            for x in 0..W {
                data.push(pixel(x, y));
            }
        }
        Frame::new(index, Duration::ZERO, W, H, 1, data).unwrap()
    }

    fn settings() -> BackgroundSettings {
        BackgroundSettings {
            warmup_frames: 5,
            ..BackgroundSettings::default()
        }
    }

    fn warm(model: &mut GaussianMixtureModel, frames: u64) {
        for i in 0..frames {
            let noise = (i % 3) as u8;
            model.update(&frame(i, |x, _| 60 + noise + (x % 2) as u8)).unwrap();
        }
    }

    #[test]
    fn warmup_frames_produce_empty_masks() {
        let mut model = GaussianMixtureModel::new(&settings());
        for i in 0..5 {
            let mask = model.update(&frame(i, |x, _| if x < 3 { 250 } else { 10 })).unwrap();
            assert!(mask.is_empty());
        }
        assert!(model.is_warmed_up());
        assert_eq!(model.frames_seen(), 5);
    }

    #[test]
    fn static_scene_is_background() {
        let mut model = GaussianMixtureModel::new(&settings());
        warm(&mut model, 20);
        let mask = model.update(&frame(20, |x, _| 61 + (x % 2) as u8)).unwrap();
        assert_eq!(mask.count(), 0);
    }

    #[test]
    fn bright_object_is_foreground() {
        let mut model = GaussianMixtureModel::new(&settings());
        warm(&mut model, 10);
        let mask = model
            .update(&frame(10, |x, y| {
                if (4..8).contains(&x) && (2..5).contains(&y) {
                    220
                } else {
                    60
                }
            }))
            .unwrap();
        assert_eq!(mask.count(), 12);
        assert!(mask.is_foreground(4, 2));
        assert!(mask.is_foreground(7, 4));
        assert!(!mask.is_foreground(3, 2));
    }

    #[test]
    fn slow_illumination_drift_is_absorbed() {
        let mut model = GaussianMixtureModel::new(&settings());
        warm(&mut model, 10);
        let mut level = 60.0f32;
        for i in 10..200 {
            level += 0.05;
            let value = level.round() as u8;
            let mask = model.update(&frame(i, |_, _| value)).unwrap();
            assert_eq!(mask.count(), 0, "frame {} at level {}", i, value);
        }
    }

    #[test]
    fn dimension_change_is_a_stage_error() {
        let mut model = GaussianMixtureModel::new(&settings());
        warm(&mut model, 3);
        let other = Frame::new(3, Duration::ZERO, 4, 4, 1, vec![0u8; 16]).unwrap();
        let err = model.update(&other).unwrap_err();
        assert!(matches!(
            crate::pipeline_error(&err),
            Some(crate::PipelineError::Stage { frame_index: 3, .. })
        ));
        assert_eq!(model.frames_seen(), 3);
    }

    #[test]
    fn unmatched_value_replaces_weakest_component() {
        let params = MixtureParams {
            sigma_multiple: 2.5,
            background_ratio: 0.7,
            initial_variance: 100.0,
            min_variance: 4.0,
        };
        let mut mixture = vec![
            Gaussian {
                weight: 1.0,
                mean: 50.0,
                variance: 16.0,
            },
            Gaussian {
                weight: 0.0,
                mean: 0.0,
                variance: 100.0,
            },
        ];
        assert!(update_pixel(&mut mixture, 200.0, 0.1, &params));
        assert!(mixture.iter().any(|g| g.mean == 200.0));
        let total: f32 = mixture.iter().map(|g| g.weight).sum();
        assert!((total - 1.0).abs() < 1e-5);
        // Background component still leads.
        assert_eq!(mixture[0].mean, 50.0);
    }
}
