use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::PipelineError;

const DEFAULT_DETECTION_THRESHOLD: f32 = 0.3;
const DEFAULT_MIN_BLOB_AREA: u32 = 25;
const DEFAULT_OCCLUSION_TOLERANCE_FRAMES: u32 = 5;
const DEFAULT_CONFIRMATION_HITS: u32 = 3;
const DEFAULT_CLASSIFICATION_WINDOW: usize = 15;
const DEFAULT_STANDING_MAX: f32 = 1.0;
const DEFAULT_WALKING_MAX: f32 = 5.0;

const DEFAULT_LEARNING_RATE: f32 = 0.01;
const DEFAULT_MAX_LEARNING_RATE: f32 = 0.1;
const DEFAULT_SIGMA_MULTIPLE: f32 = 2.5;
const DEFAULT_WARMUP_FRAMES: u32 = 10;
const DEFAULT_COMPONENTS: usize = 3;
const DEFAULT_BACKGROUND_RATIO: f32 = 0.7;
const DEFAULT_INITIAL_VARIANCE: f32 = 225.0;
const DEFAULT_MIN_VARIANCE: f32 = 16.0;

const DEFAULT_MORPHOLOGY_RADIUS: u8 = 1;

const DEFAULT_GATING_DISTANCE: f32 = 50.0;
const DEFAULT_SIZE_WEIGHT: f32 = 0.5;
const DEFAULT_HISTORY_LIMIT: usize = 512;
const DEFAULT_PROCESS_NOISE: f32 = 1.0;
const DEFAULT_MEASUREMENT_NOISE: f32 = 4.0;

const DEFAULT_BUFFER_FRAMES: usize = 8;
const DEFAULT_SOURCE_FPS: u32 = 25;

/// Upper bound on the steady-state learning rate. Anything faster absorbs
/// walking people into the background within a handful of frames.
pub const LEARNING_RATE_CEILING: f32 = 0.5;

pub const CONFIG_ENV: &str = "MOTIONWATCH_CONFIG";

// ----------------------------------------------------------------------------
// File representation: every field optional
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    detection_threshold: Option<f32>,
    tracking_enabled: Option<bool>,
    activity_recognition_enabled: Option<bool>,
    min_blob_area: Option<u32>,
    occlusion_tolerance_frames: Option<u32>,
    confirmation_hits: Option<u32>,
    classification_window: Option<usize>,
    speed_thresholds: Option<SpeedThresholdsFile>,
    background: Option<BackgroundConfigFile>,
    blob: Option<BlobConfigFile>,
    tracker: Option<TrackerConfigFile>,
    ingest: Option<IngestConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SpeedThresholdsFile {
    standing_max: Option<f32>,
    walking_max: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct BackgroundConfigFile {
    method: Option<BackgroundMethod>,
    learning_rate: Option<f32>,
    max_learning_rate: Option<f32>,
    sigma_multiple: Option<f32>,
    warmup_frames: Option<u32>,
    components: Option<usize>,
    background_ratio: Option<f32>,
    initial_variance: Option<f32>,
    min_variance: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct BlobConfigFile {
    morphology_radius: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    gating_distance: Option<f32>,
    size_weight: Option<f32>,
    history_limit: Option<usize>,
    process_noise: Option<f32>,
    measurement_noise: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct IngestConfigFile {
    buffer_frames: Option<usize>,
    max_frames: Option<u64>,
    fps: Option<u32>,
}

// ----------------------------------------------------------------------------
// Resolved configuration
// ----------------------------------------------------------------------------

/// Background modelling algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundMethod {
    GaussianMixture,
    RunningAverage,
    FrameDifference,
}

/// Speed boundaries in pixels per frame: below `standing_max` is Standing,
/// above `walking_max` is Running, Walking in between.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SpeedThresholds {
    pub standing_max: f32,
    pub walking_max: f32,
}

impl Default for SpeedThresholds {
    fn default() -> Self {
        Self {
            standing_max: DEFAULT_STANDING_MAX,
            walking_max: DEFAULT_WALKING_MAX,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BackgroundSettings {
    pub method: BackgroundMethod,
    /// Steady-state exponential learning rate (alpha).
    pub learning_rate: f32,
    /// Bound applied to `learning_rate`.
    pub max_learning_rate: f32,
    /// A pixel is foreground when further than this many standard deviations
    /// from every background estimate.
    pub sigma_multiple: f32,
    /// Frames used to learn the scene before any foreground is reported.
    pub warmup_frames: u32,
    /// Gaussians per pixel (mixture method only).
    pub components: usize,
    /// Cumulative weight of the components treated as background.
    pub background_ratio: f32,
    pub initial_variance: f32,
    pub min_variance: f32,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            method: BackgroundMethod::GaussianMixture,
            learning_rate: DEFAULT_LEARNING_RATE,
            max_learning_rate: DEFAULT_MAX_LEARNING_RATE,
            sigma_multiple: DEFAULT_SIGMA_MULTIPLE,
            warmup_frames: DEFAULT_WARMUP_FRAMES,
            components: DEFAULT_COMPONENTS,
            background_ratio: DEFAULT_BACKGROUND_RATIO,
            initial_variance: DEFAULT_INITIAL_VARIANCE,
            min_variance: DEFAULT_MIN_VARIANCE,
        }
    }
}

impl BackgroundSettings {
    /// Learning rate after applying the configured bound.
    pub fn effective_learning_rate(&self) -> f32 {
        self.learning_rate.min(self.max_learning_rate)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BlobSettings {
    /// Radius of the square structuring element; 0 disables cleanup.
    pub morphology_radius: u8,
}

impl Default for BlobSettings {
    fn default() -> Self {
        Self {
            morphology_radius: DEFAULT_MORPHOLOGY_RADIUS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackerSettings {
    /// Maximum association cost (pixels) for a track/detection pair.
    pub gating_distance: f32,
    /// Weight of box-area dissimilarity in the association cost.
    pub size_weight: f32,
    /// Maximum history entries retained per track; 0 keeps everything.
    pub history_limit: usize,
    pub process_noise: f32,
    pub measurement_noise: f32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            gating_distance: DEFAULT_GATING_DISTANCE,
            size_weight: DEFAULT_SIZE_WEIGHT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            process_noise: DEFAULT_PROCESS_NOISE,
            measurement_noise: DEFAULT_MEASUREMENT_NOISE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IngestSettings {
    /// Decoded frames allowed to wait for processing before ingestion blocks.
    pub buffer_frames: usize,
    /// Stop after this many frames; 0 means no limit.
    pub max_frames: u64,
    /// Frame rate assumed when the container carries no timestamps.
    pub fps: u32,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            max_frames: 0,
            fps: DEFAULT_SOURCE_FPS,
        }
    }
}

/// Run configuration, passed to the orchestrator at run start.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub detection_threshold: f32,
    pub tracking_enabled: bool,
    pub activity_recognition_enabled: bool,
    pub min_blob_area: u32,
    pub occlusion_tolerance_frames: u32,
    pub confirmation_hits: u32,
    pub classification_window: usize,
    pub speed_thresholds: SpeedThresholds,
    pub background: BackgroundSettings,
    pub blob: BlobSettings,
    pub tracker: TrackerSettings,
    pub ingest: IngestSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            tracking_enabled: true,
            activity_recognition_enabled: true,
            min_blob_area: DEFAULT_MIN_BLOB_AREA,
            occlusion_tolerance_frames: DEFAULT_OCCLUSION_TOLERANCE_FRAMES,
            confirmation_hits: DEFAULT_CONFIRMATION_HITS,
            classification_window: DEFAULT_CLASSIFICATION_WINDOW,
            speed_thresholds: SpeedThresholds::default(),
            background: BackgroundSettings::default(),
            blob: BlobSettings::default(),
            tracker: TrackerSettings::default(),
            ingest: IngestSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from `MOTIONWATCH_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or defaults when `None`), then apply
    /// environment overrides and validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => PipelineConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let defaults = Self::default();
        let speed = file.speed_thresholds.unwrap_or_default();
        let bg = file.background.unwrap_or_default();
        let blob = file.blob.unwrap_or_default();
        let tracker = file.tracker.unwrap_or_default();
        let ingest = file.ingest.unwrap_or_default();
        Self {
            detection_threshold: file
                .detection_threshold
                .unwrap_or(defaults.detection_threshold),
            tracking_enabled: file.tracking_enabled.unwrap_or(defaults.tracking_enabled),
            activity_recognition_enabled: file
                .activity_recognition_enabled
                .unwrap_or(defaults.activity_recognition_enabled),
            min_blob_area: file.min_blob_area.unwrap_or(defaults.min_blob_area),
            occlusion_tolerance_frames: file
                .occlusion_tolerance_frames
                .unwrap_or(defaults.occlusion_tolerance_frames),
            confirmation_hits: file.confirmation_hits.unwrap_or(defaults.confirmation_hits),
            classification_window: file
                .classification_window
                .unwrap_or(defaults.classification_window),
            speed_thresholds: SpeedThresholds {
                standing_max: speed
                    .standing_max
                    .unwrap_or(defaults.speed_thresholds.standing_max),
                walking_max: speed
                    .walking_max
                    .unwrap_or(defaults.speed_thresholds.walking_max),
            },
            background: BackgroundSettings {
                method: bg.method.unwrap_or(defaults.background.method),
                learning_rate: bg.learning_rate.unwrap_or(defaults.background.learning_rate),
                max_learning_rate: bg
                    .max_learning_rate
                    .unwrap_or(defaults.background.max_learning_rate),
                sigma_multiple: bg
                    .sigma_multiple
                    .unwrap_or(defaults.background.sigma_multiple),
                warmup_frames: bg.warmup_frames.unwrap_or(defaults.background.warmup_frames),
                components: bg.components.unwrap_or(defaults.background.components),
                background_ratio: bg
                    .background_ratio
                    .unwrap_or(defaults.background.background_ratio),
                initial_variance: bg
                    .initial_variance
                    .unwrap_or(defaults.background.initial_variance),
                min_variance: bg.min_variance.unwrap_or(defaults.background.min_variance),
            },
            blob: BlobSettings {
                morphology_radius: blob
                    .morphology_radius
                    .unwrap_or(defaults.blob.morphology_radius),
            },
            tracker: TrackerSettings {
                gating_distance: tracker
                    .gating_distance
                    .unwrap_or(defaults.tracker.gating_distance),
                size_weight: tracker.size_weight.unwrap_or(defaults.tracker.size_weight),
                history_limit: tracker
                    .history_limit
                    .unwrap_or(defaults.tracker.history_limit),
                process_noise: tracker
                    .process_noise
                    .unwrap_or(defaults.tracker.process_noise),
                measurement_noise: tracker
                    .measurement_noise
                    .unwrap_or(defaults.tracker.measurement_noise),
            },
            ingest: IngestSettings {
                buffer_frames: ingest
                    .buffer_frames
                    .unwrap_or(defaults.ingest.buffer_frames),
                max_frames: ingest.max_frames.unwrap_or(defaults.ingest.max_frames),
                fps: ingest.fps.unwrap_or(defaults.ingest.fps),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_parse::<f32>("MOTIONWATCH_DETECTION_THRESHOLD")? {
            self.detection_threshold = value;
        }
        if let Some(value) = env_bool("MOTIONWATCH_TRACKING_ENABLED")? {
            self.tracking_enabled = value;
        }
        if let Some(value) = env_bool("MOTIONWATCH_ACTIVITY_ENABLED")? {
            self.activity_recognition_enabled = value;
        }
        if let Some(value) = env_parse::<u32>("MOTIONWATCH_MIN_BLOB_AREA")? {
            self.min_blob_area = value;
        }
        if let Some(value) = env_parse::<u32>("MOTIONWATCH_OCCLUSION_TOLERANCE")? {
            self.occlusion_tolerance_frames = value;
        }
        if let Some(value) = env_parse::<u32>("MOTIONWATCH_CONFIRMATION_HITS")? {
            self.confirmation_hits = value;
        }
        if let Some(value) = env_parse::<usize>("MOTIONWATCH_CLASSIFICATION_WINDOW")? {
            self.classification_window = value;
        }
        if let Ok(raw) = std::env::var("MOTIONWATCH_SPEED_THRESHOLDS") {
            if !raw.trim().is_empty() {
                self.speed_thresholds = parse_speed_pair(&raw)?;
            }
        }
        if let Some(value) = env_parse::<usize>("MOTIONWATCH_BUFFER_FRAMES")? {
            self.ingest.buffer_frames = value;
        }
        Ok(())
    }

    /// Reject configurations the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| -> Result<()> { Err(PipelineError::Config(reason).into()) };

        let bg = &self.background;
        let tracker = &self.tracker;
        let floats = [
            ("detection_threshold", self.detection_threshold),
            ("speed_thresholds.standing_max", self.speed_thresholds.standing_max),
            ("speed_thresholds.walking_max", self.speed_thresholds.walking_max),
            ("background.learning_rate", bg.learning_rate),
            ("background.max_learning_rate", bg.max_learning_rate),
            ("background.sigma_multiple", bg.sigma_multiple),
            ("background.background_ratio", bg.background_ratio),
            ("background.initial_variance", bg.initial_variance),
            ("background.min_variance", bg.min_variance),
            ("tracker.gating_distance", tracker.gating_distance),
            ("tracker.size_weight", tracker.size_weight),
            ("tracker.process_noise", tracker.process_noise),
            ("tracker.measurement_noise", tracker.measurement_noise),
        ];
        if let Some((name, value)) = floats.iter().find(|(_, value)| !value.is_finite()) {
            return fail(format!("{} must be a finite number, got {}", name, value));
        }

        if !(0.0..=1.0).contains(&self.detection_threshold) {
            return fail(format!(
                "detection_threshold must be within 0..=1, got {}",
                self.detection_threshold
            ));
        }
        let speed = self.speed_thresholds;
        if speed.standing_max < 0.0 || speed.standing_max >= speed.walking_max {
            return fail(format!(
                "speed_thresholds must satisfy 0 <= standing_max < walking_max, got ({}, {})",
                speed.standing_max, speed.walking_max
            ));
        }
        if self.classification_window < 2 {
            return fail("classification_window must be at least 2".to_string());
        }
        if self.confirmation_hits == 0 {
            return fail("confirmation_hits must be at least 1".to_string());
        }

        if bg.max_learning_rate <= 0.0 || bg.max_learning_rate > LEARNING_RATE_CEILING {
            return fail(format!(
                "background.max_learning_rate must be within (0, {}], got {}",
                LEARNING_RATE_CEILING, bg.max_learning_rate
            ));
        }
        if bg.learning_rate <= 0.0 || bg.learning_rate > bg.max_learning_rate {
            return fail(format!(
                "background.learning_rate must be within (0, {}], got {}",
                bg.max_learning_rate, bg.learning_rate
            ));
        }
        if bg.sigma_multiple <= 0.0 {
            return fail("background.sigma_multiple must be positive".to_string());
        }
        if !(1..=5).contains(&bg.components) {
            return fail(format!(
                "background.components must be within 1..=5, got {}",
                bg.components
            ));
        }
        if !(0.0..=1.0).contains(&bg.background_ratio) || bg.background_ratio == 0.0 {
            return fail("background.background_ratio must be within (0, 1]".to_string());
        }
        if bg.min_variance <= 0.0 || bg.initial_variance < bg.min_variance {
            return fail(
                "background variances must satisfy 0 < min_variance <= initial_variance"
                    .to_string(),
            );
        }

        if tracker.gating_distance <= 0.0 {
            return fail("tracker.gating_distance must be positive".to_string());
        }
        if tracker.size_weight < 0.0 {
            return fail("tracker.size_weight must not be negative".to_string());
        }
        if tracker.process_noise <= 0.0 || tracker.measurement_noise <= 0.0 {
            return fail("tracker noise parameters must be positive".to_string());
        }
        if tracker.history_limit != 0 && tracker.history_limit < self.classification_window {
            return fail(format!(
                "tracker.history_limit ({}) must be 0 or at least classification_window ({})",
                tracker.history_limit, self.classification_window
            ));
        }

        if self.ingest.buffer_frames == 0 {
            return fail("ingest.buffer_frames must be at least 1".to_string());
        }
        if self.ingest.fps == 0 {
            return fail("ingest.fps must be at least 1".to_string());
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("{} has an invalid value: {:?}", key, raw)),
        _ => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(anyhow!("{} must be a boolean, got {:?}", key, raw)),
        },
        _ => Ok(None),
    }
}

fn parse_speed_pair(raw: &str) -> Result<SpeedThresholds> {
    let parts: Vec<&str> = raw
        .split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect();
    let [standing, walking] = parts.as_slice() else {
        return Err(anyhow!(
            "MOTIONWATCH_SPEED_THRESHOLDS must be \"standing_max,walking_max\", got {:?}",
            raw
        ));
    };
    let parse = |value: &str| {
        value
            .parse::<f32>()
            .map_err(|_| anyhow!("MOTIONWATCH_SPEED_THRESHOLDS has a non-numeric value {:?}", value))
    };
    Ok(SpeedThresholds {
        standing_max: parse(standing)?,
        walking_max: parse(walking)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        PipelineConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn rejects_threshold_outside_unit_range() {
        let cfg = PipelineConfig {
            detection_threshold: 1.5,
            ..PipelineConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(
            crate::pipeline_error(&err),
            Some(PipelineError::Config(_))
        ));
    }

    #[test]
    fn rejects_non_finite_floats() {
        let mut cfg = PipelineConfig::default();
        cfg.tracker.gating_distance = f32::INFINITY;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.background.sigma_multiple = f32::NAN;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("background.sigma_multiple"));

        let mut cfg = PipelineConfig::default();
        cfg.speed_thresholds.walking_max = f32::INFINITY;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_speed_thresholds() {
        let cfg = PipelineConfig {
            speed_thresholds: SpeedThresholds {
                standing_max: 5.0,
                walking_max: 1.0,
            },
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unbounded_learning_rate() {
        let mut cfg = PipelineConfig::default();
        cfg.background.learning_rate = 0.2;
        cfg.background.max_learning_rate = 0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file: PipelineConfigFile =
            serde_json::from_str(r#"{"min_blob_area": 40, "background": {"method": "running_average"}}"#)
                .unwrap();
        let cfg = PipelineConfig::from_file(file);
        assert_eq!(cfg.min_blob_area, 40);
        assert_eq!(cfg.background.method, BackgroundMethod::RunningAverage);
        assert_eq!(cfg.confirmation_hits, DEFAULT_CONFIRMATION_HITS);
        assert_eq!(cfg.tracker, TrackerSettings::default());
    }

    #[test]
    fn frame_difference_method_is_recognised() {
        let file: PipelineConfigFile =
            serde_json::from_str(r#"{"background": {"method": "frame_difference"}}"#).unwrap();
        let cfg = PipelineConfig::from_file(file);
        assert_eq!(cfg.background.method, BackgroundMethod::FrameDifference);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn toml_file_is_parsed() {
        let file: PipelineConfigFile = toml::from_str(
            r#"
            tracking_enabled = false
            [speed_thresholds]
            standing_max = 0.5
            walking_max = 4.0
            "#,
        )
        .unwrap();
        let cfg = PipelineConfig::from_file(file);
        assert!(!cfg.tracking_enabled);
        assert_eq!(cfg.speed_thresholds.standing_max, 0.5);
        assert_eq!(cfg.speed_thresholds.walking_max, 4.0);
    }

    #[test]
    fn speed_pair_parsing() {
        let pair = parse_speed_pair(" 1.5, 6 ").unwrap();
        assert_eq!(pair.standing_max, 1.5);
        assert_eq!(pair.walking_max, 6.0);
        assert!(parse_speed_pair("1.5").is_err());
        assert!(parse_speed_pair("a,b").is_err());
    }
}
